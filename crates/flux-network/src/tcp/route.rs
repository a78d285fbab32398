use std::net::IpAddr;

use crate::tcp::address::RouteAddress;
use crate::tcp::error::RouteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteId(u64);

#[derive(Debug, Clone)]
pub struct Route {
    pub source_name: String,
    pub source_ref: u64,
    pub target_name: String,
    pub target_ref: u64,
    pub address: RouteAddress,
}

/// Accept- and connect-side routes, indexed by `source_ref`.
///
/// `resolve` returns the first route matching in insertion order, mirroring
/// the linear scan-by-token this crate already uses in its connection
/// manager rather than a hash-keyed "first match wins by bucket" structure.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<(RouteId, Route)>,
    next_id: u64,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, route: Route) -> RouteId {
        let id = RouteId(self.next_id);
        self.next_id += 1;
        self.routes.push((id, route));
        id
    }

    /// Removes the first route matching `predicate`. Returns whether
    /// anything was removed.
    pub fn remove(&mut self, predicate: impl Fn(&Route) -> bool) -> Result<RouteId, RouteError> {
        let pos = self.routes.iter().position(|(_, r)| predicate(r)).ok_or(RouteError::NotFound)?;
        Ok(self.routes.remove(pos).0)
    }

    /// First route whose `source_name`/`source_ref`/`address` all match.
    #[must_use]
    pub fn resolve(&self, source_name: &str, source_ref: u64, addr: IpAddr) -> Option<&Route> {
        self.routes.iter().find_map(|(_, r)| {
            (r.source_name == source_name && r.source_ref == source_ref && r.address.matches(addr))
                .then_some(r)
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn route(source_ref: u64, address: RouteAddress) -> Route {
        Route {
            source_name: "tcp".to_string(),
            source_ref,
            target_name: "app".to_string(),
            target_ref: 7,
            address,
        }
    }

    #[test]
    fn resolve_picks_first_match_in_insertion_order() {
        let mut table = RouteTable::new();
        table.add(route(1, RouteAddress::Wildcard));
        table.add(route(1, RouteAddress::Specific(IpAddr::V4(Ipv4Addr::LOCALHOST))));

        let resolved =
            table.resolve("tcp", 1, IpAddr::V4(Ipv4Addr::LOCALHOST)).expect("route resolves");
        assert_eq!(resolved.target_ref, 7);
        // The wildcard route was added first, so it wins even though the
        // specific route also matches.
        assert!(matches!(resolved.address, RouteAddress::Wildcard));
    }

    #[test]
    fn resolve_misses_on_ref_mismatch() {
        let mut table = RouteTable::new();
        table.add(route(1, RouteAddress::Wildcard));
        assert!(table.resolve("tcp", 2, IpAddr::V4(Ipv4Addr::LOCALHOST)).is_none());
    }

    #[test]
    fn remove_first_match() {
        let mut table = RouteTable::new();
        table.add(route(1, RouteAddress::Wildcard));
        assert!(table.remove(|r| r.source_ref == 1).is_ok());
        assert!(table.is_empty());
        assert!(matches!(table.remove(|r| r.source_ref == 1), Err(RouteError::NotFound)));
    }
}
