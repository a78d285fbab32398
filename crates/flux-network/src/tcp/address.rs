use std::net::IpAddr;

/// A route's bind/match address. Wildcards are a distinct variant rather
/// than a sentinel IP so matching never has to special-case `0.0.0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAddress {
    Wildcard,
    Specific(IpAddr),
}

impl RouteAddress {
    #[must_use]
    pub fn matches(&self, addr: IpAddr) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Specific(expected) => *expected == addr,
        }
    }
}

impl From<IpAddr> for RouteAddress {
    fn from(addr: IpAddr) -> Self {
        if addr.is_unspecified() { Self::Wildcard } else { Self::Specific(addr) }
    }
}
