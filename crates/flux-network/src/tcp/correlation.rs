use std::collections::HashMap;

use mio::Token;

use crate::tcp::ids::CorrelationId;
use crate::tcp::target::Throttle;

/// What's remembered between emitting a BEGIN toward the downstream target
/// and receiving its reply BEGIN: which connection it belongs to, and the
/// `Throttle` half the accept-time `Target`/`Throttle` pair produced, held
/// here until the `WriteStream` that will own it exists.
///
/// A `Correlation` is consumed at most once: [`CorrelationRegistry::remove`]
/// takes it by value so double delivery of a reply naturally finds nothing
/// the second time.
pub struct Correlation {
    pub connection: Token,
    pub source_name: String,
    pub throttle: Box<dyn Throttle>,
}

#[derive(Default)]
pub struct CorrelationRegistry {
    pending: HashMap<CorrelationId, Correlation>,
}

impl CorrelationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `correlation` against the already-issued id `id` (the same
    /// id embedded in the BEGIN frame sent to the target).
    pub fn put(&mut self, id: CorrelationId, correlation: Correlation) {
        self.pending.insert(id, correlation);
    }

    /// Consumes the entry for `id`, if any. A correlation is removed whether
    /// the lookup succeeds or not in the caller's reply-handling path, so it
    /// can never be redeemed twice.
    pub fn remove(&mut self, id: CorrelationId) -> Option<Correlation> {
        self.pending.remove(&id)
    }

    /// Drops any pending correlation tied to `connection`, used when the
    /// originating socket closes before a reply BEGIN arrives.
    pub fn purge_connection(&mut self, connection: Token) {
        self.pending.retain(|_, c| c.connection != connection);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::target::RecordingSink;

    fn correlation(connection: Token) -> Correlation {
        Correlation {
            connection,
            source_name: "tcp".to_string(),
            throttle: Box::new(RecordingSink::default()),
        }
    }

    #[test]
    fn reply_is_consumed_exactly_once() {
        let mut reg = CorrelationRegistry::new();
        let id = CorrelationId(1);
        reg.put(id, correlation(Token(1)));

        assert!(reg.remove(id).is_some());
        assert!(reg.remove(id).is_none());
    }

    #[test]
    fn purge_drops_only_matching_connection() {
        let mut reg = CorrelationRegistry::new();
        let (a, b) = (CorrelationId(1), CorrelationId(2));
        reg.put(a, correlation(Token(1)));
        reg.put(b, correlation(Token(2)));

        reg.purge_connection(Token(1));
        assert!(reg.remove(a).is_none());
        assert!(reg.remove(b).is_some());
    }
}
