use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id generator. Shared by the stream id and correlation id
/// spaces; a stream id, once assigned, is never reused.
#[derive(Debug, Default)]
pub struct IdGenerator(AtomicU64);

impl IdGenerator {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(pub u64);
