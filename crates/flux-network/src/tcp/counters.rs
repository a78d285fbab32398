use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-visible tallies. Updated only from the reactor thread; readable
/// concurrently and eventually consistent, matching this workspace's
/// preference for lock-free counters over a mutex-guarded struct.
#[derive(Debug, Default)]
pub struct Counters {
    streams: AtomicU64,
    routes: AtomicU64,
    overflows: AtomicU64,
}

impl Counters {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn stream_opened(&self) {
        self.streams.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stream_closed(&self) {
        self.streams.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn route_added(&self) {
        self.routes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn route_removed(&self) {
        self.routes.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn streams(&self) -> u64 {
        self.streams.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn routes(&self) -> u64 {
        self.routes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }
}
