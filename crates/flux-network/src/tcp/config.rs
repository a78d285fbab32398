/// Tunables for a nukleus TCP reactor, grouped into one builder-style struct
/// rather than scattered constants, following this crate's existing
/// `with_*`-method configuration idiom.
#[derive(Debug, Clone)]
pub struct NukleusConfig {
    pub(crate) write_spin_count: u8,
    pub(crate) read_buffer_capacity: usize,
    pub(crate) slot_size: usize,
    pub(crate) slot_count: usize,
    pub(crate) initial_window: u32,
    pub(crate) socket_buf_size: Option<usize>,
}

impl Default for NukleusConfig {
    fn default() -> Self {
        Self {
            write_spin_count: 4,
            read_buffer_capacity: 64 * 1024,
            slot_size: 64 * 1024,
            slot_count: 256,
            initial_window: 64 * 1024,
            socket_buf_size: None,
        }
    }
}

impl NukleusConfig {
    /// Number of immediate write retries attempted before a partial write is
    /// buffered into a slot. Must be at least 2; the spec treats the exact
    /// value as a tunable.
    #[must_use]
    pub fn with_write_spin_count(mut self, count: u8) -> Self {
        debug_assert!(count >= 2, "WRITE_SPIN_COUNT must be >= 2");
        self.write_spin_count = count;
        self
    }

    #[must_use]
    pub fn with_read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.read_buffer_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_slot_size(mut self, size: usize) -> Self {
        self.slot_size = size;
        self
    }

    #[must_use]
    pub fn with_slot_count(mut self, count: usize) -> Self {
        self.slot_count = count;
        self
    }

    #[must_use]
    pub fn with_initial_window(mut self, window: u32) -> Self {
        self.initial_window = window;
        self
    }

    #[must_use]
    pub fn with_socket_buf_size(mut self, size: usize) -> Self {
        self.socket_buf_size = Some(size);
        self
    }
}
