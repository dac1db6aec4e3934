//! Store configuration.

use std::time::Duration;

/// Configuration for opening a capped store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of the circular data region, in kilobytes.
    pub size_kb: u64,

    /// How often the periodic flush task forces bookkeeping to disk.
    pub fsync_interval: Duration,

    /// Buffer size placed between the decompressor and the raw block
    /// reader. Each raw read is a seek+read under the store lock, so this
    /// should stay large.
    pub read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            size_kb: 10 * 1024, // 10 MB
            fsync_interval: Duration::from_secs(2),
            read_buffer_size: 32 * 1024,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity in kilobytes.
    #[must_use]
    pub const fn size_kb(mut self, size_kb: u64) -> Self {
        self.size_kb = size_kb;
        self
    }

    /// Sets the periodic flush interval.
    #[must_use]
    pub const fn fsync_interval(mut self, interval: Duration) -> Self {
        self.fsync_interval = interval;
        self
    }

    /// Sets the read buffer size.
    #[must_use]
    pub const fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }
}
