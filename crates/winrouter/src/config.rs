use thiserror::Error;

/// Configuration errors (§7 "Configuration... surfaced at construction").
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("item_size must be greater than zero")]
    ZeroItemSize,
    #[error("window_len (W) must be greater than zero")]
    ZeroWindowLen,
    #[error("queue_capacity must be greater than zero")]
    ZeroQueueCapacity,
}

/// Recognized configuration options (§6). Built with `new` then refined
/// with `with_*` methods, in the manner of the transport crate's connector
/// builders.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    item_size: usize,
    window_len: usize,
    queue_capacity: usize,
    preserve_index: bool,
    order: bool,
    throughput_limit: Option<u32>,
    port: u16,
}

impl RouterConfig {
    /// `item_size` in bytes, `window_len` (`W`) in items. Defaults:
    /// `queue_capacity = 128`, `preserve_index = false`, `order = false`,
    /// no throughput limit, port 8080.
    pub fn new(item_size: usize, window_len: usize) -> Result<Self, ConfigError> {
        if item_size == 0 {
            return Err(ConfigError::ZeroItemSize);
        }
        if window_len == 0 {
            return Err(ConfigError::ZeroWindowLen);
        }
        Ok(Self {
            item_size,
            window_len,
            queue_capacity: 128,
            preserve_index: false,
            order: false,
            throughput_limit: None,
            port: 8080,
        })
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        self.queue_capacity = capacity;
        Ok(self)
    }

    pub fn with_preserve_index(mut self, preserve_index: bool) -> Self {
        self.preserve_index = preserve_index;
        self
    }

    pub fn with_order(mut self, order: bool) -> Self {
        self.order = order;
        self
    }

    pub fn with_throughput_limit(mut self, samples_per_sec: u32) -> Self {
        self.throughput_limit = Some(samples_per_sec);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn preserve_index(&self) -> bool {
        self.preserve_index
    }

    pub fn order(&self) -> bool {
        self.order
    }

    pub fn throughput_limit(&self) -> Option<u32> {
        self.throughput_limit
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
