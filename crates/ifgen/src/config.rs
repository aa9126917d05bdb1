use crate::buffer::{DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_DATA_SIZE};
use crate::dispatch::DEFAULT_DISPATCH_CAPACITY;
use crate::error::{Error, Result};
use crate::header::ProtocolVersion;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default outbound queue depth per interface.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default pause of an owned worker after an iteration with no work.
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 1;

/// Configuration shared by every interface of a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Protocol version, which fixes the header size (1 → 4 bytes, 2 → 6 bytes).
    pub version: ProtocolVersion,
    /// Number of packet buffers in the shared pool.
    pub buffer_count: usize,
    /// Payload capacity of each pool buffer.
    pub buffer_data_size: usize,
    /// Depth of the receive dispatch queue.
    pub dispatch_capacity: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::default(),
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_data_size: DEFAULT_BUFFER_DATA_SIZE,
            dispatch_capacity: DEFAULT_DISPATCH_CAPACITY,
        }
    }
}

impl StackConfig {
    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    pub fn buffers(mut self, count: usize, data_size: usize) -> Self {
        self.buffer_count = count;
        self.buffer_data_size = data_size;
        self
    }

    pub fn dispatch_capacity(mut self, capacity: usize) -> Self {
        self.dispatch_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_count == 0 {
            return Err(Error::Config("buffer_count must be at least 1".into()));
        }
        if self.buffer_data_size == 0 {
            return Err(Error::Config("buffer_data_size must be at least 1".into()));
        }
        if self.dispatch_capacity == 0 {
            return Err(Error::Config("dispatch_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Largest frame an interface can receive: one header plus a full buffer.
    pub fn mtu(&self) -> usize {
        self.version.header_size() + self.buffer_data_size
    }
}

/// Who drives an interface's worker loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// The adapter owns a dedicated thread that loops until deinit.
    #[default]
    Thread,
    /// The caller drives iterations via `Interface::step` or `Interface::run`.
    Stepped,
}

/// Per-interface configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceConfig {
    /// Outbound queue depth.
    pub queue_capacity: usize,
    pub mode: ExecutionMode,
    /// Sleep of an owned worker after an idle iteration. Zero only yields.
    pub idle_interval_ms: u64,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mode: ExecutionMode::default(),
            idle_interval_ms: DEFAULT_IDLE_INTERVAL_MS,
        }
    }
}

impl InterfaceConfig {
    pub fn idle_interval(&self) -> Option<Duration> {
        (self.idle_interval_ms > 0).then(|| Duration::from_millis(self.idle_interval_ms))
    }
}
