use crate::buffer::BufferPool;
use crate::config::StackConfig;
use crate::dispatch::{RxDispatch, RxReceiver, rx_channel};
use crate::error::Result;
use crate::header::ProtocolVersion;
use crate::interface::Interface;
use crate::registry::Registry;
use std::sync::Arc;
use tracing::debug;

/// The stack context interfaces attach to.
///
/// Owns the shared buffer pool, the receive dispatch path and the interface
/// registry. Dropping the stack tears down every interface still registered.
pub struct Stack {
    config: StackConfig,
    pool: BufferPool,
    registry: Registry,
    dispatch: Arc<dyn RxDispatch>,
}

impl Stack {
    /// Create a stack whose received packets arrive on the returned receiver.
    pub fn new(config: StackConfig) -> Result<(Self, RxReceiver)> {
        config.validate()?;
        let (tx, rx) = rx_channel(config.dispatch_capacity);
        Ok((Self::build(config, Arc::new(tx)), rx))
    }

    /// Create a stack delivering received packets to a custom dispatcher.
    pub fn with_dispatch(config: StackConfig, dispatch: Arc<dyn RxDispatch>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, dispatch))
    }

    fn build(config: StackConfig, dispatch: Arc<dyn RxDispatch>) -> Self {
        let pool = BufferPool::new(config.buffer_count, config.buffer_data_size);
        debug!(
            version = %config.version,
            buffers = config.buffer_count,
            buffer_data_size = config.buffer_data_size,
            "stack initialized"
        );
        Self {
            config,
            pool,
            registry: Registry::new(),
            dispatch,
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn version(&self) -> ProtocolVersion {
        self.config.version
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Look up a live interface by name.
    pub fn interface(&self, name: &str) -> Option<Interface> {
        self.registry.get(name)
    }

    pub(crate) fn dispatch(&self) -> Arc<dyn RxDispatch> {
        self.dispatch.clone()
    }

    /// Deinitialize every registered interface.
    pub fn shutdown(&self) {
        for iface in self.registry.interfaces() {
            iface.deinit();
        }
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.shutdown();
    }
}
