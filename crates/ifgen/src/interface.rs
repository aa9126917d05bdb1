//! Interface descriptor and its lifecycle.
//!
//! An [`Interface`] binds one [`Driver`] to the stack: it owns the driver,
//! the adapter state (outbound queue and scratch buffer) and the counters,
//! and exposes the [`Nexthop`] entry point the routing layer calls.
//!
//! # Example
//!
//! ```no_run
//! use ifgen::{ExecutionMode, Interface, LoopbackDriver, Stack, StackConfig};
//!
//! # fn example() -> ifgen::Result<()> {
//! let (stack, mut rx) = Stack::new(StackConfig::default())?;
//! let (a, b) = LoopbackDriver::pair(16);
//!
//! let left = Interface::builder("left").driver(a).init(&stack)?;
//! let right = Interface::builder("right")
//!     .driver(b)
//!     .mode(ExecutionMode::Stepped)
//!     .init(&stack)?;
//!
//! let mut packet = stack.pool().acquire(5).expect("pool exhausted");
//! packet.set_data(b"hello");
//! left.send(packet).map_err(ifgen::Error::from)?;
//!
//! right.step();
//! let msg = rx.blocking_recv();
//! # Ok(())
//! # }
//! ```

use crate::buffer::{BufferPool, PacketBuf};
use crate::config::{ExecutionMode, InterfaceConfig};
use crate::dispatch::RxDispatch;
use crate::driver::Driver;
use crate::error::{Error, Result, SendError};
use crate::header::ProtocolVersion;
use crate::queue::{QueueSender, outbound_queue};
use crate::registry::{InterfaceName, RegistryRef, interface_name};
use crate::stack::Stack;
use crate::worker::{self, AdapterState, Link};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, warn};

/// Entry point the routing layer uses to hand a packet to an interface.
pub trait Nexthop: Send + Sync {
    /// Queue `packet` for transmission.
    ///
    /// `via` and `from_me` are routing metadata; adapters may ignore them.
    /// On failure ownership stays with the caller: the packet comes back
    /// inside the error.
    fn nexthop(
        &self,
        via: u16,
        packet: PacketBuf,
        from_me: bool,
    ) -> std::result::Result<(), SendError>;
}

/// A registered communication endpoint bridging the stack to one driver.
///
/// Cloning yields another handle to the same interface.
#[derive(Clone)]
pub struct Interface {
    pub(crate) inner: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) name: InterfaceName,
    pub(crate) version: ProtocolVersion,
    pub(crate) config: InterfaceConfig,
    pub(crate) outbound: QueueSender,
    pub(crate) counters: Counters,
    pub(crate) link: Mutex<Link>,
    pub(crate) closed: AtomicBool,
    pub(crate) worker: Mutex<Option<JoinHandle<()>>>,
    /// Thread currently inside `step`, if any.
    pub(crate) stepping: Mutex<Option<ThreadId>>,
    pub(crate) registry: RegistryRef,
    pub(crate) pool: BufferPool,
    pub(crate) dispatch: Arc<dyn RxDispatch>,
}

impl Interface {
    /// Start describing a new interface called `name`.
    pub fn builder(name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder::new(name)
    }

    pub fn name(&self) -> &InterfaceName {
        &self.inner.name
    }

    pub fn version(&self) -> ProtocolVersion {
        self.inner.version
    }

    pub fn mode(&self) -> ExecutionMode {
        self.inner.config.mode
    }

    /// Snapshot of the interface counters.
    pub fn stats(&self) -> InterfaceStats {
        self.inner.counters.snapshot()
    }

    /// Number of packets waiting in the outbound queue.
    pub fn queued(&self) -> usize {
        self.inner.outbound.len()
    }

    /// Whether [`deinit`](Self::deinit) has run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Queue a packet addressed by its own header.
    pub fn send(&self, packet: PacketBuf) -> std::result::Result<(), SendError> {
        let via = packet.id().destination;
        self.nexthop(via, packet, true)
    }

    /// Queue a packet, waiting up to `timeout` for queue space.
    pub async fn enqueue_timeout(
        &self,
        packet: PacketBuf,
        timeout: Duration,
    ) -> std::result::Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed(packet));
        }
        self.inner.outbound.enqueue(packet, timeout).await
    }

    /// Tear the interface down.
    ///
    /// Stops an owned worker, runs the driver's cleanup, releases packets
    /// still queued and removes the interface from its registry. Calling it
    /// again is a no-op.
    ///
    /// When called from inside an iteration (a driver or dispatch callback),
    /// only the stop is recorded here; that iteration finishes the teardown
    /// once it returns.
    pub fn deinit(&self) {
        let first = !self.inner.closed.swap(true, Ordering::AcqRel);
        if first {
            debug!(iface = %self.inner.name, "interface down");
        }

        let current = thread::current().id();
        let worker = {
            let mut worker = self.inner.worker.lock().unwrap_or_else(PoisonError::into_inner);
            match worker.as_ref() {
                // joined later by a deinit from another thread
                Some(handle) if handle.thread().id() == current => None,
                _ => worker.take(),
            }
        };
        if let Some(handle) = worker {
            if handle.join().is_err() {
                warn!(iface = %self.inner.name, "worker thread panicked");
            }
        }

        if self.is_stepping_on(current) {
            return;
        }
        self.teardown();
    }

    /// Run the driver cleanup, drain the queue and deregister. Idempotent.
    pub(crate) fn teardown(&self) {
        {
            let mut link = self.inner.link.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(mut driver) = link.driver.take() {
                driver.cleanup();
            }
            let discarded = link.state.close();
            if discarded > 0 {
                self.inner
                    .counters
                    .drop
                    .fetch_add(discarded as u64, Ordering::Relaxed);
                debug!(iface = %self.inner.name, discarded, "released queued packets");
            }
        }
        self.inner.registry.remove(self);
    }

    /// Drop an interface that never came up, leaving the caller's driver
    /// uncleaned.
    fn abandon(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.registry.remove(self);
        let mut link = self.inner.link.lock().unwrap_or_else(PoisonError::into_inner);
        link.driver = None;
    }

    fn is_stepping_on(&self, thread: ThreadId) -> bool {
        *self
            .inner
            .stepping
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            == Some(thread)
    }

    pub(crate) fn same_as(&self, other: &Interface) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Nexthop for Interface {
    fn nexthop(
        &self,
        _via: u16,
        packet: PacketBuf,
        _from_me: bool,
    ) -> std::result::Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed(packet));
        }
        self.inner.outbound.try_enqueue(packet)
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.inner.name)
            .field("version", &self.inner.version)
            .field("mode", &self.inner.config.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder that validates and registers an [`Interface`].
pub struct InterfaceBuilder {
    name: String,
    driver: Option<Box<dyn Driver>>,
    config: InterfaceConfig,
}

impl InterfaceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: None,
            config: InterfaceConfig::default(),
        }
    }

    /// Set the driver carrying this interface's frames.
    pub fn driver<D: Driver>(mut self, driver: D) -> Self {
        self.driver = Some(Box::new(driver));
        self
    }

    /// Set an already boxed driver, or clear it with `None`.
    pub fn boxed_driver(mut self, driver: Option<Box<dyn Driver>>) -> Self {
        self.driver = driver;
        self
    }

    pub fn config(mut self, config: InterfaceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Pause of an owned worker after an iteration that found no work.
    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.config.idle_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Wire the interface up and register it with `stack`.
    ///
    /// In [`ExecutionMode::Thread`] this also starts the worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if no driver was given, the name is
    /// empty, too long or already registered, or the queue capacity is zero.
    /// Nothing is registered when an error is returned, and the driver is
    /// dropped without its cleanup running.
    pub fn init(self, stack: &Stack) -> Result<Interface> {
        let Some(driver) = self.driver else {
            return Err(Error::InvalidArgument("driver is required".to_string()));
        };
        let name = interface_name(&self.name)?;
        if self.config.queue_capacity == 0 {
            return Err(Error::InvalidArgument(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        let (outbound, receiver) = outbound_queue(self.config.queue_capacity);
        let state = AdapterState::new(receiver, stack.config().mtu());
        let mode = self.config.mode;

        let iface = Interface {
            inner: Arc::new(Shared {
                name,
                version: stack.config().version,
                config: self.config,
                outbound,
                counters: Counters::default(),
                link: Mutex::new(Link {
                    driver: Some(driver),
                    state,
                }),
                closed: AtomicBool::new(false),
                worker: Mutex::new(None),
                stepping: Mutex::new(None),
                registry: stack.registry().downgrade(),
                pool: stack.pool().clone(),
                dispatch: stack.dispatch(),
            }),
        };

        if let Err(e) = stack.registry().add(iface.clone()) {
            iface.abandon();
            return Err(e);
        }

        if mode == ExecutionMode::Thread
            && let Err(e) = worker::spawn(&iface)
        {
            iface.abandon();
            return Err(Error::Io(e));
        }

        debug!(
            iface = %iface.inner.name,
            version = %iface.inner.version,
            mode = ?mode,
            "interface up"
        );
        Ok(iface)
    }
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) tx: AtomicU64,
    pub(crate) rx: AtomicU64,
    pub(crate) tx_error: AtomicU64,
    pub(crate) rx_error: AtomicU64,
    pub(crate) drop: AtomicU64,
    pub(crate) tx_bytes: AtomicU64,
    pub(crate) rx_bytes: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> InterfaceStats {
        InterfaceStats {
            tx: self.tx.load(Ordering::Relaxed),
            rx: self.rx.load(Ordering::Relaxed),
            tx_error: self.tx_error.load(Ordering::Relaxed),
            rx_error: self.rx_error.load(Ordering::Relaxed),
            drop: self.drop.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of an interface's counters.
///
/// Every counter only ever grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceStats {
    /// Frames written to the driver.
    pub tx: u64,
    /// Frames accepted from the driver and delivered.
    pub rx: u64,
    /// Failed or short driver writes.
    pub tx_error: u64,
    /// Driver read errors, short frames and receive buffer exhaustion.
    pub rx_error: u64,
    /// Packets released without delivery (dispatch full, queued at teardown).
    pub drop: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

impl fmt::Display for InterfaceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tx: {:05} rx: {:05} txe: {:05} rxe: {:05} drop: {:05} txb: {} rxb: {}",
            self.tx,
            self.rx,
            self.tx_error,
            self.rx_error,
            self.drop,
            self.tx_bytes,
            self.rx_bytes
        )
    }
}
