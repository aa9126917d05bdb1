//! The worker loop servicing one interface.
//!
//! Every iteration runs two polling steps in a fixed order:
//! - Transmit: take at most one queued packet, prepend its header, write it.
//! - Receive: read once from the driver, strip the header, dispatch upward.
//!
//! Failures in either step are counted and logged; none ends the loop.

use crate::buffer::PacketBuf;
use crate::driver::{Driver, is_idle_error};
use crate::error::Error;
use crate::framing;
use crate::interface::{Interface, Shared};
use crate::queue::QueueReceiver;
use std::io;
use std::sync::PoisonError;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// Iterations run back to back per tick of [`Interface::run`] while work is found.
const STEP_BATCH: usize = 32;

/// Per-interface state touched only by the worker.
pub struct AdapterState {
    outbound: QueueReceiver,
    /// One byte longer than the MTU so oversized frames are detectable.
    scratch: Vec<u8>,
}

impl AdapterState {
    pub(crate) fn new(outbound: QueueReceiver, mtu: usize) -> Self {
        Self {
            outbound,
            scratch: vec![0u8; mtu + 1],
        }
    }

    /// Largest frame accepted from the driver.
    pub fn mtu(&self) -> usize {
        self.scratch.len() - 1
    }

    pub(crate) fn close(&mut self) -> usize {
        self.outbound.close()
    }
}

/// Driver and adapter state, locked together for one iteration.
pub(crate) struct Link {
    pub(crate) driver: Option<Box<dyn Driver>>,
    pub(crate) state: AdapterState,
}

/// What one iteration of the worker loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// A queued packet was taken and handed to the driver.
    pub transmitted: bool,
    /// The driver returned a frame (accepted or rejected).
    pub received: bool,
}

impl StepOutcome {
    pub fn is_idle(&self) -> bool {
        !self.transmitted && !self.received
    }
}

impl Interface {
    /// Run one iteration of the worker loop: transmit, then receive.
    ///
    /// This is how [`ExecutionMode::Stepped`](crate::ExecutionMode::Stepped)
    /// interfaces are driven. After deinit it does nothing.
    pub fn step(&self) -> StepOutcome {
        if self.is_closed() {
            return StepOutcome::default();
        }
        let outcome = {
            let mut link = self.inner.link.lock().unwrap_or_else(PoisonError::into_inner);
            let Link { driver, state } = &mut *link;
            let Some(driver) = driver.as_mut() else {
                return StepOutcome::default();
            };
            let driver: &mut dyn Driver = &mut **driver;

            self.set_stepping(Some(thread::current().id()));
            let transmitted = transmit(&self.inner, driver, state);
            let received = receive(&self.inner, driver, state);
            self.set_stepping(None);

            StepOutcome {
                transmitted,
                received,
            }
        };

        // deinit called back from the driver or dispatch left teardown to us
        if self.is_closed() {
            self.teardown();
        }
        outcome
    }

    fn set_stepping(&self, thread: Option<thread::ThreadId>) {
        *self
            .inner
            .stepping
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = thread;
    }

    /// Drive the worker loop from an async task until the interface is torn down.
    ///
    /// Each tick of `period` runs iterations back to back while they find
    /// work, up to a fixed batch. Driver calls run inline, so drivers used
    /// this way should not block.
    pub async fn run(&self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.is_closed() {
            interval.tick().await;
            for _ in 0..STEP_BATCH {
                if self.step().is_idle() {
                    break;
                }
            }
        }
        trace!(iface = %self.name(), "stepped worker finished");
    }
}

/// Start the dedicated worker thread of `iface`.
pub(crate) fn spawn(iface: &Interface) -> io::Result<()> {
    let worker = iface.clone();
    let idle = iface.inner.config.idle_interval();

    let handle = thread::Builder::new()
        .name(format!("ifgen-{}", iface.name()))
        .spawn(move || {
            trace!(iface = %worker.name(), "worker started");
            while !worker.is_closed() {
                if worker.step().is_idle() {
                    match idle {
                        Some(interval) => thread::sleep(interval),
                        None => thread::yield_now(),
                    }
                }
            }
            trace!(iface = %worker.name(), "worker stopped");
        })?;

    *iface
        .inner
        .worker
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    Ok(())
}

fn transmit(shared: &Shared, driver: &mut dyn Driver, state: &mut AdapterState) -> bool {
    let Some(mut packet) = state.outbound.try_dequeue() else {
        return false;
    };

    let frame = framing::frame(&mut packet, shared.version);
    let expected = frame.len();
    match driver.write(frame) {
        Ok(written) if written == expected => {
            shared.counters.tx.fetch_add(1, Ordering::Relaxed);
            shared
                .counters
                .tx_bytes
                .fetch_add(written as u64, Ordering::Relaxed);
            trace!(iface = %shared.name, len = written, "frame sent");
        }
        Ok(written) => {
            shared.counters.tx_error.fetch_add(1, Ordering::Relaxed);
            warn!(iface = %shared.name, written, expected, "short frame write");
        }
        Err(e) => {
            shared.counters.tx_error.fetch_add(1, Ordering::Relaxed);
            warn!(iface = %shared.name, error = %Error::Transport(e), "unable to send frame");
        }
    }
    // the packet is released here whatever the outcome
    true
}

fn receive(shared: &Shared, driver: &mut dyn Driver, state: &mut AdapterState) -> bool {
    let mtu = state.mtu();
    let len = match driver.read(&mut state.scratch) {
        Ok(0) => return false,
        Ok(len) if len > mtu => {
            shared.counters.rx_error.fetch_add(1, Ordering::Relaxed);
            debug!(iface = %shared.name, mtu, "discarding frame larger than mtu");
            return true;
        }
        Ok(len) => len,
        Err(e) if is_idle_error(&e) => return false,
        Err(e) => {
            shared.counters.rx_error.fetch_add(1, Ordering::Relaxed);
            warn!(iface = %shared.name, error = %Error::Transport(e), "unable to read frame");
            return false;
        }
    };

    match framing::deframe(&state.scratch[..len], shared.version, &shared.pool) {
        Ok(packet) => {
            shared.counters.rx.fetch_add(1, Ordering::Relaxed);
            shared
                .counters
                .rx_bytes
                .fetch_add(len as u64, Ordering::Relaxed);
            trace!(iface = %shared.name, len, "frame received");
            deliver(shared, packet);
        }
        Err(e) => {
            shared.counters.rx_error.fetch_add(1, Ordering::Relaxed);
            debug!(iface = %shared.name, error = %e, "discarding received frame");
        }
    }
    true
}

fn deliver(shared: &Shared, packet: PacketBuf) {
    if let Err(rejected) = shared.dispatch.deliver(packet, &shared.name) {
        shared.counters.drop.fetch_add(1, Ordering::Relaxed);
        debug!(iface = %shared.name, len = rejected.len(), "receive queue full, packet dropped");
    }
}
