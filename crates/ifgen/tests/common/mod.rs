//! Shared helpers for interface integration tests.

#![allow(dead_code)]

use ifgen::{Driver, Interface, PacketBuf, PacketId, Stack};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Recording {
    written: Vec<Vec<u8>>,
    inbound: VecDeque<Vec<u8>>,
    cleanups: usize,
    fail_writes: bool,
    short_writes: bool,
    fail_reads: Option<io::ErrorKind>,
}

/// Driver that records every written frame and replays injected ones.
///
/// Clones share state, so a test keeps one clone to inspect what the
/// interface did with the other.
#[derive(Clone, Default)]
pub struct RecordingDriver {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw frame for the interface to read.
    pub fn inject(&self, frame: &[u8]) {
        self.inner.lock().unwrap().inbound.push_back(frame.to_vec());
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().written.clone()
    }

    pub fn cleanups(&self) -> usize {
        self.inner.lock().unwrap().cleanups
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_writes = fail;
    }

    /// Make every read fail with `kind`, or restore normal reads with `None`.
    pub fn fail_reads(&self, kind: Option<io::ErrorKind>) {
        self.inner.lock().unwrap().fail_reads = kind;
    }

    pub fn short_writes(&self, short: bool) {
        self.inner.lock().unwrap().short_writes = short;
    }
}

impl Driver for RecordingDriver {
    fn write(&mut self, frame: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link down"));
        }
        inner.written.push(frame.to_vec());
        if inner.short_writes {
            return Ok(frame.len() / 2);
        }
        Ok(frame.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(kind) = inner.fail_reads {
            return Err(io::Error::new(kind, "read failed"));
        }
        match inner.inbound.pop_front() {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(len)
            }
            None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no frame")),
        }
    }

    fn cleanup(&mut self) {
        self.inner.lock().unwrap().cleanups += 1;
    }
}

/// Take a packet from the stack pool carrying `payload`.
pub fn packet(stack: &Stack, id: PacketId, payload: &[u8]) -> PacketBuf {
    let mut packet = stack
        .pool()
        .acquire(payload.len())
        .expect("Failed to acquire packet buffer");
    packet.set_id(id);
    assert!(packet.set_data(payload));
    packet
}

pub fn test_id() -> PacketId {
    PacketId {
        priority: 2,
        source: 1,
        destination: 2,
        destination_port: 10,
        source_port: 20,
        flags: 0,
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Step `iface` until it reports an idle iteration.
pub fn drain(iface: &Interface) {
    while !iface.step().is_idle() {}
}
