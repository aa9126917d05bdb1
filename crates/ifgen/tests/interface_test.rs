//! Interface lifecycle and worker loop tests.
//!
//! Interfaces here run in stepped mode so every iteration is driven
//! explicitly by the test.

mod common;

use common::{RecordingDriver, drain, packet, test_id, wait_until};
use ifgen::{
    Error, ExecutionMode, Interface, InterfaceName, Nexthop, PacketBuf, PacketId,
    ProtocolVersion, RxDispatch, SendError, Stack, StackConfig,
};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn stepped(stack: &Stack, name: &str, driver: &RecordingDriver) -> Interface {
    Interface::builder(name)
        .driver(driver.clone())
        .mode(ExecutionMode::Stepped)
        .init(stack)
        .expect("Failed to init interface")
}

fn v1_stack() -> (Stack, ifgen::RxReceiver) {
    Stack::new(StackConfig::default().version(ProtocolVersion::V1)).expect("Failed to create stack")
}

#[test]
fn test_init_without_driver_fails() {
    let (stack, _rx) = v1_stack();
    let result = Interface::builder("if0").init(&stack);

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert!(stack.registry().is_empty());
}

#[test]
fn test_init_rejects_bad_arguments() {
    let (stack, _rx) = v1_stack();

    let result = Interface::builder("")
        .driver(RecordingDriver::new())
        .init(&stack);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    let result = Interface::builder("if0")
        .driver(RecordingDriver::new())
        .queue_capacity(0)
        .init(&stack);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    assert!(stack.registry().is_empty());
}

#[test]
fn test_init_registers_interface() {
    let (stack, _rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);

    assert_eq!(iface.name().as_str(), "if0");
    assert_eq!(iface.mode(), ExecutionMode::Stepped);
    let found = stack.interface("if0").expect("interface not registered");
    assert_eq!(found.name(), iface.name());
}

#[test]
fn test_duplicate_name_rejected() {
    let (stack, _rx) = v1_stack();
    let first = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &first);

    let second = RecordingDriver::new();
    let result = Interface::builder("if0")
        .driver(second.clone())
        .mode(ExecutionMode::Stepped)
        .init(&stack);

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(stack.registry().len(), 1);
    // a rejected driver is dropped, never cleaned up
    assert_eq!(second.cleanups(), 0);
    assert!(!iface.is_closed());
    assert_eq!(first.cleanups(), 0);
}

#[test]
fn test_v1_frame_is_header_plus_payload() {
    let (stack, _rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);

    let payload = [0xAAu8; 10];
    iface
        .send(packet(&stack, test_id(), &payload))
        .expect("Failed to queue packet");
    assert_eq!(iface.queued(), 1);

    let outcome = iface.step();
    assert!(outcome.transmitted);

    let written = driver.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].len(), 14);
    assert_eq!(&written[0][..4], &[0x82, 0x22, 0x94, 0x00]);
    assert_eq!(&written[0][4..], &payload);

    let stats = iface.stats();
    assert_eq!(stats.tx, 1);
    assert_eq!(stats.tx_bytes, 14);
}

#[test]
fn test_v2_frame_uses_six_byte_header() {
    let (stack, _rx) = Stack::new(StackConfig::default()).expect("Failed to create stack");
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);

    iface
        .send(packet(&stack, test_id(), b"abc"))
        .expect("Failed to queue packet");
    iface.step();

    let written = driver.written();
    assert_eq!(written[0].len(), 9);
    assert_eq!(
        PacketId::decode(ProtocolVersion::V2, &written[0][..6]),
        Some(test_id())
    );
}

#[test]
fn test_transmit_preserves_fifo_order() {
    let (stack, _rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);

    for payload in [b"A", b"B", b"C"] {
        iface
            .send(packet(&stack, test_id(), payload))
            .expect("Failed to queue packet");
    }

    // one packet per iteration
    for expected in 1..=3 {
        assert!(iface.step().transmitted);
        assert_eq!(driver.written().len(), expected);
    }
    assert!(iface.step().is_idle());

    let payloads: Vec<u8> = driver.written().iter().map(|frame| frame[4]).collect();
    assert_eq!(payloads, b"ABC");
}

#[test]
fn test_transmitted_packets_return_to_pool() {
    let (stack, _rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);
    let capacity = stack.pool().capacity();

    iface
        .send(packet(&stack, test_id(), b"data"))
        .expect("Failed to queue packet");
    assert_eq!(stack.pool().available(), capacity - 1);

    iface.step();
    assert_eq!(stack.pool().available(), capacity);
}

#[test]
fn test_queue_full_hands_packet_back() {
    let (stack, _rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = Interface::builder("if0")
        .driver(driver.clone())
        .mode(ExecutionMode::Stepped)
        .queue_capacity(2)
        .init(&stack)
        .expect("Failed to init interface");

    iface.send(packet(&stack, test_id(), b"1")).unwrap();
    iface.send(packet(&stack, test_id(), b"2")).unwrap();

    let err = iface
        .nexthop(2, packet(&stack, test_id(), b"3"), true)
        .unwrap_err();
    assert!(err.is_full());
    let rejected = err.into_packet();
    assert_eq!(rejected.data(), b"3");

    // the loop keeps draining and the caller can retry
    iface.step();
    iface.send(rejected).expect("Failed to requeue packet");
    drain(&iface);

    let payloads: Vec<u8> = driver.written().iter().map(|frame| frame[4]).collect();
    assert_eq!(payloads, b"123");
}

#[test]
fn test_write_failure_counts_tx_error_and_releases_packet() {
    let (stack, _rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);
    let capacity = stack.pool().capacity();

    driver.fail_writes(true);
    iface.send(packet(&stack, test_id(), b"lost")).unwrap();
    iface.step();

    let stats = iface.stats();
    assert_eq!(stats.tx, 0);
    assert_eq!(stats.tx_error, 1);
    assert_eq!(stack.pool().available(), capacity);

    // the next packet goes through once the link recovers
    driver.fail_writes(false);
    iface.send(packet(&stack, test_id(), b"ok")).unwrap();
    iface.step();
    assert_eq!(iface.stats().tx, 1);
}

#[test]
fn test_short_write_counts_tx_error() {
    let (stack, _rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);

    driver.short_writes(true);
    iface.send(packet(&stack, test_id(), b"truncated")).unwrap();
    iface.step();

    assert_eq!(iface.stats().tx_error, 1);
    assert_eq!(iface.stats().tx, 0);
}

#[test]
fn test_received_frame_is_dispatched() {
    let (stack, mut rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);

    let mut frame = vec![0x82, 0x22, 0x94, 0x00];
    frame.extend_from_slice(b"payload");
    driver.inject(&frame);

    let outcome = iface.step();
    assert!(outcome.received);
    assert!(!outcome.transmitted);

    let msg = rx.try_recv().expect("no packet dispatched");
    assert_eq!(msg.iface.as_str(), "if0");
    assert_eq!(msg.packet.id(), &test_id());
    assert_eq!(msg.packet.data(), b"payload");

    let stats = iface.stats();
    assert_eq!(stats.rx, 1);
    assert_eq!(stats.rx_bytes, 11);
}

#[test]
fn test_header_only_frame_gives_empty_packet() {
    let (stack, mut rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);

    driver.inject(&[0x82, 0x22, 0x94, 0x00]);
    iface.step();

    let msg = rx.try_recv().expect("no packet dispatched");
    assert!(msg.packet.is_empty());
}

#[test]
fn test_short_frame_rejected() {
    let (stack, mut rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);
    let available = stack.pool().available();

    driver.inject(&[0x01, 0x02, 0x03]);
    iface.step();

    assert_eq!(iface.stats().rx_error, 1);
    assert_eq!(iface.stats().rx, 0);
    assert_eq!(stack.pool().available(), available);
    assert!(rx.try_recv().is_none());
}

#[test]
fn test_pool_exhaustion_counts_rx_error() {
    let config = StackConfig::default()
        .version(ProtocolVersion::V1)
        .buffers(1, 32);
    let (stack, mut rx) = Stack::new(config).expect("Failed to create stack");
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);

    let held = stack.pool().acquire(1).expect("Failed to acquire packet buffer");
    driver.inject(&[0x82, 0x22, 0x94, 0x00, 0xFF]);
    iface.step();

    assert_eq!(iface.stats().rx_error, 1);
    assert!(rx.try_recv().is_none());

    // once the buffer is back, reception resumes
    drop(held);
    driver.inject(&[0x82, 0x22, 0x94, 0x00, 0xFF]);
    iface.step();
    assert_eq!(iface.stats().rx, 1);
    assert!(rx.try_recv().is_some());
}

#[test]
fn test_full_dispatch_counts_drop() {
    let config = StackConfig::default()
        .version(ProtocolVersion::V1)
        .dispatch_capacity(1);
    let (stack, mut rx) = Stack::new(config).expect("Failed to create stack");
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);
    let capacity = stack.pool().capacity();

    driver.inject(&[0x82, 0x22, 0x94, 0x00, 1]);
    driver.inject(&[0x82, 0x22, 0x94, 0x00, 2]);
    drain(&iface);

    let stats = iface.stats();
    assert_eq!(stats.rx, 2);
    assert_eq!(stats.drop, 1);
    // only the delivered packet still holds a buffer
    assert_eq!(stack.pool().available(), capacity - 1);

    let msg = rx.try_recv().expect("no packet dispatched");
    assert_eq!(msg.packet.data(), &[1]);
}

#[test]
fn test_transmit_runs_before_receive() {
    let (stack, mut rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);

    iface.send(packet(&stack, test_id(), b"out")).unwrap();
    driver.inject(&[0x82, 0x22, 0x94, 0x00, b'i', b'n']);

    let outcome = iface.step();
    assert!(outcome.transmitted);
    assert!(outcome.received);
    assert_eq!(driver.written().len(), 1);
    assert_eq!(rx.try_recv().expect("no packet dispatched").packet.data(), b"in");
}

#[test]
fn test_deinit_is_idempotent() {
    let (stack, _rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);

    iface.deinit();
    iface.deinit();

    assert!(iface.is_closed());
    assert_eq!(driver.cleanups(), 1);
    assert!(stack.interface("if0").is_none());
    assert!(iface.step().is_idle());

    let err = iface.send(packet(&stack, test_id(), b"late")).unwrap_err();
    assert!(matches!(err, SendError::Closed(_)));
}

#[test]
fn test_deinit_releases_queued_packets() {
    let (stack, _rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);
    let capacity = stack.pool().capacity();

    iface.send(packet(&stack, test_id(), b"1")).unwrap();
    iface.send(packet(&stack, test_id(), b"2")).unwrap();
    iface.deinit();

    assert_eq!(iface.stats().drop, 2);
    assert_eq!(stack.pool().available(), capacity);
    assert!(driver.written().is_empty());
}

#[test]
fn test_name_is_reusable_after_deinit() {
    let (stack, _rx) = v1_stack();
    let driver = RecordingDriver::new();
    let old = stepped(&stack, "if0", &driver);
    old.deinit();

    let fresh = stepped(&stack, "if0", &RecordingDriver::new());
    // tearing down the stale handle again must not evict the new one
    old.deinit();
    assert!(stack.interface("if0").is_some());
    assert!(!fresh.is_closed());
}

#[test]
fn test_dropping_stack_tears_down_interfaces() {
    let (stack, _rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);

    drop(stack);
    assert!(iface.is_closed());
    assert_eq!(driver.cleanups(), 1);
}

#[test]
fn test_oversized_frame_counts_rx_error() {
    // mtu is 4 + 8 = 12 bytes
    let config = StackConfig::default()
        .version(ProtocolVersion::V1)
        .buffers(4, 8);
    let (stack, mut rx) = Stack::new(config).expect("Failed to create stack");
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);
    let available = stack.pool().available();

    let mut frame = vec![0x82, 0x22, 0x94, 0x00];
    frame.extend_from_slice(&[0x55; 20]);
    driver.inject(&frame);
    assert!(iface.step().received);

    let stats = iface.stats();
    assert_eq!(stats.rx_error, 1);
    assert_eq!(stats.rx, 0);
    assert_eq!(stack.pool().available(), available);
    assert!(rx.try_recv().is_none());

    // a frame of exactly the mtu still fits
    driver.inject(&frame[..12]);
    iface.step();
    assert_eq!(iface.stats().rx, 1);
    assert_eq!(rx.try_recv().expect("no packet dispatched").packet.len(), 8);
}

#[test]
fn test_read_error_counts_rx_error() {
    let (stack, mut rx) = v1_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);

    driver.fail_reads(Some(io::ErrorKind::BrokenPipe));
    iface.step();
    iface.step();
    assert_eq!(iface.stats().rx_error, 2);

    // "nothing available" is not an error
    for kind in [
        io::ErrorKind::WouldBlock,
        io::ErrorKind::Interrupted,
        io::ErrorKind::TimedOut,
    ] {
        driver.fail_reads(Some(kind));
        assert!(iface.step().is_idle());
    }
    assert_eq!(iface.stats().rx_error, 2);

    // the loop keeps going once the driver recovers
    driver.fail_reads(None);
    driver.inject(&[0x82, 0x22, 0x94, 0x00, 7]);
    iface.step();
    assert_eq!(iface.stats().rx, 1);
    assert_eq!(rx.try_recv().expect("no packet dispatched").packet.data(), &[7]);
}

/// Dispatcher that tears its interface down from inside `deliver`.
#[derive(Default)]
struct DeinitOnDeliver {
    iface: Mutex<Option<Interface>>,
}

impl RxDispatch for DeinitOnDeliver {
    fn deliver(&self, _packet: PacketBuf, _source: &InterfaceName) -> Result<(), PacketBuf> {
        if let Some(iface) = self.iface.lock().unwrap().take() {
            iface.deinit();
        }
        Ok(())
    }
}

fn deinit_on_deliver_stack() -> (Stack, Arc<DeinitOnDeliver>) {
    let dispatch = Arc::new(DeinitOnDeliver::default());
    let stack = Stack::with_dispatch(
        StackConfig::default().version(ProtocolVersion::V1),
        dispatch.clone(),
    )
    .expect("Failed to create stack");
    (stack, dispatch)
}

#[test]
fn test_deinit_from_dispatch_in_stepped_mode() {
    let (stack, dispatch) = deinit_on_deliver_stack();
    let driver = RecordingDriver::new();
    let iface = stepped(&stack, "if0", &driver);
    *dispatch.iface.lock().unwrap() = Some(iface.clone());

    driver.inject(&[0x82, 0x22, 0x94, 0x00]);
    iface.step();

    assert!(iface.is_closed());
    assert_eq!(driver.cleanups(), 1);
    assert!(stack.interface("if0").is_none());
}

#[test]
fn test_deinit_from_dispatch_on_worker_thread() {
    let (stack, dispatch) = deinit_on_deliver_stack();
    let driver = RecordingDriver::new();
    let iface = Interface::builder("if0")
        .driver(driver.clone())
        .init(&stack)
        .expect("Failed to init interface");
    *dispatch.iface.lock().unwrap() = Some(iface.clone());

    driver.inject(&[0x82, 0x22, 0x94, 0x00]);
    assert!(wait_until(Duration::from_secs(2), || driver.cleanups() == 1));
    assert!(iface.is_closed());
    assert!(stack.interface("if0").is_none());

    // joins the finished worker without hanging
    iface.deinit();
    drop(stack);
    assert_eq!(driver.cleanups(), 1);
}
