//! Integration tests for the acquisition manager lifecycle
//!
//! These tests drive a manager over a simulated device:
//! - Buffer-size arbitration across taps
//! - Source start/stop following the enabled taps
//! - Stop draining, idempotence and error reporting
//! - Pausing the source around topology changes

#![cfg(feature = "mock-source")]

mod common;

use acqmux::backend::{AcquisitionManager, ManagerEvent, ManagerRegistry, MockContext, MockDevice};
use acqmux::config::AcquisitionConfig;
use acqmux::pipeline::{Gate, Samples, StageHandle, TapId};
use acqmux::AcqError;
use common::builders::ConsumerBuilder;
use common::mock_helpers::{create_test_context, fast_device};
use common::{drain, test_timeout, wait_until};
use std::sync::Arc;
use std::time::Duration;

fn open(context: &MockContext, device: &str, buffer_size: usize) -> AcquisitionManager {
    AcquisitionManager::open(context, device, buffer_size, AcquisitionConfig::default()).unwrap()
}

#[test]
fn test_two_tap_arbitration_scenario() {
    let context = create_test_context("dev0", 2);
    let manager = open(&context, "dev0", 512);
    let source = context.source_state("dev0").unwrap();

    let (chain_a, _rx_a) = ConsumerBuilder::new("a").build();
    let (chain_b, _rx_b) = ConsumerBuilder::new("b").build();
    let a = manager.attach(0, &chain_a, 1024).unwrap();
    let b = manager.attach(1, &chain_b, 4096).unwrap();
    assert!(!manager.is_running());

    manager.start(a).unwrap();
    assert!(manager.is_running());
    assert_eq!(manager.buffer_size(), 1024);

    manager.start(b).unwrap();
    assert_eq!(manager.buffer_size(), 4096);
    assert_eq!(source.buffer_size(), 4096);

    manager.stop(b).unwrap();
    assert_eq!(manager.buffer_size(), 1024);
    assert_eq!(source.buffer_size(), 1024);
    assert!(manager.is_running());

    manager.stop(a).unwrap();
    assert!(!manager.is_running());
    assert!(!source.is_running());
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let context = create_test_context("dev0", 1);
    let manager = open(&context, "dev0", 1024);
    let source = context.source_state("dev0").unwrap();
    let events = manager.subscribe();
    let (chain, _rx) = ConsumerBuilder::new("scope").build();
    let tap = manager.attach(0, &chain, 1024).unwrap();

    manager.start(tap).unwrap();
    manager.start(tap).unwrap();
    assert_eq!(source.start_count(), 1);
    assert!(manager.is_enabled(tap).unwrap());

    manager.stop(tap).unwrap();
    manager.stop(tap).unwrap();
    assert_eq!(source.stop_count(), 1);
    assert!(!manager.is_enabled(tap).unwrap());

    assert_eq!(
        drain(&events),
        vec![ManagerEvent::Started, ManagerEvent::Stopped]
    );
}

#[test]
fn test_unknown_tap_leaves_others_alone() {
    let context = create_test_context("dev0", 2);
    let manager = open(&context, "dev0", 1024);
    let (chain, rx) = ConsumerBuilder::new("scope").build();
    let (other_chain, _other_rx) = ConsumerBuilder::new("other").build();

    let live = manager.attach(0, &chain, 1024).unwrap();
    let gone = manager.attach(1, &other_chain, 1024).unwrap();
    manager.start(live).unwrap();
    manager.detach(gone).unwrap();
    let edges = manager.edge_count();

    for id in [gone, TapId(12345)] {
        assert!(matches!(manager.detach(id), Err(AcqError::UnknownTap(t)) if t == id));
        assert!(matches!(manager.start(id), Err(AcqError::UnknownTap(_))));
        assert!(matches!(manager.stop(id), Err(AcqError::UnknownTap(_))));
    }

    assert_eq!(manager.edge_count(), edges);
    assert!(manager.is_enabled(live).unwrap());
    assert!(manager.is_running());
    assert!(rx.recv_timeout(test_timeout()).is_ok());
}

#[test]
fn test_tap_ids_are_never_reused() {
    let context = create_test_context("dev0", 1);
    let manager = open(&context, "dev0", 1024);
    let (chain, _rx) = ConsumerBuilder::new("scope").build();

    let first = manager.attach(0, &chain, 1024).unwrap();
    manager.detach(first).unwrap();
    let second = manager.attach(0, &chain, 1024).unwrap();
    assert_ne!(first, second);
    assert!(matches!(manager.start(first), Err(AcqError::UnknownTap(_))));
}

#[test]
fn test_channel_out_of_range_leaves_nothing_behind() {
    let context = create_test_context("dev0", 2);
    let manager = open(&context, "dev0", 1024);
    let (chain, _rx) = ConsumerBuilder::new("scope").build();

    let err = manager.attach(2, &chain, 1024).unwrap_err();
    assert!(matches!(
        err,
        AcqError::ChannelOutOfRange {
            channel: 2,
            channel_count: 2
        }
    ));
    assert_eq!(manager.tap_count(), 0);
    assert_eq!(manager.edge_count(), 0);
    assert_eq!(manager.topology().nodes.len(), 1);
}

#[test]
fn test_no_delivery_after_stop_returns() {
    let context = create_test_context("dev0", 1);
    let manager = open(&context, "dev0", 64);
    let (chain, rx) = ConsumerBuilder::new("scope").capacity(4096).build();
    let tap = manager.attach(0, &chain, 64).unwrap();

    manager.start(tap).unwrap();
    assert!(wait_until(test_timeout(), || rx.len() >= 3));
    manager.stop(tap).unwrap();

    drain(&rx);
    std::thread::sleep(Duration::from_millis(20));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_blocks_are_converted_for_float_consumers() {
    let context = create_test_context("dev0", 2);
    let manager = open(&context, "dev0", 32);
    let (raw_chain, raw_rx) = ConsumerBuilder::new("raw").build();
    let (float_chain, float_rx) = ConsumerBuilder::new("float").float().build();

    let raw = manager.attach(1, &raw_chain, 32).unwrap();
    let float = manager.attach(1, &float_chain, 32).unwrap();
    manager.start(raw).unwrap();
    manager.start(float).unwrap();

    let raw_block = raw_rx.recv_timeout(test_timeout()).unwrap();
    let float_block = float_rx.recv_timeout(test_timeout()).unwrap();
    assert_eq!(raw_block.channel, 1);
    assert!(matches!(raw_block.samples, Samples::Raw(_)));
    assert!(matches!(float_block.samples, Samples::Float(_)));
    assert_eq!(float_block.len(), 32);

    manager.stop_all().unwrap();
    assert!(!manager.is_running());
    assert!(manager.taps().iter().all(|t| !t.enabled));
}

#[test]
fn test_disabled_tap_receives_nothing() {
    let context = create_test_context("dev0", 1);
    let manager = open(&context, "dev0", 16);
    let (on_chain, on_rx) = ConsumerBuilder::new("on").build();
    let (off_chain, off_rx) = ConsumerBuilder::new("off").build();

    let on = manager.attach(0, &on_chain, 16).unwrap();
    manager.attach(0, &off_chain, 16).unwrap();
    manager.start(on).unwrap();

    assert!(on_rx.recv_timeout(test_timeout()).is_ok());
    manager.stop(on).unwrap();
    assert!(off_rx.try_recv().is_err());
}

#[test]
fn test_attach_while_running_pauses_and_resumes() {
    let context = create_test_context("dev0", 2);
    let manager = open(&context, "dev0", 1024);
    let source = context.source_state("dev0").unwrap();
    let (chain, rx) = ConsumerBuilder::new("scope").build();
    let (late_chain, _late_rx) = ConsumerBuilder::new("late").build();

    let tap = manager.attach(0, &chain, 1024).unwrap();
    manager.start(tap).unwrap();
    assert_eq!(source.start_count(), 1);

    let late = manager.attach(1, &late_chain, 1024).unwrap();
    assert_eq!(source.stop_count(), 1);
    assert_eq!(source.start_count(), 2);
    assert!(manager.is_running());

    manager.detach(late).unwrap();
    assert_eq!(source.start_count(), 3);
    drain(&rx);
    assert!(rx.recv_timeout(test_timeout()).is_ok());
}

#[test]
fn test_live_topology_change_when_pausing_disabled() {
    let context = create_test_context("dev0", 2);
    let config = AcquisitionConfig {
        pause_on_topology_change: false,
        ..AcquisitionConfig::default()
    };
    let manager = AcquisitionManager::open(&context, "dev0", 1024, config).unwrap();
    let source = context.source_state("dev0").unwrap();
    let (chain, _rx) = ConsumerBuilder::new("scope").build();
    let (late_chain, _late_rx) = ConsumerBuilder::new("late").build();

    let tap = manager.attach(0, &chain, 1024).unwrap();
    manager.start(tap).unwrap();
    manager.attach(1, &late_chain, 1024).unwrap();
    assert_eq!(source.start_count(), 1);
    assert_eq!(source.stop_count(), 0);
}

#[test]
fn test_detaching_last_enabled_tap_stops_source() {
    let context = create_test_context("dev0", 1);
    let manager = open(&context, "dev0", 1024);
    let (chain, _rx) = ConsumerBuilder::new("scope").build();
    let tap = manager.attach(0, &chain, 2048).unwrap();

    manager.start(tap).unwrap();
    manager.detach(tap).unwrap();
    assert!(!manager.is_running());
    assert_eq!(manager.tap_count(), 0);
    assert_eq!(manager.edge_count(), 0);
}

#[test]
fn test_set_tap_buffer_size_rearbitrates() {
    let context = create_test_context("dev0", 2);
    let manager = open(&context, "dev0", 256);
    let (chain, _rx) = ConsumerBuilder::new("scope").build();
    let (idle_chain, _idle_rx) = ConsumerBuilder::new("idle").build();

    let tap = manager.attach(0, &chain, 1024).unwrap();
    let idle = manager.attach(1, &idle_chain, 512).unwrap();
    manager.start(tap).unwrap();
    assert_eq!(manager.buffer_size(), 1024);

    manager.set_tap_buffer_size(tap, 8192).unwrap();
    assert_eq!(manager.buffer_size(), 8192);

    // A disabled tap's hint does not count.
    manager.set_tap_buffer_size(idle, 65536).unwrap();
    assert_eq!(manager.buffer_size(), 8192);
    assert_eq!(manager.tap(idle).unwrap().buffer_size, 65536);

    manager.set_tap_buffer_size(tap, 2048).unwrap();
    assert_eq!(manager.buffer_size(), 2048);
    assert!(manager.is_enabled(tap).unwrap());
}

#[test]
fn test_injected_start_failure_is_rolled_back() {
    let context = create_test_context("dev0", 1);
    let manager = open(&context, "dev0", 512);
    let (chain, rx) = ConsumerBuilder::new("scope").build();
    let tap = manager.attach(0, &chain, 4096).unwrap();

    context.faults("dev0").unwrap().fail_next_start();
    assert!(matches!(
        manager.start(tap),
        Err(AcqError::SourceStartFailed(_))
    ));
    assert!(!manager.is_enabled(tap).unwrap());
    assert!(!manager.is_running());
    assert_eq!(manager.buffer_size(), 512);

    // Not retried internally; the caller's next start succeeds.
    manager.start(tap).unwrap();
    assert!(rx.recv_timeout(test_timeout()).is_ok());
}

#[test]
fn test_injected_stop_failure_keeps_tap_enabled() {
    let context = create_test_context("dev0", 1);
    let manager = open(&context, "dev0", 512);
    let (chain, _rx) = ConsumerBuilder::new("scope").build();
    let tap = manager.attach(0, &chain, 512).unwrap();
    manager.start(tap).unwrap();

    context.faults("dev0").unwrap().fail_next_stop();
    assert!(matches!(
        manager.stop(tap),
        Err(AcqError::SourceStopFailed(_))
    ));
    assert!(manager.is_enabled(tap).unwrap());
    assert!(manager.is_running());

    manager.stop(tap).unwrap();
    assert!(!manager.is_running());
}

#[test]
fn test_shared_stage_survives_partial_detach() {
    let context = create_test_context("dev0", 2);
    let manager = open(&context, "dev0", 64);
    let shared_gate = Arc::new(Gate::new("shared"));
    shared_gate.set_enabled(true);
    let shared: StageHandle = shared_gate;

    let (chain, rx) = ConsumerBuilder::new("mixer")
        .capacity(1024)
        .stage(shared.clone())
        .build();
    let a = manager.attach(0, &chain, 64).unwrap();
    let b = manager.attach(1, &chain, 64).unwrap();
    // source→gate a, source→gate b, gate a→shared, gate b→shared, shared→sink
    assert_eq!(manager.edge_count(), 5);

    manager.start(a).unwrap();
    manager.start(b).unwrap();
    manager.detach(a).unwrap();
    assert_eq!(manager.edge_count(), 3);

    drain(&rx);
    let block = rx.recv_timeout(test_timeout()).unwrap();
    assert_eq!(block.channel, 1);

    manager.detach(b).unwrap();
    assert_eq!(manager.edge_count(), 0);
    assert_eq!(manager.topology().nodes.len(), 1);
}

#[test]
fn test_detached_tap_sink_is_unwired_from_shared_stage() {
    let context = create_test_context("dev0", 2);
    let manager = open(&context, "dev0", 64);
    let shared_gate = Arc::new(Gate::new("shared"));
    shared_gate.set_enabled(true);
    let shared: StageHandle = shared_gate;

    let (chain_a, rx_a) = ConsumerBuilder::new("a").stage(shared.clone()).build();
    let (chain_b, rx_b) = ConsumerBuilder::new("b")
        .capacity(1024)
        .stage(shared.clone())
        .build();
    let a = manager.attach(0, &chain_a, 64).unwrap();
    let b = manager.attach(1, &chain_b, 64).unwrap();
    // Each tap: source→gate, gate→shared, shared→own sink
    assert_eq!(manager.edge_count(), 6);

    manager.start(a).unwrap();
    manager.detach(a).unwrap();
    assert_eq!(manager.edge_count(), 3);
    drain(&rx_a);

    manager.start(b).unwrap();
    let block = rx_b.recv_timeout(test_timeout()).unwrap();
    assert_eq!(block.channel, 1);
    std::thread::sleep(Duration::from_millis(50));
    assert!(rx_a.try_recv().is_err());

    manager.detach(b).unwrap();
    assert_eq!(manager.edge_count(), 0);
    assert_eq!(manager.topology().nodes.len(), 1);
}

#[test]
fn test_timeout_is_reported_to_subscribers() {
    let context = MockContext::new().with_device(MockDevice::new("stuck", 1).stalled());
    let manager = open(&context, "stuck", 1024);
    manager.set_device_timeout(Duration::from_millis(5)).unwrap();
    let events = manager.subscribe();
    let (chain, rx) = ConsumerBuilder::new("scope").build();
    let tap = manager.attach(0, &chain, 1024).unwrap();

    manager.start(tap).unwrap();
    let saw_timeout = wait_until(test_timeout(), || {
        events.try_iter().any(|e| e == ManagerEvent::Timeout)
    });
    assert!(saw_timeout);
    manager.stop(tap).unwrap();
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_device_settings_reach_source() {
    let context = create_test_context("dev0", 1);
    let manager = open(&context, "dev0", 1024);
    let source = context.source_state("dev0").unwrap();
    assert_eq!(source.timeout(), AcquisitionConfig::default().timeout());
    assert_eq!(source.kernel_buffers(), 1);

    manager.set_device_timeout(Duration::from_millis(750)).unwrap();
    manager.set_kernel_buffer_count(4).unwrap();
    assert_eq!(source.timeout(), Duration::from_millis(750));
    assert_eq!(source.kernel_buffers(), 4);

    manager.set_kernel_buffer_count(0).unwrap();
    assert_eq!(source.kernel_buffers(), 1);
}

#[test]
fn test_topology_snapshot_serializes() {
    let context = create_test_context("dev0", 2);
    let manager = open(&context, "dev0", 1024);
    let (chain, _rx) = ConsumerBuilder::new("scope").float().build();
    manager.attach(1, &chain, 1024).unwrap();

    let snapshot = manager.topology();
    assert_eq!(snapshot.nodes.len(), 4);
    assert_eq!(snapshot.edges.len(), 3);

    let json = snapshot.to_json().unwrap();
    assert!(json.contains("source:dev0"));
    assert!(json.contains("ShortToFloat"));
}

#[test]
fn test_dropping_last_handle_stops_source() {
    let registry = ManagerRegistry::new();
    let context = MockContext::new().with_device(fast_device("dev0", 1));
    let manager = registry.get_or_create(&context, "dev0", 1024).unwrap();
    let source = context.source_state("dev0").unwrap();
    let (chain, _rx) = ConsumerBuilder::new("scope").build();
    let tap = manager.attach(0, &chain, 1024).unwrap();
    manager.start(tap).unwrap();
    assert!(source.is_running());

    drop(manager);
    assert!(!source.is_running());
    assert!(source.is_released());
    assert!(!registry.has_instance("dev0"));
}
