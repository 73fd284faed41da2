//! Integration tests for connection graph teardown
//!
//! Whatever order taps are attached, started, stopped and detached in, and
//! however many threads do it at once, detaching every tap must leave the
//! connection graph with no edges and only the source node.

#![cfg(feature = "mock-source")]

mod common;

use acqmux::backend::AcquisitionManager;
use acqmux::config::AcquisitionConfig;
use acqmux::pipeline::{Gate, StageHandle, TapId};
use common::builders::ConsumerBuilder;
use common::mock_helpers::create_test_context;
use proptest::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;

const CHANNELS: usize = 4;

#[derive(Debug, Clone)]
enum Op {
    Attach { channel: usize, float: bool, hint: usize },
    Start(usize),
    Stop(usize),
    Detach(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..CHANNELS, any::<bool>(), 1usize..8192).prop_map(|(channel, float, hint)| Op::Attach {
            channel,
            float,
            hint
        }),
        any::<usize>().prop_map(Op::Start),
        any::<usize>().prop_map(Op::Stop),
        any::<usize>().prop_map(Op::Detach),
    ]
}

fn pick(live: &[TapId], index: usize) -> Option<TapId> {
    (!live.is_empty()).then(|| live[index % live.len()])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_detaching_everything_leaves_no_edges(ops in proptest::collection::vec(op(), 1..24)) {
        let context = create_test_context("dev0", CHANNELS);
        let manager =
            AcquisitionManager::open(&context, "dev0", 256, AcquisitionConfig::default()).unwrap();
        let mut live: Vec<TapId> = Vec::new();
        let mut receivers = Vec::new();

        for op in ops {
            match op {
                Op::Attach { channel, float, hint } => {
                    let builder = ConsumerBuilder::new("sink");
                    let (chain, rx) = if float { builder.float().build() } else { builder.build() };
                    live.push(manager.attach(channel, &chain, hint).unwrap());
                    receivers.push(rx);
                }
                Op::Start(i) => {
                    if let Some(tap) = pick(&live, i) {
                        manager.start(tap).unwrap();
                    }
                }
                Op::Stop(i) => {
                    if let Some(tap) = pick(&live, i) {
                        manager.stop(tap).unwrap();
                    }
                }
                Op::Detach(i) => {
                    if let Some(tap) = pick(&live, i) {
                        manager.detach(tap).unwrap();
                        live.retain(|&t| t != tap);
                    }
                }
            }

            // Running iff some tap is enabled, and sized for every enabled tap.
            let taps = manager.taps();
            prop_assert_eq!(manager.is_running(), taps.iter().any(|t| t.enabled));
            for tap in taps.iter().filter(|t| t.enabled) {
                prop_assert!(manager.buffer_size() >= tap.buffer_size);
            }
        }

        for tap in live {
            manager.detach(tap).unwrap();
        }
        prop_assert_eq!(manager.edge_count(), 0);
        prop_assert_eq!(manager.topology().nodes.len(), 1);
        prop_assert!(!manager.is_running());
    }
}

#[test]
fn test_concurrent_attach_detach_leaves_no_edges() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 25;

    let context = create_test_context("dev0", CHANNELS);
    let manager = Arc::new(
        AcquisitionManager::open(&context, "dev0", 256, AcquisitionConfig::default()).unwrap(),
    );
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|worker| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for round in 0..ROUNDS {
                    let builder = ConsumerBuilder::new("sink");
                    let (chain, _rx) = if round % 2 == 0 {
                        builder.float().build()
                    } else {
                        builder.build()
                    };
                    let channel = (worker + round) % CHANNELS;
                    let tap = manager.attach(channel, &chain, 128 * (round + 1)).unwrap();
                    if round % 3 != 0 {
                        manager.start(tap).unwrap();
                    }
                    manager.detach(tap).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(manager.edge_count(), 0);
    assert_eq!(manager.tap_count(), 0);
    assert_eq!(manager.topology().nodes.len(), 1);
    assert!(!manager.is_running());
}

#[test]
fn test_concurrent_taps_sharing_one_stage() {
    const THREADS: usize = 4;

    let context = create_test_context("dev0", CHANNELS);
    let manager = Arc::new(
        AcquisitionManager::open(&context, "dev0", 256, AcquisitionConfig::default()).unwrap(),
    );
    let shared_gate = Arc::new(Gate::new("shared"));
    shared_gate.set_enabled(true);
    let shared: StageHandle = shared_gate;
    let (chain, _rx) = ConsumerBuilder::new("mixer").stage(shared).build();
    let chain = Arc::new(chain);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|worker| {
            let manager = manager.clone();
            let chain = chain.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let tap = manager.attach(worker % CHANNELS, &*chain, 256).unwrap();
                manager.start(tap).unwrap();
                barrier.wait();
                manager.detach(tap).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(manager.edge_count(), 0);
    assert_eq!(manager.topology().nodes.len(), 1);
}
