//! Gate: the per-tap valve.
//!
//! Every tap owns exactly one gate sitting between the source channel and the
//! tap's downstream chain. A closed gate drops blocks, so a tap can be
//! attached long before it starts receiving data.

use crate::pipeline::node::Stage;
use crate::pipeline::packet::Block;
use crate::pipeline::port::{PortDescriptor, PortKind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("in", PortKind::Any),
    PortDescriptor::output("out", PortKind::Any),
];

/// Enable/disable switch controlling whether data reaches one consumer.
pub struct Gate {
    name: String,
    enabled: AtomicBool,
    passed: AtomicU64,
}

impl Gate {
    /// Create a gate. Gates start closed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: AtomicBool::new(false),
            passed: AtomicU64::new(0),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Number of blocks that made it through.
    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }
}

impl Stage for Gate {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn process(&self, _input_port: usize, block: Block) -> Option<Block> {
        if !self.enabled() {
            return None;
        }
        self.passed.fetch_add(1, Ordering::Relaxed);
        Some(block)
    }
}
