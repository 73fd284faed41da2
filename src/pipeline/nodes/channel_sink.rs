//! ChannelSink: hands blocks to a consumer thread via crossbeam channel.
//!
//! Uses `try_send` so a slow consumer never stalls the source worker; blocks
//! that do not fit are dropped and counted.

use crate::pipeline::node::Stage;
use crate::pipeline::packet::Block;
use crate::pipeline::port::{PortDescriptor, PortKind};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};

static INPUT_NAMES: [&str; 8] = ["in0", "in1", "in2", "in3", "in4", "in5", "in6", "in7"];

/// Maximum number of input ports a channel sink can expose.
pub const MAX_SINK_INPUTS: usize = INPUT_NAMES.len();

/// Terminal stage forwarding every block to a bounded channel.
pub struct ChannelSink {
    name: String,
    ports: Vec<PortDescriptor>,
    tx: Sender<Block>,
    dropped: AtomicU64,
    delivered: AtomicU64,
}

impl ChannelSink {
    /// Create a single-input sink accepting any sample format.
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, Receiver<Block>) {
        Self::with_inputs(name, 1, PortKind::Any, capacity)
    }

    /// Create a sink with `inputs` ports of the given kind.
    ///
    /// `inputs` is clamped to `1..=MAX_SINK_INPUTS`.
    pub fn with_inputs(
        name: impl Into<String>,
        inputs: usize,
        kind: PortKind,
        capacity: usize,
    ) -> (Self, Receiver<Block>) {
        let (tx, rx) = bounded(capacity.max(1));
        let ports = INPUT_NAMES[..inputs.clamp(1, MAX_SINK_INPUTS)]
            .iter()
            .map(|&n| PortDescriptor::input(n, kind))
            .collect();
        let sink = Self {
            name: name.into(),
            ports,
            tx,
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        };
        (sink, rx)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Stage for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    fn process(&self, _input_port: usize, block: Block) -> Option<Block> {
        if self.tx.try_send(block).is_ok() {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                tracing::warn!("{} dropped {} blocks due to backpressure", self.name, dropped);
            }
        }
        None
    }
}
