//! SourceNode: stands in for the acquisition source inside the graph.
//!
//! The source pushes blocks into the engine from its own worker; this node
//! only exists so edges can name the source's output ports.

use crate::pipeline::node::Stage;
use crate::pipeline::packet::Block;
use crate::pipeline::port::{PortDescriptor, PortKind};

static OUTPUT_NAMES: [&str; 16] = [
    "ch0", "ch1", "ch2", "ch3", "ch4", "ch5", "ch6", "ch7", "ch8", "ch9", "ch10", "ch11", "ch12",
    "ch13", "ch14", "ch15",
];

/// Maximum number of channels a single source node can expose.
pub const MAX_SOURCE_CHANNELS: usize = OUTPUT_NAMES.len();

/// Graph node representing the source's channel outputs.
pub struct SourceNode {
    name: String,
    ports: Vec<PortDescriptor>,
}

impl SourceNode {
    pub fn new(device: &str, channels: usize) -> Self {
        let ports = OUTPUT_NAMES[..channels.min(MAX_SOURCE_CHANNELS)]
            .iter()
            .map(|&n| PortDescriptor::output(n, PortKind::Raw))
            .collect();
        Self {
            name: format!("source:{device}"),
            ports,
        }
    }
}

impl Stage for SourceNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    fn process(&self, _input_port: usize, block: Block) -> Option<Block> {
        Some(block)
    }
}
