//! ShortToFloat: raw-to-float conversion stage.
//!
//! Each tap that asks for float samples gets its own instance; the stage is
//! stateless so nothing is lost by not sharing it across taps.

use crate::pipeline::node::Stage;
use crate::pipeline::packet::{Block, Samples};
use crate::pipeline::port::{PortDescriptor, PortKind};

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("in", PortKind::Raw),
    PortDescriptor::output("out", PortKind::Float),
];

/// Converts raw 16-bit samples to `f32`, optionally scaled.
pub struct ShortToFloat {
    scale: f32,
}

impl ShortToFloat {
    pub fn new() -> Self {
        Self { scale: 1.0 }
    }

    /// Multiply every converted sample by `scale`.
    pub fn with_scale(scale: f32) -> Self {
        Self { scale }
    }
}

impl Default for ShortToFloat {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for ShortToFloat {
    fn name(&self) -> &str {
        "ShortToFloat"
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn process(&self, _input_port: usize, block: Block) -> Option<Block> {
        let samples = match &block.samples {
            Samples::Raw(raw) => raw.iter().map(|&v| v as f32 * self.scale).collect(),
            // Already converted upstream; pass through unchanged.
            Samples::Float(_) => return Some(block),
        };
        Some(Block::float(block.channel, block.seq, samples))
    }
}
