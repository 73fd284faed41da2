//! Sample blocks moved through the dataflow engine.
//!
//! A source produces one `Block` per channel per buffer. Blocks are cheap to
//! clone when fanned out to several taps: the sample storage is shared.

use std::sync::Arc;

/// Sample storage for a block.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    /// Raw 16-bit samples as delivered by the device.
    Raw(Arc<[i16]>),
    /// Samples after a short-to-float conversion stage.
    Float(Arc<[f32]>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::Raw(s) => s.len(),
            Samples::Float(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Float view of the samples, converting raw ones.
    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            Samples::Raw(s) => s.iter().map(|&v| v as f32).collect(),
            Samples::Float(s) => s.to_vec(),
        }
    }
}

/// One buffer worth of samples for a single source channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Source channel the samples were captured on.
    pub channel: usize,
    /// Per-source sequence number, incremented once per buffer.
    pub seq: u64,
    pub samples: Samples,
}

impl Block {
    pub fn raw(channel: usize, seq: u64, samples: Vec<i16>) -> Self {
        Self {
            channel,
            seq,
            samples: Samples::Raw(samples.into()),
        }
    }

    pub fn float(channel: usize, seq: u64, samples: Vec<f32>) -> Self {
        Self {
            channel,
            seq,
            samples: Samples::Float(samples.into()),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
