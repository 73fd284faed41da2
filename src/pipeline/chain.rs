//! Downstream chains: what a consumer wants wired behind its tap.
//!
//! The manager asks the chain for its stages once, at attach time, and wires
//! `gate → stages… → sink:port`. Stages are treated as opaque nodes.

use crate::pipeline::node::StageHandle;
use crate::pipeline::nodes::ShortToFloat;
use std::sync::Arc;

/// Supplies the stages wired between a tap's gate and the consumer's sink.
pub trait DownstreamChain: Send + Sync {
    /// Processing stages for `channel`, in order from the gate to the sink.
    fn stages(&self, channel: usize) -> Vec<StageHandle>;

    /// The consumer's sink and the input port to feed.
    fn sink(&self) -> (StageHandle, usize);
}

/// Builder-style chain description.
///
/// ```ignore
/// let (sink, rx) = ChannelSink::new("scope", 64);
/// let chain = ChainSpec::direct(Arc::new(sink), 0).to_float();
/// ```
#[derive(Clone)]
pub struct ChainSpec {
    sink: StageHandle,
    sink_port: usize,
    to_float: bool,
    extra: Vec<StageHandle>,
}

impl ChainSpec {
    /// Wire the gate straight into `sink`'s input `port`.
    pub fn direct(sink: StageHandle, port: usize) -> Self {
        Self {
            sink,
            sink_port: port,
            to_float: false,
            extra: Vec::new(),
        }
    }

    /// Insert a fresh short-to-float conversion right after the gate.
    pub fn to_float(mut self) -> Self {
        self.to_float = true;
        self
    }

    /// Append a caller-owned stage before the sink.
    ///
    /// Passing the same handle to several chains shares the stage; it is
    /// then only torn down once the last tap feeding it is detached.
    pub fn with_stage(mut self, stage: StageHandle) -> Self {
        self.extra.push(stage);
        self
    }

    pub fn is_float(&self) -> bool {
        self.to_float
    }
}

impl DownstreamChain for ChainSpec {
    fn stages(&self, _channel: usize) -> Vec<StageHandle> {
        let mut stages: Vec<StageHandle> = Vec::with_capacity(self.extra.len() + 1);
        if self.to_float {
            stages.push(Arc::new(ShortToFloat::new()));
        }
        stages.extend(self.extra.iter().cloned());
        stages
    }

    fn sink(&self) -> (StageHandle, usize) {
        (self.sink.clone(), self.sink_port)
    }
}
