//! Test data builders for creating consumer chains

use acqmux::pipeline::{Block, ChainSpec, ChannelSink, PortKind, StageHandle};
use crossbeam_channel::Receiver;
use std::sync::Arc;

/// Builder for a consumer: a channel sink plus the chain feeding it
pub struct ConsumerBuilder {
    name: String,
    capacity: usize,
    port: usize,
    inputs: usize,
    to_float: bool,
    stages: Vec<StageHandle>,
}

impl ConsumerBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capacity: 64,
            port: 0,
            inputs: 1,
            to_float: false,
            stages: Vec::new(),
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Feed input `port` of a sink with `inputs` ports
    pub fn port(mut self, port: usize, inputs: usize) -> Self {
        self.port = port;
        self.inputs = inputs;
        self
    }

    pub fn float(mut self) -> Self {
        self.to_float = true;
        self
    }

    pub fn stage(mut self, stage: StageHandle) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> (ChainSpec, Receiver<Block>) {
        let (sink, rx) = ChannelSink::with_inputs(self.name, self.inputs, PortKind::Any, self.capacity);
        let mut chain = ChainSpec::direct(Arc::new(sink), self.port);
        if self.to_float {
            chain = chain.to_float();
        }
        for stage in self.stages {
            chain = chain.with_stage(stage);
        }
        (chain, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acqmux::pipeline::DownstreamChain;

    #[test]
    fn test_consumer_builder() {
        let (chain, _rx) = ConsumerBuilder::new("scope").port(1, 2).float().build();
        assert!(chain.is_float());
        assert_eq!(chain.sink().1, 1);
        assert_eq!(chain.stages(0).len(), 1);
    }
}
