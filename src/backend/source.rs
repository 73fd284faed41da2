//! Acquisition source interface
//!
//! The physical data producer is external to the multiplexer. It is consumed
//! through [`AcquisitionSource`] (one opened device) and created through a
//! [`SourceProvider`] (the "context" that knows which devices exist).
//! Implementations must be `Send` so the owning manager can be shared
//! across threads.
//!
//! A running source delivers its blocks through the [`SourceOutput`] it was
//! opened with: one [`Block`] per channel per buffer, pushed into the
//! dataflow engine at the source's graph node.

use crate::backend::events::{EventBus, ManagerEvent};
use crate::error::Result;
use crate::pipeline::{Block, DataflowEngine, NodeId};
use std::sync::Arc;
use std::time::Duration;

/// One opened acquisition device
///
/// `stop` must block until the source's worker has fully drained and joined:
/// once it returns, no further block is pushed through the output.
pub trait AcquisitionSource: Send {
    /// Number of channels the device exposes
    fn channel_count(&self) -> usize;

    /// Samples per channel per block
    fn buffer_size(&self) -> usize;

    /// Change the buffer size; applies from the next block produced
    fn set_buffer_size(&mut self, size: usize) -> Result<()>;

    /// How long the worker waits for hardware data before reporting a timeout
    fn timeout(&self) -> Duration;

    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Number of kernel-side buffers. Sources without the notion accept any
    /// value.
    fn set_kernel_buffer_count(&mut self, _count: u32) -> Result<()> {
        Ok(())
    }

    /// Begin producing blocks
    fn start(&mut self) -> Result<()>;

    /// Stop producing blocks, blocking until drained
    fn stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;
}

/// Opens acquisition sources by device name
pub trait SourceProvider: Send + Sync {
    /// Open `device` with an initial buffer size, delivering into `output`
    ///
    /// Returns [`AcqError::DeviceNotFound`](crate::error::AcqError::DeviceNotFound)
    /// when the device does not exist.
    fn open(
        &self,
        device: &str,
        buffer_size: usize,
        output: SourceOutput,
    ) -> Result<Box<dyn AcquisitionSource>>;
}

/// Where a source delivers its data and reports its conditions
#[derive(Clone)]
pub struct SourceOutput {
    engine: Arc<dyn DataflowEngine>,
    node: NodeId,
    events: Arc<EventBus>,
}

impl SourceOutput {
    pub fn new(engine: Arc<dyn DataflowEngine>, node: NodeId, events: Arc<EventBus>) -> Self {
        Self {
            engine,
            node,
            events,
        }
    }

    /// The source's node in the connection graph
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Push one block out of channel `channel`
    pub fn push(&self, channel: usize, block: Block) {
        self.engine.emit(self.node, channel, block);
    }

    /// Report that the hardware produced no data within the timeout
    pub fn report_timeout(&self) {
        tracing::debug!("Source {:?} timed out waiting for data", self.node);
        self.events.publish(ManagerEvent::Timeout);
    }
}
