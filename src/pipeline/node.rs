//! Stage abstraction for the dataflow engine.
//!
//! A stage is one processing node: the source's output ports, a tap's gate,
//! a format conversion, or a consumer's sink. Stages are shared as
//! `Arc<dyn Stage>` handles; the engine only ever calls `process` from the
//! source's worker thread, so implementations use interior mutability where
//! they keep state.

use crate::pipeline::packet::Block;
use crate::pipeline::port::PortDescriptor;
use std::sync::Arc;

/// A processing node wired by the connection graph.
pub trait Stage: Send + Sync {
    /// Human-readable name used in logs and topology snapshots.
    fn name(&self) -> &str;

    /// Port descriptors for this stage.
    fn ports(&self) -> &[PortDescriptor];

    /// Handle one block arriving on `input_port`.
    ///
    /// Returning `Some` forwards the (possibly transformed) block to every
    /// edge leaving output port 0. Sinks consume the block and return `None`.
    fn process(&self, input_port: usize, block: Block) -> Option<Block>;
}

/// Shared handle to a stage.
pub type StageHandle = Arc<dyn Stage>;

/// Address-based identity of a stage handle.
///
/// Two handles are the same node iff they point at the same allocation.
pub fn stage_key(stage: &StageHandle) -> usize {
    Arc::as_ptr(stage) as *const () as usize
}
