//! Pipeline-specific error types.

use crate::pipeline::id::NodeId;
use crate::pipeline::port::PortDirection;
use thiserror::Error;

/// Errors raised while wiring or unwiring stages in the dataflow engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("Edge {src:?}:{src_port} -> {dst:?}:{dst_port} already exists")]
    DuplicateEdge {
        src: NodeId,
        src_port: usize,
        dst: NodeId,
        dst_port: usize,
    },

    #[error("Edge {src:?}:{src_port} -> {dst:?}:{dst_port} does not exist")]
    MissingEdge {
        src: NodeId,
        src_port: usize,
        dst: NodeId,
        dst_port: usize,
    },

    #[error("Node {node:?} has no {direction:?} port {port}")]
    PortOutOfRange {
        node: NodeId,
        direction: PortDirection,
        port: usize,
    },

    #[error("Edge {src:?} -> {dst:?} would create a cycle")]
    CycleDetected { src: NodeId, dst: NodeId },

    #[error("Port mismatch: {0}")]
    PortMismatch(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;
