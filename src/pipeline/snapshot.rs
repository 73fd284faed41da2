//! Read-only topology snapshots for the tool layer.
//!
//! Taken under the manager lock and handed out by value, so the caller can
//! render or log them without holding anything.

use crate::error::{AcqError, Result};
use crate::pipeline::id::NodeId;
use crate::pipeline::port::PortDescriptor;
use serde::Serialize;

/// Snapshot of a single stage.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub ports: Vec<PortDescriptor>,
    /// Permanent nodes (the source) survive every teardown.
    pub protected: bool,
}

/// Snapshot of a single wired edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeSnapshot {
    pub src: NodeId,
    pub src_port: usize,
    pub dst: NodeId,
    pub dst_port: usize,
}

/// Complete topology snapshot of a connection graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopologySnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
}

impl TopologySnapshot {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| AcqError::Serialization(e.to_string()))
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
