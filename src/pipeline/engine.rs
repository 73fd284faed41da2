//! Dataflow engine: the layer that actually moves blocks between stages.
//!
//! The connection graph decides *what* is wired; the engine performs the
//! wiring and delivers data. `LocalEngine` is the in-process implementation:
//! blocks are pushed synchronously through every connected stage on the
//! thread that calls [`DataflowEngine::emit`] (the source's worker), so once
//! that worker has been joined no delivery can still be in flight.

use crate::pipeline::error::{GraphError, GraphResult};
use crate::pipeline::graph::Connection;
use crate::pipeline::id::NodeId;
use crate::pipeline::node::StageHandle;
use crate::pipeline::packet::Block;
use crate::pipeline::port::{nth_port, PortDirection, PortKind};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Engine-level wiring and delivery.
///
/// All methods take `&self`: the engine is shared between the manager (which
/// mutates topology) and the source worker (which emits), and synchronizes
/// internally.
pub trait DataflowEngine: Send + Sync {
    /// Make `stage` addressable as `node`.
    fn add_stage(&self, node: NodeId, stage: StageHandle) -> GraphResult<()>;

    /// Forget `node`. Edges must already have been disconnected.
    fn remove_stage(&self, node: NodeId) -> GraphResult<()>;

    /// Wire one edge.
    fn connect(&self, edge: &Connection) -> GraphResult<()>;

    /// Unwire one edge.
    fn disconnect(&self, edge: &Connection) -> GraphResult<()>;

    /// Push `block` out of `from`'s output `port`.
    fn emit(&self, from: NodeId, port: usize, block: Block);
}

#[derive(Default)]
struct Routes {
    stages: HashMap<NodeId, StageHandle>,
    /// (src node, src port) → [(dst node, dst port)]
    out: HashMap<(NodeId, usize), Vec<(NodeId, usize)>>,
}

impl Routes {
    fn stage(&self, node: NodeId) -> GraphResult<&StageHandle> {
        self.stages.get(&node).ok_or(GraphError::UnknownNode(node))
    }

    fn port_kind(&self, node: NodeId, direction: PortDirection, port: usize) -> GraphResult<PortKind> {
        let stage = self.stage(node)?;
        nth_port(stage.ports(), direction, port)
            .map(|p| p.kind)
            .ok_or(GraphError::PortOutOfRange {
                node,
                direction,
                port,
            })
    }

    fn deliver(&self, from: NodeId, port: usize, block: Block) {
        let Some(targets) = self.out.get(&(from, port)) else {
            return;
        };
        for &(dst, dst_port) in targets {
            let Some(stage) = self.stages.get(&dst) else {
                continue;
            };
            if let Some(out) = stage.process(dst_port, block.clone()) {
                self.deliver(dst, 0, out);
            }
        }
    }
}

/// In-process dataflow engine.
#[derive(Default)]
pub struct LocalEngine {
    routes: RwLock<Routes>,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stages currently registered.
    pub fn stage_count(&self) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stages
            .len()
    }

    /// Number of edges currently wired.
    pub fn edge_count(&self) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .out
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl DataflowEngine for LocalEngine {
    fn add_stage(&self, node: NodeId, stage: StageHandle) -> GraphResult<()> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if routes.stages.contains_key(&node) {
            return Err(GraphError::Engine(format!("{node:?} already registered")));
        }
        routes.stages.insert(node, stage);
        Ok(())
    }

    fn remove_stage(&self, node: NodeId) -> GraphResult<()> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        routes
            .stages
            .remove(&node)
            .map(|_| ())
            .ok_or(GraphError::UnknownNode(node))
    }

    fn connect(&self, edge: &Connection) -> GraphResult<()> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);

        let src_kind = routes.port_kind(edge.src, PortDirection::Output, edge.src_port)?;
        let dst_kind = routes.port_kind(edge.dst, PortDirection::Input, edge.dst_port)?;
        if !src_kind.feeds(dst_kind) {
            return Err(GraphError::PortMismatch(format!(
                "{:?}:{} produces {:?} but {:?}:{} expects {:?}",
                edge.src, edge.src_port, src_kind, edge.dst, edge.dst_port, dst_kind
            )));
        }

        let targets = routes.out.entry((edge.src, edge.src_port)).or_default();
        if targets.contains(&(edge.dst, edge.dst_port)) {
            return Err(GraphError::DuplicateEdge {
                src: edge.src,
                src_port: edge.src_port,
                dst: edge.dst,
                dst_port: edge.dst_port,
            });
        }
        targets.push((edge.dst, edge.dst_port));
        Ok(())
    }

    fn disconnect(&self, edge: &Connection) -> GraphResult<()> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let key = (edge.src, edge.src_port);
        let missing = GraphError::MissingEdge {
            src: edge.src,
            src_port: edge.src_port,
            dst: edge.dst,
            dst_port: edge.dst_port,
        };
        let targets = routes.out.get_mut(&key).ok_or_else(|| missing.clone())?;
        let pos = targets
            .iter()
            .position(|&t| t == (edge.dst, edge.dst_port))
            .ok_or(missing)?;
        targets.remove(pos);
        if targets.is_empty() {
            routes.out.remove(&key);
        }
        Ok(())
    }

    fn emit(&self, from: NodeId, port: usize, block: Block) {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes.deliver(from, port, block);
    }
}
