//! Connection graph: the record of every edge the manager has wired.
//!
//! Every edge created while wiring a tap goes through [`ConnectionGraph::add_edge`],
//! which performs the engine-level wiring and records it. Teardown works on
//! this owned record rather than querying the engine.
//! [`ConnectionGraph::remove_node_cascade`] removes every edge touching a node
//! and follows the removed edges in one direction into stages that are left
//! without any other referrer.
//!
//! Taps that share a stage may both depend on one edge. [`retain_edge`] and
//! [`release_edge`] count owners per edge, so such an edge is only unwired
//! when its last owner lets go.
//!
//! Protected nodes (the source) are never released and never traversed into.
//!
//! [`retain_edge`]: ConnectionGraph::retain_edge
//! [`release_edge`]: ConnectionGraph::release_edge

use crate::pipeline::engine::DataflowEngine;
use crate::pipeline::error::{GraphError, GraphResult};
use crate::pipeline::id::NodeId;
use crate::pipeline::node::{stage_key, StageHandle};
use crate::pipeline::snapshot::{EdgeSnapshot, NodeSnapshot, TopologySnapshot};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One wired edge: `src:src_port → dst:dst_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub src: NodeId,
    pub src_port: usize,
    pub dst: NodeId,
    pub dst_port: usize,
}

impl Connection {
    pub fn new(src: NodeId, src_port: usize, dst: NodeId, dst_port: usize) -> Self {
        Self {
            src,
            src_port,
            dst,
            dst_port,
        }
    }

    #[inline]
    pub fn touches(&self, node: NodeId) -> bool {
        self.src == node || self.dst == node
    }
}

/// Which way a cascade follows removed edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow edges where the node is the source (downstream).
    Forward,
    /// Follow edges where the node is the destination (upstream).
    Reverse,
}

struct NodeEntry {
    stage: StageHandle,
    protected: bool,
}

/// Owned adjacency record of the edges wired through one engine.
pub struct ConnectionGraph {
    engine: Arc<dyn DataflowEngine>,
    nodes: HashMap<NodeId, NodeEntry>,
    /// Stage handle address → node, so one stage shared by several taps is
    /// registered once.
    keys: HashMap<usize, NodeId>,
    edges: Vec<Connection>,
    /// Owner count per recorded edge
    owners: HashMap<Connection, usize>,
    next_node: u32,
}

impl ConnectionGraph {
    pub fn new(engine: Arc<dyn DataflowEngine>) -> Self {
        Self {
            engine,
            nodes: HashMap::new(),
            keys: HashMap::new(),
            edges: Vec::new(),
            owners: HashMap::new(),
            next_node: 0,
        }
    }

    /// Allocate a node id without registering a stage yet.
    ///
    /// Used for the source, whose output must know its node id before the
    /// source (and hence its channel count) exists.
    pub fn reserve_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    /// Register `stage` under a previously reserved id.
    pub fn register_reserved(&mut self, node: NodeId, stage: StageHandle) -> GraphResult<()> {
        self.engine.add_stage(node, stage.clone())?;
        self.keys.insert(stage_key(&stage), node);
        self.nodes.insert(
            node,
            NodeEntry {
                stage,
                protected: false,
            },
        );
        Ok(())
    }

    /// Node id for `stage`, registering it with the engine on first sight.
    pub fn register(&mut self, stage: &StageHandle) -> GraphResult<NodeId> {
        if let Some(&node) = self.keys.get(&stage_key(stage)) {
            return Ok(node);
        }
        let node = self.reserve_node();
        self.register_reserved(node, stage.clone())?;
        Ok(node)
    }

    /// Mark `node` as permanent: cascades stop at it and never release it.
    pub fn protect(&mut self, node: NodeId) {
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.protected = true;
        }
    }

    pub fn is_protected(&self, node: NodeId) -> bool {
        self.nodes.get(&node).is_some_and(|e| e.protected)
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[Connection] {
        &self.edges
    }

    /// Node registered for `stage`, if any.
    pub fn node_of(&self, stage: &StageHandle) -> Option<NodeId> {
        self.keys.get(&stage_key(stage)).copied()
    }

    pub fn contains_edge(&self, src: NodeId, src_port: usize, dst: NodeId, dst_port: usize) -> bool {
        self.edges
            .contains(&Connection::new(src, src_port, dst, dst_port))
    }

    /// Every recorded edge touching `node`.
    pub fn edges_of(&self, node: NodeId) -> impl Iterator<Item = &Connection> {
        self.edges.iter().filter(move |e| e.touches(node))
    }

    /// Wire and record `src:src_port → dst:dst_port`.
    pub fn add_edge(
        &mut self,
        src: NodeId,
        src_port: usize,
        dst: NodeId,
        dst_port: usize,
    ) -> GraphResult<()> {
        for node in [src, dst] {
            if !self.nodes.contains_key(&node) {
                return Err(GraphError::UnknownNode(node));
            }
        }
        if src == dst || self.reaches(dst, src) {
            return Err(GraphError::CycleDetected { src, dst });
        }

        let edge = Connection::new(src, src_port, dst, dst_port);
        self.engine.connect(&edge)?;
        self.edges.push(edge);
        self.owners.insert(edge, 1);
        Ok(())
    }

    /// Take one more owner of `src:src_port → dst:dst_port`, wiring it if it
    /// does not exist yet.
    pub fn retain_edge(
        &mut self,
        src: NodeId,
        src_port: usize,
        dst: NodeId,
        dst_port: usize,
    ) -> GraphResult<Connection> {
        let edge = Connection::new(src, src_port, dst, dst_port);
        if let Some(count) = self.owners.get_mut(&edge) {
            *count += 1;
            return Ok(edge);
        }
        self.add_edge(src, src_port, dst, dst_port)?;
        Ok(edge)
    }

    /// Drop one owner of `edge`; the last owner unwires it. Returns whether
    /// the edge was unwired.
    pub fn release_edge(&mut self, edge: &Connection) -> GraphResult<bool> {
        match self.owners.get_mut(edge) {
            None => Err(GraphError::MissingEdge {
                src: edge.src,
                src_port: edge.src_port,
                dst: edge.dst,
                dst_port: edge.dst_port,
            }),
            Some(count) if *count > 1 => {
                *count -= 1;
                Ok(false)
            }
            Some(_) => {
                self.unwire(edge)?;
                Ok(true)
            }
        }
    }

    /// Number of owners holding `edge`; 0 if it is not recorded.
    pub fn owners_of(&self, edge: &Connection) -> usize {
        self.owners.get(edge).copied().unwrap_or(0)
    }

    /// Unwire and un-record exactly one edge.
    pub fn remove_edge(
        &mut self,
        src: NodeId,
        src_port: usize,
        dst: NodeId,
        dst_port: usize,
    ) -> GraphResult<()> {
        let edge = Connection::new(src, src_port, dst, dst_port);
        if !self.edges.contains(&edge) {
            return Err(GraphError::MissingEdge {
                src,
                src_port,
                dst,
                dst_port,
            });
        }
        self.unwire(&edge)
    }

    /// Remove every edge touching `node`, then keep going through the nodes
    /// on the far side of edges pointing in `direction` as long as those
    /// nodes are left without another referrer. Isolated, unprotected nodes
    /// visited on the way are released from the engine.
    ///
    /// Returns the number of edges removed. Calling it again on a node that
    /// is already isolated removes nothing.
    pub fn remove_node_cascade(&mut self, node: NodeId, direction: Direction) -> GraphResult<usize> {
        let mut removed = 0;
        let mut visited = HashSet::new();
        let mut stack = vec![node];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }

            let touching: Vec<Connection> = self.edges_of(current).copied().collect();
            for edge in touching {
                self.unwire(&edge)?;
                removed += 1;
                tracing::debug!(
                    "Removing {} connection between {} port {} and {} port {}",
                    if direction == Direction::Forward { "forward" } else { "backwards" },
                    self.name_of(edge.src),
                    edge.src_port,
                    self.name_of(edge.dst),
                    edge.dst_port
                );

                let next = match direction {
                    Direction::Forward if edge.src == current => Some(edge.dst),
                    Direction::Reverse if edge.dst == current => Some(edge.src),
                    _ => None,
                };
                if let Some(next) = next {
                    if !self.is_protected(next) && !self.has_referrer(next, direction) {
                        stack.push(next);
                    }
                }
            }

            self.release_if_isolated(current)?;
        }

        Ok(removed)
    }

    /// Drop `node` from the engine if it is unprotected and has no edges.
    /// Returns whether it was released.
    pub fn release_if_isolated(&mut self, node: NodeId) -> GraphResult<bool> {
        let releasable = self
            .nodes
            .get(&node)
            .is_some_and(|e| !e.protected)
            && self.edges_of(node).next().is_none();
        if !releasable {
            return Ok(false);
        }
        self.engine.remove_stage(node)?;
        if let Some(entry) = self.nodes.remove(&node) {
            self.keys.remove(&stage_key(&entry.stage));
        }
        Ok(true)
    }

    /// Serializable view of the current topology.
    pub fn snapshot(&self) -> TopologySnapshot {
        let mut nodes: Vec<NodeSnapshot> = self
            .nodes
            .iter()
            .map(|(&id, entry)| NodeSnapshot {
                id,
                name: entry.stage.name().to_string(),
                ports: entry.stage.ports().to_vec(),
                protected: entry.protected,
            })
            .collect();
        nodes.sort_by_key(|n| n.id);

        let edges = self
            .edges
            .iter()
            .map(|e| EdgeSnapshot {
                src: e.src,
                src_port: e.src_port,
                dst: e.dst,
                dst_port: e.dst_port,
            })
            .collect();

        TopologySnapshot { nodes, edges }
    }

    fn unwire(&mut self, edge: &Connection) -> GraphResult<()> {
        self.engine.disconnect(edge)?;
        if let Some(pos) = self.edges.iter().position(|e| e == edge) {
            self.edges.remove(pos);
        }
        self.owners.remove(edge);
        Ok(())
    }

    /// Whether something else still feeds (forward) or consumes (reverse) `node`.
    fn has_referrer(&self, node: NodeId, direction: Direction) -> bool {
        match direction {
            Direction::Forward => self.edges.iter().any(|e| e.dst == node),
            Direction::Reverse => self.edges.iter().any(|e| e.src == node),
        }
    }

    /// Whether `to` is reachable from `from` along recorded edges.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.edges.iter().filter(|e| e.src == current).map(|e| e.dst));
        }
        false
    }

    fn name_of(&self, node: NodeId) -> String {
        self.nodes
            .get(&node)
            .map(|e| e.stage.name().to_string())
            .unwrap_or_else(|| format!("{node:?}"))
    }
}
