//! Dataflow side of the multiplexer.
//!
//! Blocks flow from the acquisition source through per-tap stages into
//! consumer sinks:
//!
//! ```text
//! [Source:ch0] ──► [Gate tap#0] ──► [ShortToFloat] ──► [scope sink]
//!              └─► [Gate tap#1] ──────────────────────► [spectrum sink]
//! [Source:ch1] ──► [Gate tap#2] ──► ...
//! ```
//!
//! # Design
//!
//! - **Stages are opaque**: anything implementing [`Stage`] can be wired.
//! - **Engine does the wiring**: [`DataflowEngine`] connects, disconnects
//!   and delivers; [`LocalEngine`] is the in-process implementation.
//! - **Graph keeps the record**: [`ConnectionGraph`] tracks every edge it
//!   asked the engine for, so teardown never depends on engine queries.

pub mod chain;
pub mod engine;
pub mod error;
pub mod graph;
pub mod id;
pub mod node;
pub mod nodes;
pub mod packet;
pub mod port;
pub mod snapshot;

pub use chain::{ChainSpec, DownstreamChain};
pub use engine::{DataflowEngine, LocalEngine};
pub use error::{GraphError, GraphResult};
pub use graph::{Connection, ConnectionGraph, Direction};
pub use id::{NodeId, TapId};
pub use node::{stage_key, Stage, StageHandle};
pub use nodes::{ChannelSink, Gate, ShortToFloat, SourceNode};
pub use packet::{Block, Samples};
pub use port::{PortDescriptor, PortDirection, PortKind};
pub use snapshot::{EdgeSnapshot, NodeSnapshot, TopologySnapshot};
