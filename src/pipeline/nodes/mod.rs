//! Built-in pipeline stage implementations.

pub mod channel_sink;
pub mod convert;
pub mod gate;
pub mod source_node;

pub use channel_sink::{ChannelSink, MAX_SINK_INPUTS};
pub use convert::ShortToFloat;
pub use gate::Gate;
pub use source_node::{SourceNode, MAX_SOURCE_CHANNELS};
