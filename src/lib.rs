//! # acqmux: Shared Acquisition Multiplexer
//!
//! Owns exactly one live connection per hardware data source and lets any
//! number of independent consumers attach to its channels at any time.
//!
//! ## Architecture
//!
//! - **Backend**: [`AcquisitionManager`] per device, holding the source, the
//!   consumers' taps and the connection graph; [`ManagerRegistry`] maps device
//!   names to weakly held managers
//! - **Pipeline**: the dataflow side, with gates, conversion stages and sinks
//!   wired through a [`DataflowEngine`](pipeline::DataflowEngine)
//! - **Communication**: Crossbeam channels for sample delivery and manager events
//!
//! ## Configuration
//!
//! [`AcquisitionConfig`] is stored as TOML in the platform config directory
//! under `dev.hxyulin.acqmux` (see [`config::config_dir`]).
//!
//! ## Example
//!
//! ```ignore
//! use acqmux::{AcquisitionManager, ChainSpec, ChannelSink, MockContext, MockDevice};
//! use std::sync::Arc;
//!
//! let context = MockContext::new().with_device(MockDevice::new("dev0", 2));
//! let manager = AcquisitionManager::get_or_create(&context, "dev0", 1024)?;
//!
//! let (sink, rx) = ChannelSink::new("scope", 64);
//! let tap = manager.attach(0, &ChainSpec::direct(Arc::new(sink), 0), 4096)?;
//! manager.start(tap)?;
//! for block in rx.iter().take(10) {
//!     println!("{} samples from channel {}", block.len(), block.channel);
//! }
//! manager.stop(tap)?;
//! manager.detach(tap)?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use backend::{
    AcquisitionManager, AcquisitionSource, ManagerEvent, ManagerHandle, ManagerRegistry,
    SourceProvider, TapInfo,
};
#[cfg(feature = "mock-source")]
pub use backend::{MockContext, MockDataPattern, MockDevice};
pub use config::AcquisitionConfig;
pub use error::{AcqError, Result};
pub use pipeline::{Block, ChainSpec, ChannelSink, DownstreamChain, Samples, TapId};
