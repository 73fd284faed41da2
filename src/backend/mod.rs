//! Backend module: shared acquisition sources and their managers
//!
//! One [`AcquisitionManager`] owns the only connection to one device and
//! multiplexes it between any number of consumers.
//!
//! # Architecture
//!
//! - [`AcquisitionSource`] / [`SourceProvider`] - the external device interface
//! - [`AcquisitionManager`] - taps, connection graph, buffer-size arbitration
//!   and source start/stop
//! - [`ManagerRegistry`] - device name to weakly held manager
//! - [`ManagerEvent`] - lifecycle notifications for subscribers
//! - [`MockContext`] - simulated devices for testing (feature-gated)
//!
//! # Example
//!
//! ```ignore
//! use acqmux::backend::{AcquisitionManager, MockContext, MockDevice};
//! use acqmux::pipeline::{ChainSpec, ChannelSink};
//!
//! let context = MockContext::new().with_device(MockDevice::new("m2k-adc", 2));
//! let manager = AcquisitionManager::get_or_create(&context, "m2k-adc", 1024)?;
//!
//! let (sink, rx) = ChannelSink::new("scope", 64);
//! let tap = manager.attach(0, &ChainSpec::direct(Arc::new(sink), 0).to_float(), 4096)?;
//! manager.start(tap)?;
//! let block = rx.recv()?;
//! manager.stop(tap)?;
//! manager.detach(tap)?;
//! ```

pub mod events;
pub mod manager;
#[cfg(feature = "mock-source")]
pub mod mock_source;
pub mod registry;
pub mod source;
pub mod tap;

pub use events::{EventBus, ManagerEvent, EVENT_CHANNEL_CAPACITY};
pub use manager::{AcquisitionManager, ManagerHandle};
#[cfg(feature = "mock-source")]
pub use mock_source::{
    MockContext, MockDataPattern, MockDevice, MockFaults, MockSource, MockSourceState,
};
pub use registry::ManagerRegistry;
pub use source::{AcquisitionSource, SourceOutput, SourceProvider};
pub use tap::{arbitrated_buffer_size, TapInfo};
