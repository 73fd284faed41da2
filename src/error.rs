//! Error handling for the acquisition multiplexer
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the library.

use crate::pipeline::{GraphError, TapId};
use thiserror::Error;

/// Main error type for acquisition operations
#[derive(Error, Debug)]
pub enum AcqError {
    /// The requested device has no acquisition source
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// `attach` asked for a channel the source does not have
    #[error("Channel {channel} out of range (source has {channel_count} channels)")]
    ChannelOutOfRange { channel: usize, channel_count: usize },

    /// The tap id is not live (never attached, or already detached)
    #[error("Unknown tap: {0}")]
    UnknownTap(TapId),

    /// The source refused to start
    #[error("Source start failed: {0}")]
    SourceStartFailed(String),

    /// The source refused to stop
    #[error("Source stop failed: {0}")]
    SourceStopFailed(String),

    /// Any other failure reported by the source
    #[error("Source error: {0}")]
    Source(String),

    /// Errors from the dataflow engine while wiring stages
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AcqError>,
    },
}

impl AcqError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AcqError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers
    pub fn root(&self) -> &AcqError {
        match self {
            AcqError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for acquisition operations
pub type Result<T> = std::result::Result<T, AcqError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
