//! Configuration module for the acquisition multiplexer
//!
//! Holds the knobs a manager is created with: initial buffer size and
//! timeout, kernel buffer count, channel sink capacity, and whether topology
//! changes pause a running source.
//!
//! # File Location
//!
//! The binary looks for `acqmux.toml` in the platform config directory:
//! - **Linux**: `~/.config/dev.hxyulin.acqmux/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.acqmux/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.acqmux\`
//!
//! # Example
//!
//! ```ignore
//! use acqmux::config::AcquisitionConfig;
//!
//! let config = AcquisitionConfig::load_or_default("acqmux.toml");
//! assert!(config.pause_on_topology_change);
//! ```

use crate::error::{AcqError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.acqmux";

/// Config filename
pub const CONFIG_FILE: &str = "acqmux.toml";

/// Default buffer size (samples per channel per block)
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default timeout for source reads in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Kernel buffer count used when none (0) is requested
pub const KERNEL_BUFFERS_DEFAULT: u32 = 1;

/// Default bounded capacity of channel sinks
pub const DEFAULT_SINK_CAPACITY: usize = 64;

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Settings a manager is created with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Buffer size used when a caller does not ask for one
    pub default_buffer_size: usize,

    /// Initial source timeout in milliseconds
    pub timeout_ms: u64,

    /// Initial kernel buffer count (0 = default)
    pub kernel_buffers: u32,

    /// Stop the source around attach/detach while it is running.
    ///
    /// The wrapped engine corrupts metadata routing when its graph changes
    /// shape while running; only disable this for an engine known to support
    /// live reconfiguration.
    pub pause_on_topology_change: bool,

    /// Capacity of channel sinks created by helpers
    pub sink_capacity: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            default_buffer_size: DEFAULT_BUFFER_SIZE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            kernel_buffers: KERNEL_BUFFERS_DEFAULT,
            pause_on_topology_change: true,
            sink_capacity: DEFAULT_SINK_CAPACITY,
        }
    }
}

impl AcquisitionConfig {
    /// Load a config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AcqError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| AcqError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config, falling back to defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Using default acquisition config: {}", e);
                Self::default()
            }
        }
    }

    /// Save the config as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| AcqError::Serialization(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values no source can be configured with
    pub fn validate(&self) -> Result<()> {
        if self.default_buffer_size == 0 {
            return Err(AcqError::Config(
                "default_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(AcqError::Config(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.sink_capacity == 0 {
            return Err(AcqError::Config(
                "sink_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Kernel buffer count with 0 mapped to the default
    pub fn effective_kernel_buffers(&self) -> u32 {
        effective_kernel_buffers(self.kernel_buffers)
    }
}

/// Map a requested kernel buffer count to the one actually used
pub fn effective_kernel_buffers(requested: u32) -> u32 {
    if requested == 0 {
        KERNEL_BUFFERS_DEFAULT
    } else {
        requested
    }
}
