//! Port descriptors for pipeline stages.
//!
//! Each stage declares its ports (inputs/outputs) via `PortDescriptor` slices.
//! The engine uses these to validate edge connections before wiring them.

use serde::{Deserialize, Serialize};

/// The sample format flowing through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortKind {
    /// Raw 16-bit samples straight from the device.
    Raw,
    /// Samples converted to `f32`.
    Float,
    /// Accepts or produces either format.
    Any,
}

impl PortKind {
    /// Whether an output of kind `self` may feed an input of kind `input`.
    pub fn feeds(self, input: PortKind) -> bool {
        self == PortKind::Any || input == PortKind::Any || self == input
    }
}

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Static descriptor for a stage's port.
#[derive(Debug, Clone, Serialize)]
pub struct PortDescriptor {
    pub name: &'static str,
    pub direction: PortDirection,
    pub kind: PortKind,
}

impl PortDescriptor {
    pub const fn input(name: &'static str, kind: PortKind) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
            kind,
        }
    }

    pub const fn output(name: &'static str, kind: PortKind) -> Self {
        Self {
            name,
            direction: PortDirection::Output,
            kind,
        }
    }
}

/// The `index`-th port of `ports` facing `direction`.
pub fn nth_port(
    ports: &[PortDescriptor],
    direction: PortDirection,
    index: usize,
) -> Option<&PortDescriptor> {
    ports.iter().filter(|p| p.direction == direction).nth(index)
}
