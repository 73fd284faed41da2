//! Tap: one consumer's attachment to one source channel.

use crate::pipeline::{Connection, Gate, NodeId, StageHandle, TapId};
use std::sync::Arc;

/// A live attachment: channel, gate, buffer-size hint and everything the
/// tap wired behind its gate.
///
/// `edges` lists every edge the tap holds an owner count on, including
/// edges into a stage it shares with other taps. Detaching releases exactly
/// those.
#[derive(Clone)]
pub(crate) struct Tap {
    pub id: TapId,
    pub channel: usize,
    pub buffer_size: usize,
    pub enabled: bool,
    pub gate: Arc<Gate>,
    pub gate_node: NodeId,
    /// Stages between the gate and the sink, in wiring order
    pub stages: Vec<StageHandle>,
    pub sink: StageHandle,
    pub edges: Vec<Connection>,
}

impl Tap {
    pub fn open_gate(&mut self) {
        self.enabled = true;
        self.gate.set_enabled(true);
        tracing::debug!("Enabled {} on channel {}", self.id, self.channel);
    }

    pub fn close_gate(&mut self) {
        self.enabled = false;
        self.gate.set_enabled(false);
        tracing::debug!("Disabled {} on channel {}", self.id, self.channel);
    }
}

/// Public view of a tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapInfo {
    pub id: TapId,
    pub channel: usize,
    pub buffer_size: usize,
    pub enabled: bool,
}

impl From<&Tap> for TapInfo {
    fn from(tap: &Tap) -> Self {
        Self {
            id: tap.id,
            channel: tap.channel,
            buffer_size: tap.buffer_size,
            enabled: tap.enabled,
        }
    }
}

/// Largest buffer-size hint among enabled taps, or 0 when none is enabled.
pub fn arbitrated_buffer_size(hints: impl IntoIterator<Item = (bool, usize)>) -> usize {
    hints
        .into_iter()
        .filter(|&(enabled, _)| enabled)
        .map(|(_, size)| size)
        .max()
        .unwrap_or(0)
}
