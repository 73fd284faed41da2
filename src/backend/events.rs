//! Manager lifecycle notifications
//!
//! Consumers that want to react to the shared source (for example to show
//! "acquisition stopped" or a timeout banner) subscribe through
//! [`AcquisitionManager::subscribe`](super::AcquisitionManager::subscribe).
//! Delivery is best effort: a subscriber that stops draining its channel
//! misses events rather than stalling the manager.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::{Mutex, PoisonError};

/// Capacity of each subscriber's channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Something that happened to a manager's source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerEvent {
    /// The source began producing data
    Started,
    /// The source stopped and its worker was joined
    Stopped,
    /// A new arbitrated buffer size was pushed to the source
    BufferSizeChanged(usize),
    /// The source waited longer than its timeout for data
    Timeout,
}

/// Fan-out of [`ManagerEvent`]s to any number of subscribers
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<ManagerEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<ManagerEvent> {
        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Send `event` to every live subscriber, dropping disconnected ones
    pub fn publish(&self, event: ManagerEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!("Event subscriber full, dropping {:?}", event);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
