//! Manager registry - device name to weakly held manager.
//!
//! The registry never owns a manager: it keeps a [`Weak`] per device so
//! concurrent callers converge on one instance, while the manager's
//! lifetime stays that of its longest-lived [`ManagerHandle`]. An entry
//! whose manager is gone counts as absent and is replaced on the next
//! request.
//!
//! Construction is serialized per device. The table lock is only held for
//! lookups, so opening a slow device never delays callers for another one.

use crate::backend::manager::{AcquisitionManager, ManagerHandle};
use crate::backend::source::SourceProvider;
use crate::config::AcquisitionConfig;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

static GLOBAL: OnceLock<ManagerRegistry> = OnceLock::new();

#[derive(Default)]
struct Entry {
    /// `None` until a manager has been built for the device
    manager: Option<Weak<AcquisitionManager>>,
    /// Held while a manager for this device is being built
    creating: Arc<Mutex<()>>,
}

impl Entry {
    fn live(&self) -> Option<ManagerHandle> {
        self.manager.as_ref().and_then(Weak::upgrade)
    }

    fn is_live(&self) -> bool {
        self.manager.as_ref().is_some_and(|w| w.strong_count() > 0)
    }

    /// Whether some caller other than the table holds the creation lock
    fn is_contended(&self) -> bool {
        Arc::strong_count(&self.creating) > 1
    }
}

/// Weak lookup table of live managers
#[derive(Default)]
pub struct ManagerRegistry {
    managers: Mutex<HashMap<String, Entry>>,
    config: AcquisitionConfig,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose managers are created with `config`
    pub fn with_config(config: AcquisitionConfig) -> Self {
        Self {
            managers: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// The process-wide registry
    pub fn global() -> &'static ManagerRegistry {
        GLOBAL.get_or_init(ManagerRegistry::new)
    }

    /// Live manager for `device`, or one built by `factory`.
    ///
    /// Racing callers for the same device wait on that device's creation
    /// lock, so only one of them runs `factory`. `factory` runs without the
    /// table lock held.
    pub fn lookup_or_insert<F>(&self, device: &str, factory: F) -> Result<ManagerHandle>
    where
        F: FnOnce() -> Result<AcquisitionManager>,
    {
        let creating = {
            let mut managers = self.lock();
            let entry = managers.entry(device.to_string()).or_default();
            if let Some(manager) = entry.live() {
                return Ok(manager);
            }
            entry.creating.clone()
        };
        let _creating = creating.lock().unwrap_or_else(PoisonError::into_inner);

        {
            let mut managers = self.lock();
            let entry = managers.entry(device.to_string()).or_default();
            if let Some(manager) = entry.live() {
                return Ok(manager);
            }
            if entry.manager.take().is_some() {
                tracing::warn!("Replacing stale manager entry for {}", device);
            }
        }

        let built = factory();
        let mut managers = self.lock();
        match built {
            Ok(manager) => {
                let manager = Arc::new(manager);
                managers.entry(device.to_string()).or_default().manager =
                    Some(Arc::downgrade(&manager));
                Ok(manager)
            }
            Err(e) => {
                // Nobody but us and the table references the creation lock.
                let idle = managers.get(device).is_some_and(|entry| {
                    entry.manager.is_none() && Arc::strong_count(&entry.creating) <= 2
                });
                if idle {
                    managers.remove(device);
                }
                Err(e)
            }
        }
    }

    /// Live manager for `device`, opening its source through `provider`
    /// on first use.
    pub fn get_or_create(
        &self,
        provider: &dyn SourceProvider,
        device: &str,
        buffer_size: usize,
    ) -> Result<ManagerHandle> {
        self.lookup_or_insert(device, || {
            AcquisitionManager::open(provider, device, buffer_size, self.config.clone())
        })
    }

    /// Live manager for `device` without creating one
    pub fn get(&self, device: &str) -> Option<ManagerHandle> {
        self.lock().get(device).and_then(Entry::live)
    }

    pub fn has_instance(&self, device: &str) -> bool {
        self.lock().get(device).is_some_and(Entry::is_live)
    }

    /// Number of live managers
    pub fn len(&self) -> usize {
        self.lock().values().filter(|e| e.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose manager is gone; returns how many were removed.
    /// Entries of devices currently being opened are kept.
    pub fn prune(&self) -> usize {
        let mut managers = self.lock();
        let before = managers.len();
        managers.retain(|_, e| e.is_live() || e.is_contended());
        before - managers.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.managers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
