// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::adapter::ServiceAdapter;
use crate::error::AdapterError;
use crate::lifecycle::LifecycleState;

/// An explicit registry of named adapter instances.
///
/// The registry is owned by the composition root and enforces the invariant that an
/// adapter name is unique among live (non-destroyed) adapters. Shutdown is explicit
/// through [`shutdown_all`][Self::shutdown_all]; nothing happens by virtue of import
/// order or process exit.
///
/// # Examples
///
/// ```no_run
/// use pulse::Clock;
/// use valet::{AdapterRegistry, ServiceAdapter};
///
/// # async fn example() -> Result<(), valet::AdapterError> {
/// let clock = Clock::new_tokio();
/// let registry = AdapterRegistry::new();
///
/// registry.register(ServiceAdapter::builder("documents", &clock).build())?;
/// registry.register(ServiceAdapter::builder("sessions", &clock).build())?;
///
/// // ... wire, start and use the adapters ...
///
/// registry.shutdown_all().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    adapters: Mutex<HashMap<String, ServiceAdapter>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its configured name.
    ///
    /// Fails if another adapter with the same name is registered and not yet
    /// destroyed; a destroyed namesake is silently replaced.
    pub fn register(&self, adapter: ServiceAdapter) -> Result<(), AdapterError> {
        let name = adapter.name();
        let mut adapters = self.adapters.lock();

        if let Some(existing) = adapters.get(&name) {
            if existing.lifecycle() != LifecycleState::Destroyed {
                return Err(AdapterError::DuplicateName(name));
            }
        }

        let _ = adapters.insert(name, adapter);
        Ok(())
    }

    /// Looks an adapter up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ServiceAdapter> {
        self.adapters.lock().get(name).cloned()
    }

    /// Removes and returns an adapter without destroying it.
    pub fn remove(&self, name: &str) -> Option<ServiceAdapter> {
        self.adapters.lock().remove(name)
    }

    /// The registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.lock().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.lock().is_empty()
    }

    /// Destroys every registered adapter and empties the registry.
    ///
    /// Adapters that are still running are stopped by their own `destroy`.
    pub async fn shutdown_all(&self) {
        let adapters: Vec<ServiceAdapter> = self.adapters.lock().drain().map(|(_, adapter)| adapter).collect();

        for adapter in adapters {
            if let Err(err) = adapter.destroy().await {
                tracing::warn!(adapter = %adapter.name(), error = %err, "destroy during shutdown failed");
            }
        }
    }
}
