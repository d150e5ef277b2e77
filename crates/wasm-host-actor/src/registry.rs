//! Component id to actor address lookup.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::ComponentAddress;
use wasm_host_common::{ComponentId, RegistryError};

/// Concurrent map from component id to its running actor.
///
/// An id maps to at most one address at a time.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: DashMap<ComponentId, ComponentAddress>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] if the id is taken.
    pub fn register(
        &self,
        component_id: ComponentId,
        address: ComponentAddress,
    ) -> Result<(), RegistryError> {
        match self.components.entry(component_id) {
            Entry::Occupied(entry) => Err(RegistryError::AlreadyRegistered {
                component_id: entry.key().to_string(),
            }),
            Entry::Vacant(entry) => {
                debug!(component_id = %entry.key(), "Component registered");
                entry.insert(address);
                Ok(())
            }
        }
    }

    /// Look up a component's address.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ComponentNotFound`] if the id is not registered.
    pub fn lookup(&self, component_id: &ComponentId) -> Result<ComponentAddress, RegistryError> {
        self.components
            .get(component_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::ComponentNotFound {
                component_id: component_id.to_string(),
            })
    }

    /// Whether the id is registered.
    pub fn is_registered(&self, component_id: &ComponentId) -> bool {
        self.components.contains_key(component_id)
    }

    /// Remove a component.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ComponentNotFound`] if the id is not registered.
    pub fn unregister(&self, component_id: &ComponentId) -> Result<(), RegistryError> {
        self.components
            .remove(component_id)
            .map(|_| debug!(%component_id, "Component unregistered"))
            .ok_or_else(|| RegistryError::ComponentNotFound {
                component_id: component_id.to_string(),
            })
    }

    /// Snapshot of registered ids, sorted.
    pub fn list_components(&self) -> Vec<ComponentId> {
        let mut ids: Vec<_> = self
            .components
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of registered components.
    pub fn count(&self) -> usize {
        self.components.len()
    }
}
