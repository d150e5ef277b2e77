//! Loading components and starting their actors.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::{ActorSystem, ComponentActor, ComponentAddress, ComponentRegistry};
use wasm_host_common::{
    CapabilitySet, ComponentId, ComponentMetadata, RegistryError, RuntimeError, SpawnError,
    SpawnErrorKind,
};
use wasm_host_core::{ResourceLimiter, RuntimeEngine};
use wasm_host_messaging::MessagingService;

/// Where a component's WebAssembly comes from.
#[derive(Debug, Clone)]
pub enum WasmSource {
    /// Binary module bytes.
    Bytes(Vec<u8>),
    /// A `.wasm` or `.wat` file, read asynchronously.
    Path(PathBuf),
    /// WebAssembly text.
    Wat(String),
}

impl WasmSource {
    /// Read the source into memory.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Io`] if a file cannot be read.
    pub async fn load(self) -> Result<Vec<u8>, RuntimeError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Path(path) => Ok(tokio::fs::read(&path).await?),
            Self::Wat(text) => Ok(text.into_bytes()),
        }
    }
}

impl From<Vec<u8>> for WasmSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<PathBuf> for WasmSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

/// Turns a [`WasmSource`] into a registered, routable component actor.
#[derive(Debug, Clone)]
pub struct ComponentSpawner {
    limiter: ResourceLimiter,
    registry: Arc<ComponentRegistry>,
    actors: ActorSystem,
    messaging: Arc<MessagingService>,
}

impl ComponentSpawner {
    /// Create a spawner.
    pub fn new(
        limiter: ResourceLimiter,
        registry: Arc<ComponentRegistry>,
        actors: ActorSystem,
        messaging: Arc<MessagingService>,
    ) -> Self {
        Self {
            limiter,
            registry,
            actors,
            messaging,
        }
    }

    fn engine(&self) -> &Arc<dyn RuntimeEngine> {
        self.limiter.engine()
    }

    /// Load, start, register, and route a component.
    ///
    /// The returned address is usable immediately, including for messages
    /// routed by id.
    ///
    /// # Errors
    ///
    /// - [`SpawnErrorKind::AlreadyExists`] if the id is registered
    /// - [`SpawnErrorKind::LoadFailed`] if the module cannot be read or compiled
    /// - [`SpawnErrorKind::ActorFailed`] if the `init` export fails
    #[instrument(skip_all, fields(component_id = %component_id))]
    pub async fn spawn_component(
        &self,
        component_id: ComponentId,
        source: WasmSource,
        metadata: ComponentMetadata,
        capabilities: CapabilitySet,
    ) -> Result<ComponentAddress, SpawnError> {
        let start = Instant::now();
        let fail = |kind| SpawnError::new(component_id.as_str(), kind);

        if self.registry.is_registered(&component_id) {
            return Err(fail(SpawnErrorKind::AlreadyExists));
        }

        let bytes = source
            .load()
            .await
            .map_err(|e| fail(SpawnErrorKind::LoadFailed(e)))?;

        let handle = self
            .engine()
            .load_component(&component_id, &bytes)
            .await
            .map_err(|e| fail(SpawnErrorKind::LoadFailed(e)))?;

        let actor = ComponentActor::new(
            handle,
            metadata,
            capabilities,
            self.limiter.clone(),
            Arc::clone(&self.messaging),
        );

        let address = self
            .actors
            .spawn(component_id.as_str(), actor)
            .await
            .map_err(|e| fail(SpawnErrorKind::ActorFailed(e.to_string())))?;

        // A concurrent spawn of the same id may have won since the check above.
        if let Err(RegistryError::AlreadyRegistered { .. }) =
            self.registry.register(component_id.clone(), address.clone())
        {
            if let Err(e) = address.stop().await {
                warn!(error = %e, "Discarded duplicate actor failed to stop");
            }
            return Err(fail(SpawnErrorKind::AlreadyExists));
        }

        let mailbox = address.mailbox();
        self.messaging
            .register_route(component_id.clone(), mailbox.clone());

        // A stop between the insert and the route would leave the route behind.
        let still_registered = self
            .registry
            .lookup(&component_id)
            .is_ok_and(|current| current.id() == address.id());
        if !still_registered {
            self.messaging.unregister_route_to(&component_id, &mailbox);
            warn!("Component stopped while spawning");
            return Err(fail(SpawnErrorKind::ActorFailed(
                "component stopped while spawning".to_string(),
            )));
        }

        info!(
            duration_ms = start.elapsed().as_millis(),
            actor_id = %address.id(),
            "Component spawned"
        );

        Ok(address)
    }

    /// The registry spawned components land in.
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }
}
