//! The top-level host coordinator.
//!
//! Lifecycle: `NotStarted -> Started -> Stopped`. Construction starts the
//! manager; [`HostSystemManager::shutdown`] stops it for good. Every public
//! operation checks the started flag first.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use wasm_host_actor::{
    ActorSystem, ComponentAddress, ComponentRegistry, ComponentSpawner, WasmSource,
};
use wasm_host_common::{
    CapabilitySet, ComponentId, ComponentMetadata, ComponentStatus, HostConfig, HostError,
};
use wasm_host_core::{
    ComponentOutput, FuelMetrics, ResourceLimiter, RuntimeEngine, Value, WasmtimeRuntime,
};
use wasm_host_messaging::{CorrelationTracker, MessageRouter, MessagingService, TimeoutHandler};

/// Owns and coordinates the host subsystems.
///
/// Subsystems are held behind `Arc`s and the started flag is atomic, so a
/// manager can be shared across tasks with `Arc<HostSystemManager>`.
/// Independent managers share nothing.
pub struct HostSystemManager {
    config: HostConfig,
    tracker: Arc<CorrelationTracker>,
    messaging: Arc<MessagingService>,
    registry: Arc<ComponentRegistry>,
    spawner: ComponentSpawner,
    started: AtomicBool,
}

impl HostSystemManager {
    /// Start a manager with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InitializationFailed`] if the Wasmtime engine
    /// cannot be created.
    pub fn new() -> Result<Self, HostError> {
        Self::with_config(&HostConfig::default())
    }

    /// Start a manager backed by a Wasmtime engine built from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InitializationFailed`] if the Wasmtime engine
    /// cannot be created.
    pub fn with_config(config: &HostConfig) -> Result<Self, HostError> {
        let runtime = WasmtimeRuntime::new(&config.engine)
            .map_err(|e| HostError::initialization_failed(e.to_string()))?;

        Ok(Self::with_engine(config, Arc::new(runtime)))
    }

    /// Start a manager over an existing engine.
    pub fn with_engine(config: &HostConfig, engine: Arc<dyn RuntimeEngine>) -> Self {
        // Leaves first: no dependencies.
        let tracker = Arc::new(CorrelationTracker::new());
        let timeouts = Arc::new(TimeoutHandler::new());

        let messaging = Arc::new(MessagingService::new(
            MessageRouter::new(),
            Arc::clone(&tracker),
            timeouts,
            config.messaging.clone(),
        ));

        let limiter = ResourceLimiter::new(engine);
        let registry = Arc::new(ComponentRegistry::new());
        let spawner = ComponentSpawner::new(
            limiter,
            Arc::clone(&registry),
            ActorSystem::new(config.messaging.mailbox_capacity),
            Arc::clone(&messaging),
        );

        info!(
            stop_timeout_ms = config.lifecycle.stop_timeout_ms,
            mailbox_capacity = config.messaging.mailbox_capacity,
            "Host system started"
        );

        Self {
            config: config.clone(),
            tracker,
            messaging,
            registry,
            spawner,
            started: AtomicBool::new(true),
        }
    }

    fn ensure_started(&self) -> Result<(), HostError> {
        if self.started.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(HostError::not_started())
        }
    }

    /// Whether the manager accepts operations.
    pub fn started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Spawn a component and return its address.
    ///
    /// The component is reachable by id as soon as this returns.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::ComponentSpawnFailed`] with the root cause, or
    /// [`HostError::InitializationFailed`] if the manager is not started.
    #[instrument(skip_all, fields(component_id = %component_id))]
    pub async fn spawn_component(
        &self,
        component_id: ComponentId,
        source: WasmSource,
        metadata: ComponentMetadata,
        capabilities: CapabilitySet,
    ) -> Result<ComponentAddress, HostError> {
        self.ensure_started()?;

        let address = self
            .spawner
            .spawn_component(component_id.clone(), source, metadata, capabilities)
            .await?;

        let tracker = Arc::clone(&self.tracker);
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            tracker.register_component(component_id.clone());
            // A stop may have run in between.
            if !registry.is_registered(&component_id) {
                tracker.unregister_component(&component_id);
            }
        });

        Ok(address)
    }

    /// Stop a component and remove it.
    ///
    /// The component is unrouted first, then requests it is party to are
    /// cancelled both before and after its actor stops.
    /// The component is removed even when its `cleanup` export fails or the
    /// stop exceeds its bound; the error is still returned.
    ///
    /// # Errors
    ///
    /// - [`HostError::ComponentNotFound`] if the id is not registered
    /// - [`HostError::Timeout`] if the actor did not stop within the bound
    /// - [`HostError::Internal`] if the actor's stop hook failed
    #[instrument(skip_all, fields(component_id = %component_id))]
    pub async fn stop_component(&self, component_id: &ComponentId) -> Result<(), HostError> {
        self.ensure_started()?;
        self.stop_registered(component_id).await
    }

    async fn stop_registered(&self, component_id: &ComponentId) -> Result<(), HostError> {
        let start = Instant::now();
        let address = self
            .registry
            .lookup(component_id)
            .map_err(|_| HostError::component_not_found(component_id.as_str()))?;

        // Unroute first so no new request can reach the mailbox.
        self.messaging.unregister_route(component_id);
        let mut cancelled = self.tracker.cleanup_pending_for_component(component_id);

        let stop_timeout = self.config.lifecycle.stop_timeout();
        let stopped = match tokio::time::timeout(stop_timeout, address.stop()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(HostError::internal(format!(
                "stop of component {component_id} failed: {e}"
            ))),
            Err(_) => Err(HostError::Timeout {
                operation: "stop",
                component_id: component_id.to_string(),
                timeout_ms: self.config.lifecycle.stop_timeout_ms,
            }),
        };

        // Requests that raced the unroute were queued before the mailbox closed.
        cancelled += self.tracker.cleanup_pending_for_component(component_id);

        if self.registry.unregister(component_id).is_err() {
            // A concurrent stop finished first.
            debug!("Component already unregistered");
        }
        self.tracker.unregister_component(component_id);

        match &stopped {
            Ok(()) => info!(
                cancelled_requests = cancelled,
                duration_ms = start.elapsed().as_millis(),
                "Component stopped"
            ),
            Err(e) => warn!(
                cancelled_requests = cancelled,
                error = %e,
                "Component removed after failed stop"
            ),
        }

        stopped
    }

    /// Stop the component if it is registered, then spawn it afresh.
    ///
    /// Nothing carries over from the previous instance.
    ///
    /// # Errors
    ///
    /// Returns the stop or spawn failure.
    #[instrument(skip_all, fields(component_id = %component_id))]
    pub async fn restart_component(
        &self,
        component_id: &ComponentId,
        source: WasmSource,
        metadata: ComponentMetadata,
        capabilities: CapabilitySet,
    ) -> Result<(), HostError> {
        self.ensure_started()?;

        if self.registry.is_registered(component_id) {
            self.stop_registered(component_id).await?;
        }

        self.spawn_component(component_id.clone(), source, metadata, capabilities)
            .await?;

        info!("Component restarted");
        Ok(())
    }

    /// Coarse status: `Running` while registered.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::ComponentNotFound`] if the id is not registered.
    pub fn get_component_status(
        &self,
        component_id: &ComponentId,
    ) -> Result<ComponentStatus, HostError> {
        self.ensure_started()?;

        if self.registry.is_registered(component_id) {
            Ok(ComponentStatus::Running)
        } else {
            Err(HostError::component_not_found(component_id.as_str()))
        }
    }

    /// Call an export on a component under its fuel and deadline.
    ///
    /// # Errors
    ///
    /// - [`HostError::ComponentNotFound`] if the id is not registered
    /// - [`HostError::OutOfFuel`], [`HostError::ExecutionTimeout`] or
    ///   [`HostError::Trapped`] with the invocation's metrics
    /// - [`HostError::Internal`] if the actor is gone or the call could not
    ///   be prepared
    #[instrument(skip_all, fields(component_id = %component_id, function = %function))]
    pub async fn execute(
        &self,
        component_id: &ComponentId,
        function: &str,
        args: Vec<Value>,
    ) -> Result<(ComponentOutput, FuelMetrics), HostError> {
        self.ensure_started()?;

        let address = self
            .registry
            .lookup(component_id)
            .map_err(|_| HostError::component_not_found(component_id.as_str()))?;

        let outcome = address.invoke(function, args).await.map_err(|e| {
            HostError::internal(format!(
                "invoke of {function} on component {component_id} failed: {e}"
            ))
        })?;

        let (output, metrics) =
            outcome.map_err(|e| HostError::from_limit(component_id.as_str(), e))?;

        debug!(
            fuel_consumed = metrics.consumed,
            usage_pct = metrics.usage_pct(),
            "Execution completed"
        );

        Ok((output, metrics))
    }

    /// Stop every component and refuse further operations.
    ///
    /// Stop failures are logged and skipped. Calling this again is a no-op.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` is kept for callers that chain it.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), HostError> {
        // Refuse new work before draining.
        if !self.started.swap(false, Ordering::AcqRel) {
            debug!("Host system already shut down");
            return Ok(());
        }

        let components = self.registry.list_components();
        let mut failures = 0usize;

        for component_id in &components {
            if let Err(e) = self.stop_registered(component_id).await {
                failures += 1;
                warn!(%component_id, error = %e, "Component failed to stop during shutdown");
            }
        }

        info!(
            components = components.len(),
            failures,
            pending_requests = self.tracker.pending_count(),
            "Host system shut down"
        );

        Ok(())
    }

    /// Whether a component is registered under the id.
    pub fn is_component_registered(&self, component_id: &ComponentId) -> bool {
        self.registry.is_registered(component_id)
    }

    /// Snapshot of registered component ids, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InitializationFailed`] if the manager is not
    /// started.
    pub fn list_components(&self) -> Result<Vec<ComponentId>, HostError> {
        self.ensure_started()?;
        Ok(self.registry.list_components())
    }

    /// The messaging service components talk through.
    pub fn messaging(&self) -> &Arc<MessagingService> {
        &self.messaging
    }

    /// The configuration the manager was built with.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }
}

impl fmt::Debug for HostSystemManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostSystemManager")
            .field("started", &self.started())
            .field("components", &self.registry.count())
            .field("pending_requests", &self.tracker.pending_count())
            .finish_non_exhaustive()
    }
}
