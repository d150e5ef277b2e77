//! The actor hosting one WebAssembly component.
//!
//! Guest exports the actor looks for:
//!
//! | Export           | Signature             | When                             |
//! |------------------|-----------------------|----------------------------------|
//! | `init`           | `() -> ()`            | once, before the first message   |
//! | `handle-message` | `(i32) -> ()`         | per fire-and-forget message      |
//! | `handle-request` | `(i32) -> i32`        | per request; result is the reply |
//! | `cleanup`        | `() -> ()`            | once, when stopped               |
//!
//! Every export is optional. Message and request handlers receive the payload
//! length; request replies are the returned `i32` as little-endian bytes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::{Actor, ActorAddress};
use wasm_host_common::{
    Capability, CapabilitySet, ComponentId, ComponentMetadata, LimitError, RequestError,
    TransportError,
};
use wasm_host_core::{
    ComponentHandle, ComponentOutput, FuelMetrics, Invocation, ResourceLimiter, Value,
};
use wasm_host_messaging::{ComponentMessage, CorrelationId, MessagingService};

/// Export run before the first message.
pub const INIT_EXPORT: &str = "init";
/// Export run per fire-and-forget message.
pub const HANDLE_MESSAGE_EXPORT: &str = "handle-message";
/// Export run per request.
pub const HANDLE_REQUEST_EXPORT: &str = "handle-request";
/// Export run when the actor stops.
pub const CLEANUP_EXPORT: &str = "cleanup";

/// Address of a component actor.
pub type ComponentAddress = ActorAddress<ComponentMessage>;

/// Outcome of a direct invocation.
pub type InvokeOutcome = Result<(ComponentOutput, FuelMetrics), LimitError>;

/// Actor that runs a component's exports under its resource limits.
pub struct ComponentActor {
    component_id: ComponentId,
    handle: ComponentHandle,
    metadata: ComponentMetadata,
    capabilities: CapabilitySet,
    limiter: ResourceLimiter,
    messaging: Arc<MessagingService>,
    messages_handled: u64,
}

impl ComponentActor {
    /// Create an actor for a loaded component.
    pub fn new(
        handle: ComponentHandle,
        metadata: ComponentMetadata,
        capabilities: CapabilitySet,
        limiter: ResourceLimiter,
        messaging: Arc<MessagingService>,
    ) -> Self {
        Self {
            component_id: handle.component_id().clone(),
            handle,
            metadata,
            capabilities,
            limiter,
            messaging,
            messages_handled: 0,
        }
    }

    /// The hosted component.
    pub fn component_id(&self) -> &ComponentId {
        &self.component_id
    }

    /// Run one export under the component's fuel and deadline.
    async fn run(&self, function: &str, args: &[Value]) -> InvokeOutcome {
        let invocation = Invocation {
            handle: &self.handle,
            function,
            args,
            max_memory_bytes: self.metadata.max_memory_bytes,
            inherit_stdio: self.capabilities.has(Capability::WASI_STDIO),
        };

        self.limiter
            .execute_with_limits(invocation, self.metadata.max_fuel, self.metadata.timeout())
            .await
    }

    /// Run an export only if the guest has it.
    async fn run_optional(&self, function: &str, args: &[Value]) -> Option<InvokeOutcome> {
        if !self.handle.has_export(function) {
            return None;
        }
        Some(self.run(function, args).await)
    }

    async fn on_message(&mut self, from: &ComponentId, payload: &[u8]) {
        self.messages_handled += 1;

        match self
            .run_optional(HANDLE_MESSAGE_EXPORT, &[payload_len(payload)])
            .await
        {
            None => debug!(%from, "No message handler; message counted only"),
            Some(Ok((_, metrics))) => {
                debug!(%from, fuel_consumed = metrics.consumed, "Message handled");
            }
            Some(Err(e)) => warn!(%from, error = %e, "Message handler failed"),
        }
    }

    async fn on_request(
        &mut self,
        from: ComponentId,
        correlation_id: CorrelationId,
        payload: &[u8],
    ) {
        self.messages_handled += 1;

        let result = match self
            .run_optional(HANDLE_REQUEST_EXPORT, &[payload_len(payload)])
            .await
        {
            None => Err(RequestError::ProcessingFailed(format!(
                "{} has no {HANDLE_REQUEST_EXPORT} export",
                self.component_id
            ))),
            Some(Ok((output, _))) => output
                .as_i32()
                .map(|v| v.to_le_bytes().to_vec())
                .ok_or_else(|| {
                    RequestError::ProcessingFailed(format!(
                        "{HANDLE_REQUEST_EXPORT} did not return an i32"
                    ))
                }),
            Some(Err(e)) => Err(RequestError::ProcessingFailed(e.to_string())),
        };

        let responder = self.component_id.clone();
        if let Err(e) = self.messaging.respond(correlation_id, responder, from, result) {
            // The requester's timer already resolved it.
            debug!(%correlation_id, error = %e, "Response not delivered");
        }
    }
}

impl std::fmt::Debug for ComponentActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentActor")
            .field("component_id", &self.component_id)
            .field("messages_handled", &self.messages_handled)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Actor for ComponentActor {
    type Message = ComponentMessage;
    type Error = LimitError;

    #[instrument(skip(self), fields(component_id = %self.component_id))]
    async fn pre_start(&mut self) -> Result<(), LimitError> {
        if let Some(outcome) = self.run_optional(INIT_EXPORT, &[]).await {
            outcome?;
            debug!("Component initialized");
        }
        Ok(())
    }

    async fn handle(&mut self, message: ComponentMessage) -> Result<(), LimitError> {
        match message {
            ComponentMessage::Invoke {
                function,
                args,
                reply,
            } => {
                let outcome = self.run(&function, &args).await;
                if reply.send(outcome).is_err() {
                    debug!(component_id = %self.component_id, %function, "Invoker went away");
                }
            }
            ComponentMessage::Message { from, payload } => {
                self.on_message(&from, &payload).await;
            }
            ComponentMessage::Request {
                from,
                correlation_id,
                payload,
            } => {
                self.on_request(from, correlation_id, &payload).await;
            }
        }
        Ok(())
    }

    #[instrument(skip(self), fields(component_id = %self.component_id))]
    async fn post_stop(&mut self) -> Result<(), LimitError> {
        if let Some(outcome) = self.run_optional(CLEANUP_EXPORT, &[]).await {
            outcome?;
        }
        debug!(messages_handled = self.messages_handled, "Component stopped");
        Ok(())
    }
}

impl ActorAddress<ComponentMessage> {
    /// Call an export on the component and wait for its output.
    ///
    /// The call is queued behind earlier messages.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the actor is gone; the inner result is
    /// the invocation's own outcome.
    pub async fn invoke(
        &self,
        function: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<InvokeOutcome, TransportError> {
        let (reply, outcome) = tokio::sync::oneshot::channel();

        self.send(ComponentMessage::Invoke {
            function: function.into(),
            args,
            reply,
        })
        .await?;

        outcome
            .await
            .map_err(|_| TransportError::MailboxClosed(self.name().to_string()))
    }
}

fn payload_len(payload: &[u8]) -> Value {
    Value::I32(i32::try_from(payload.len()).unwrap_or(i32::MAX))
}
