//! Messaging between components.
//!
//! [`MessagingService`] combines the router with correlation tracking:
//! - Fire-and-forget sends go straight to the target's mailbox
//! - Requests are tracked, guarded by a timer, and resolved exactly once
//!   by a response, the timer, or cancellation
//!
//! The tracker and timeout handler are handed in by the constructor, so this
//! crate never depends on whatever owns them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};

use crate::timeout::TimeoutTarget;
use crate::{
    ComponentMessage, CorrelationId, CorrelationTracker, MessageRouter, PendingRequest,
    ResponseMessage, TimeoutHandler,
};
use wasm_host_common::{ComponentId, MessagingConfig, MessagingError, RequestError};

/// Point-in-time messaging counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingStats {
    /// Fire-and-forget messages delivered.
    pub messages_sent: u64,
    /// Requests delivered.
    pub requests_sent: u64,
    /// Responses that reached a waiting requester.
    pub responses_delivered: u64,
    /// Sends that found no route or a closed mailbox.
    pub routing_failures: u64,
    /// Requests currently awaiting an outcome.
    pub pending_requests: usize,
}

#[derive(Debug, Default)]
struct Counters {
    messages_sent: AtomicU64,
    requests_sent: AtomicU64,
    responses_delivered: AtomicU64,
    routing_failures: AtomicU64,
}

/// Component-to-component messaging.
#[derive(Debug)]
pub struct MessagingService {
    router: MessageRouter,
    tracker: Arc<CorrelationTracker>,
    timeouts: Arc<TimeoutHandler>,
    config: MessagingConfig,
    counters: Counters,
}

impl MessagingService {
    /// Create a service over shared tracking state.
    pub fn new(
        router: MessageRouter,
        tracker: Arc<CorrelationTracker>,
        timeouts: Arc<TimeoutHandler>,
        config: MessagingConfig,
    ) -> Self {
        Self {
            router,
            tracker,
            timeouts,
            config,
            counters: Counters::default(),
        }
    }

    /// Make `component_id` reachable through `mailbox`.
    pub fn register_route(
        &self,
        component_id: ComponentId,
        mailbox: mpsc::Sender<ComponentMessage>,
    ) {
        self.router.register(component_id, mailbox);
    }

    /// Make `component_id` unreachable. Returns whether it was reachable.
    pub fn unregister_route(&self, component_id: &ComponentId) -> bool {
        self.router.unregister(component_id)
    }

    /// Make `component_id` unreachable if it is still routed to `mailbox`.
    pub fn unregister_route_to(
        &self,
        component_id: &ComponentId,
        mailbox: &mpsc::Sender<ComponentMessage>,
    ) -> bool {
        self.router.unregister_mailbox(component_id, mailbox)
    }

    /// Whether `component_id` is reachable.
    pub fn has_route(&self, component_id: &ComponentId) -> bool {
        self.router.has_route(component_id)
    }

    /// Send a payload with no reply expected.
    ///
    /// # Errors
    ///
    /// Returns an error if the target has no route or its mailbox is closed.
    #[instrument(skip_all, fields(from = %from, to = %to, bytes = payload.len()))]
    pub async fn send_message(
        &self,
        from: ComponentId,
        to: ComponentId,
        payload: Vec<u8>,
    ) -> Result<(), MessagingError> {
        let message = ComponentMessage::Message { from, payload };

        match self.router.route(&to, message).await {
            Ok(()) => {
                self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.counters.routing_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Message not delivered");
                Err(e)
            }
        }
    }

    /// Send a request and return the channel its outcome arrives on.
    ///
    /// Uses the configured default timeout when `timeout` is `None`. The
    /// receiver yields exactly one [`ResponseMessage`].
    ///
    /// # Errors
    ///
    /// Returns an error if the target has no route or its mailbox is closed;
    /// the request is no longer tracked in that case.
    #[instrument(skip_all, fields(from = %from, to = %to, bytes = payload.len()))]
    pub async fn send_request(
        &self,
        from: ComponentId,
        to: ComponentId,
        payload: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<(CorrelationId, oneshot::Receiver<ResponseMessage>), MessagingError> {
        let timeout = timeout.unwrap_or_else(|| self.config.default_request_timeout());
        let correlation_id = CorrelationId::new();

        let (pending, response_rx) =
            PendingRequest::new(correlation_id, from.clone(), to.clone(), timeout);
        self.tracker.register_pending(pending)?;

        let target: Arc<dyn TimeoutTarget> = self.tracker.clone();
        let timer = self
            .timeouts
            .register_timeout(correlation_id, timeout, target);
        if let Err(timer) = self.tracker.attach_timer(&correlation_id, timer) {
            self.timeouts.cancel_timeout(&timer);
        }

        let message = ComponentMessage::Request {
            from,
            correlation_id,
            payload,
        };

        if let Err(e) = self.router.route(&to, message).await {
            self.counters.routing_failures.fetch_add(1, Ordering::Relaxed);
            let _ = self
                .tracker
                .cancel(&correlation_id, RequestError::TargetNotFound(to.to_string()));
            warn!(%correlation_id, error = %e, "Request not delivered");
            return Err(e);
        }

        self.counters.requests_sent.fetch_add(1, Ordering::Relaxed);
        debug!(%correlation_id, timeout_ms = timeout.as_millis(), "Request sent");

        Ok((correlation_id, response_rx))
    }

    /// Send a request and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the [`RequestError`] the exchange ended with.
    pub async fn request(
        &self,
        from: ComponentId,
        to: ComponentId,
        payload: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, RequestError> {
        let (_, response_rx) = self
            .send_request(from, to, payload, timeout)
            .await
            .map_err(|e| match e {
                MessagingError::TargetNotFound(target) => RequestError::TargetNotFound(target),
                other => RequestError::ProcessingFailed(other.to_string()),
            })?;

        match response_rx.await {
            Ok(response) => response.result,
            Err(_) => Err(RequestError::Cancelled),
        }
    }

    /// Answer a request.
    ///
    /// `responder` is the component answering and `requester` the one that
    /// asked.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Tracker`] with `NotFound` if the request was
    /// already resolved, typically by its timer. Callers may ignore it.
    pub fn respond(
        &self,
        correlation_id: CorrelationId,
        responder: ComponentId,
        requester: ComponentId,
        result: Result<Vec<u8>, RequestError>,
    ) -> Result<(), MessagingError> {
        let response = ResponseMessage {
            correlation_id,
            from: responder,
            to: requester,
            result,
            timestamp: std::time::SystemTime::now(),
        };

        self.tracker.resolve(&correlation_id, response)?;
        self.counters
            .responses_delivered
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Current counters.
    pub fn stats(&self) -> MessagingStats {
        MessagingStats {
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            requests_sent: self.counters.requests_sent.load(Ordering::Relaxed),
            responses_delivered: self.counters.responses_delivered.load(Ordering::Relaxed),
            routing_failures: self.counters.routing_failures.load(Ordering::Relaxed),
            pending_requests: self.tracker.pending_count(),
        }
    }

    /// The shared correlation tracker.
    pub fn tracker(&self) -> &Arc<CorrelationTracker> {
        &self.tracker
    }

    /// The shared timeout handler.
    pub fn timeout_handler(&self) -> &Arc<TimeoutHandler> {
        &self.timeouts
    }

    /// Messaging configuration.
    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }
}
