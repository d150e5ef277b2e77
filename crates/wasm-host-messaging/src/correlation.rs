//! Correlation ids and the messages that flow through the tracker.

use std::fmt;
use std::time::{Duration, SystemTime};

use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::timeout::TimerHandle;
use wasm_host_common::{ComponentId, RequestError};

/// Identifies one request-response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A request awaiting its response.
pub struct PendingRequest {
    /// Exchange id.
    pub correlation_id: CorrelationId,
    /// Requesting component.
    pub from: ComponentId,
    /// Target component.
    pub to: ComponentId,
    /// Where the terminal outcome is delivered.
    pub response_tx: oneshot::Sender<ResponseMessage>,
    /// When the request was issued.
    pub requested_at: Instant,
    /// How long the requester is willing to wait.
    pub timeout: Duration,
    pub(crate) timer: Option<TimerHandle>,
}

impl PendingRequest {
    /// Create a pending request. Returns the receiver the requester awaits.
    pub fn new(
        correlation_id: CorrelationId,
        from: ComponentId,
        to: ComponentId,
        timeout: Duration,
    ) -> (Self, oneshot::Receiver<ResponseMessage>) {
        let (response_tx, response_rx) = oneshot::channel();
        let request = Self {
            correlation_id,
            from,
            to,
            response_tx,
            requested_at: Instant::now(),
            timeout,
            timer: None,
        };
        (request, response_rx)
    }

    /// Whether `component_id` is either end of this exchange.
    pub fn involves(&self, component_id: &ComponentId) -> bool {
        &self.from == component_id || &self.to == component_id
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("correlation_id", &self.correlation_id)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// The terminal outcome of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    /// Exchange id.
    pub correlation_id: CorrelationId,
    /// Responding component.
    pub from: ComponentId,
    /// Original requester.
    pub to: ComponentId,
    /// Payload or failure.
    pub result: Result<Vec<u8>, RequestError>,
    /// When the outcome was produced.
    pub timestamp: SystemTime,
}

impl ResponseMessage {
    /// A successful response.
    pub fn success(
        correlation_id: CorrelationId,
        from: ComponentId,
        to: ComponentId,
        payload: Vec<u8>,
    ) -> Self {
        Self::new(correlation_id, from, to, Ok(payload))
    }

    /// A response carrying a failure.
    pub fn failure(
        correlation_id: CorrelationId,
        from: ComponentId,
        to: ComponentId,
        error: RequestError,
    ) -> Self {
        Self::new(correlation_id, from, to, Err(error))
    }

    fn new(
        correlation_id: CorrelationId,
        from: ComponentId,
        to: ComponentId,
        result: Result<Vec<u8>, RequestError>,
    ) -> Self {
        Self {
            correlation_id,
            from,
            to,
            result,
            timestamp: SystemTime::now(),
        }
    }

    /// Whether the exchange produced a payload.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
