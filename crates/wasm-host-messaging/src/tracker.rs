//! Pending request bookkeeping.
//!
//! [`CorrelationTracker`] maps correlation ids to [`PendingRequest`]s. Removal
//! from that map is the only arbitration between a response, a timeout, and
//! an explicit cancellation: whoever removes the entry delivers the outcome,
//! everyone else gets [`TrackerError::NotFound`].

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::timeout::{TimeoutTarget, TimerHandle};
use crate::{CorrelationId, PendingRequest, ResponseMessage};
use wasm_host_common::{ComponentId, RequestError, TrackerError};

/// Concurrent tracker of in-flight requests.
#[derive(Debug, Default)]
pub struct CorrelationTracker {
    pending: DashMap<CorrelationId, PendingRequest>,
    components: DashMap<ComponentId, Instant>,
    completed: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
}

impl CorrelationTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a request.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::DuplicateCorrelationId`] if the id is already pending.
    pub fn register_pending(&self, request: PendingRequest) -> Result<(), TrackerError> {
        match self.pending.entry(request.correlation_id) {
            Entry::Occupied(entry) => Err(TrackerError::DuplicateCorrelationId(
                entry.key().to_string(),
            )),
            Entry::Vacant(entry) => {
                trace!(
                    correlation_id = %request.correlation_id,
                    from = %request.from,
                    to = %request.to,
                    "Request pending"
                );
                entry.insert(request);
                Ok(())
            }
        }
    }

    /// Attach the timer guarding a pending request.
    ///
    /// # Errors
    ///
    /// Gives the timer back if the request has already been resolved; the
    /// caller should cancel it.
    pub fn attach_timer(
        &self,
        correlation_id: &CorrelationId,
        timer: TimerHandle,
    ) -> Result<(), TimerHandle> {
        match self.pending.get_mut(correlation_id) {
            Some(mut entry) => {
                entry.timer = Some(timer);
                Ok(())
            }
            None => Err(timer),
        }
    }

    /// Deliver a response.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::NotFound`] if the request was already resolved,
    /// which is the expected outcome for the loser of a response/timeout race.
    pub fn resolve(
        &self,
        correlation_id: &CorrelationId,
        response: ResponseMessage,
    ) -> Result<(), TrackerError> {
        let request = self.take(correlation_id)?;

        trace!(
            %correlation_id,
            elapsed_ms = request.requested_at.elapsed().as_millis(),
            success = response.is_success(),
            "Request resolved"
        );

        deliver(request, response);
        self.completed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Resolve a request with [`RequestError::Timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::NotFound`] if a response already won the race.
    pub fn try_resolve_with_timeout(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<(), TrackerError> {
        let request = self.take(correlation_id)?;

        debug!(
            %correlation_id,
            from = %request.from,
            to = %request.to,
            timeout_ms = request.timeout.as_millis(),
            "Request timed out"
        );

        let response = ResponseMessage::failure(
            *correlation_id,
            request.to.clone(),
            request.from.clone(),
            RequestError::Timeout,
        );
        deliver(request, response);
        self.timed_out.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Resolve a request with `error` without waiting for the target.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::NotFound`] if the request was already resolved.
    pub fn cancel(
        &self,
        correlation_id: &CorrelationId,
        error: RequestError,
    ) -> Result<(), TrackerError> {
        let request = self.take(correlation_id)?;

        let response = ResponseMessage::failure(
            *correlation_id,
            request.to.clone(),
            request.from.clone(),
            error,
        );
        deliver(request, response);
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Cancel every request sent by or to `component_id`.
    ///
    /// Each waiter receives [`RequestError::Cancelled`]. Returns the number of
    /// requests cancelled here; entries resolved concurrently are skipped.
    pub fn cleanup_pending_for_component(&self, component_id: &ComponentId) -> usize {
        let ids = self.pending_for_component(component_id);

        let cleaned = ids
            .iter()
            .filter(|id| self.cancel(id, RequestError::Cancelled).is_ok())
            .count();

        if cleaned > 0 {
            info!(%component_id, cleaned, "Cancelled pending requests for component");
        }
        cleaned
    }

    /// Resolve every request whose deadline has passed with
    /// [`RequestError::Timeout`].
    ///
    /// Timers normally do this; the sweep catches entries whose timer was
    /// delayed or lost. Returns the number of requests resolved here.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|entry| now.duration_since(entry.value().requested_at) > entry.value().timeout)
            .map(|entry| *entry.key())
            .collect();

        let swept = expired
            .iter()
            .filter(|id| self.try_resolve_with_timeout(id).is_ok())
            .count();

        if swept > 0 {
            info!(swept, "Swept expired requests");
        }
        swept
    }

    /// Correlation ids currently pending that involve `component_id`.
    pub fn pending_for_component(&self, component_id: &ComponentId) -> Vec<CorrelationId> {
        self.pending
            .iter()
            .filter(|entry| entry.value().involves(component_id))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Whether `correlation_id` is still pending.
    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Record that a component exists.
    pub fn register_component(&self, component_id: ComponentId) {
        self.components.insert(component_id, Instant::now());
    }

    /// Forget a component.
    pub fn unregister_component(&self, component_id: &ComponentId) {
        self.components.remove(component_id);
    }

    /// Whether a component has been registered.
    pub fn is_component_known(&self, component_id: &ComponentId) -> bool {
        self.components.contains_key(component_id)
    }

    /// Requests currently in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Requests resolved by a response.
    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Requests resolved by their timer.
    pub fn timeout_count(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    /// Requests resolved by explicit cancellation.
    pub fn cancelled_count(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Remove the entry. The single arbitration point.
    fn take(&self, correlation_id: &CorrelationId) -> Result<PendingRequest, TrackerError> {
        match self.pending.remove(correlation_id) {
            Some((_, request)) => Ok(request),
            None => {
                debug!(%correlation_id, "Correlation already resolved");
                Err(TrackerError::NotFound(correlation_id.to_string()))
            }
        }
    }
}

impl TimeoutTarget for CorrelationTracker {
    fn resolve_with_timeout(&self, correlation_id: &CorrelationId) {
        // NotFound means a response got there first.
        let _ = self.try_resolve_with_timeout(correlation_id);
    }
}

/// Stop the timer and hand the outcome to the waiter.
fn deliver(mut request: PendingRequest, response: ResponseMessage) {
    if let Some(timer) = request.timer.take() {
        timer.cancel();
    }
    if request.response_tx.send(response).is_err() {
        debug!(
            correlation_id = %request.correlation_id,
            "Requester dropped before the outcome arrived"
        );
    }
}
