//! Per-request timers.
//!
//! Every pending request gets one lightweight tokio task that sleeps until
//! the deadline and then asks its [`TimeoutTarget`] to resolve the request
//! with a timeout. Cancelling aborts the task.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::CorrelationId;

/// Something that can resolve a request as timed out.
///
/// Implemented by [`CorrelationTracker`](crate::CorrelationTracker). The
/// handler only knows this trait, never the tracker type.
pub trait TimeoutTarget: Send + Sync + 'static {
    /// Resolve `correlation_id` with a timeout. A no-op if it is already gone.
    fn resolve_with_timeout(&self, correlation_id: &CorrelationId);
}

type TimerMap = Arc<DashMap<CorrelationId, AbortHandle>>;

/// Handle to a live (or already fired) timer.
///
/// Holds its own reference to the timer table, so it can be cancelled by
/// whoever ends up owning it.
pub struct TimerHandle {
    correlation_id: CorrelationId,
    abort: AbortHandle,
    timers: TimerMap,
}

impl TimerHandle {
    /// The request this timer guards.
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Stop the timer. Idempotent, and harmless after the timer fired.
    pub fn cancel(&self) {
        self.timers.remove(&self.correlation_id);
        self.abort.abort();
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}

/// Spawns and cancels request timers.
#[derive(Debug, Clone, Default)]
pub struct TimeoutHandler {
    timers: TimerMap,
}

impl TimeoutHandler {
    /// Create an empty handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a timer that fires `target.resolve_with_timeout(correlation_id)`
    /// after `duration`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register_timeout(
        &self,
        correlation_id: CorrelationId,
        duration: Duration,
        target: Arc<dyn TimeoutTarget>,
    ) -> TimerHandle {
        let timers = Arc::clone(&self.timers);
        let (armed_tx, armed_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            // Wait until our entry is in the table.
            let _ = armed_rx.await;
            tokio::time::sleep(duration).await;
            // Leave the table before resolving so a racing cancel is a no-op.
            timers.remove(&correlation_id);
            debug!(%correlation_id, timeout_ms = duration.as_millis(), "Request timer fired");
            target.resolve_with_timeout(&correlation_id);
        });

        let abort = task.abort_handle();
        self.timers.insert(correlation_id, abort.clone());
        let _ = armed_tx.send(());

        trace!(%correlation_id, timeout_ms = duration.as_millis(), "Request timer registered");

        TimerHandle {
            correlation_id,
            abort,
            timers: Arc::clone(&self.timers),
        }
    }

    /// Stop a timer early. Idempotent.
    pub fn cancel_timeout(&self, handle: &TimerHandle) {
        handle.cancel();
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTarget {
        fired: AtomicUsize,
    }

    impl TimeoutTarget for CountingTarget {
        fn resolve_with_timeout(&self, _correlation_id: &CorrelationId) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires() {
        let handler = TimeoutHandler::new();
        let target = Arc::new(CountingTarget::default());

        let _handle = handler.register_timeout(
            CorrelationId::new(),
            Duration::from_millis(50),
            target.clone(),
        );
        assert_eq!(handler.active_count(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(target.fired.load(Ordering::SeqCst), 1);
        assert_eq!(handler.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_fire() {
        let handler = TimeoutHandler::new();
        let target = Arc::new(CountingTarget::default());

        let handle = handler.register_timeout(
            CorrelationId::new(),
            Duration::from_millis(50),
            target.clone(),
        );
        handler.cancel_timeout(&handle);
        assert_eq!(handler.active_count(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(target.fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let handler = TimeoutHandler::new();
        let target = Arc::new(CountingTarget::default());

        let handle = handler.register_timeout(
            CorrelationId::new(),
            Duration::from_millis(10),
            target.clone(),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(target.fired.load(Ordering::SeqCst), 1);

        // After firing, and twice over
        handler.cancel_timeout(&handle);
        handler.cancel_timeout(&handle);

        assert_eq!(handler.active_count(), 0);
        assert_eq!(target.fired.load(Ordering::SeqCst), 1);
    }
}
