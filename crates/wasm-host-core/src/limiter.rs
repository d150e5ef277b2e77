//! Fuel and wall-clock limits around one invocation.
//!
//! [`ResourceLimiter`] allocates a fuel budget, races the call against a
//! deadline, and turns whatever happened into either output plus
//! [`FuelMetrics`] or a [`LimitError`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{ComponentOutput, FuelGauge, InvokeError, Invocation, RuntimeEngine};
use wasm_host_common::LimitError;

/// Fuel consumption for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuelMetrics {
    /// Budget allocated.
    pub max_fuel: u64,
    /// Fuel consumed.
    pub consumed: u64,
}

impl FuelMetrics {
    /// Create a snapshot.
    pub fn new(max_fuel: u64, consumed: u64) -> Self {
        Self { max_fuel, consumed }
    }

    /// Consumption as a percentage of the budget, in `[0, 100]`.
    ///
    /// A zero budget reports `0`.
    #[allow(clippy::cast_precision_loss)]
    pub fn usage_pct(&self) -> f64 {
        if self.max_fuel == 0 {
            return 0.0;
        }
        (self.consumed as f64 / self.max_fuel as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Fuel left over. Never underflows.
    pub fn remaining(&self) -> u64 {
        self.max_fuel.saturating_sub(self.consumed)
    }

    /// Whether the whole budget was used.
    pub fn is_exhausted(&self) -> bool {
        self.consumed >= self.max_fuel
    }
}

/// Runs invocations under a fuel budget and a deadline.
///
/// # Example
///
/// ```ignore
/// let limiter = ResourceLimiter::new(Arc::new(WasmtimeRuntime::new(&config)?));
/// let (output, metrics) = limiter
///     .execute_with_limits(invocation, 1_000_000, Duration::from_millis(100))
///     .await?;
/// ```
#[derive(Clone)]
pub struct ResourceLimiter {
    engine: Arc<dyn RuntimeEngine>,
}

impl ResourceLimiter {
    /// Create a limiter over an engine.
    pub fn new(engine: Arc<dyn RuntimeEngine>) -> Self {
        Self { engine }
    }

    /// The engine invocations run on.
    pub fn engine(&self) -> &Arc<dyn RuntimeEngine> {
        &self.engine
    }

    /// Run `invocation` with `max_fuel` and a `timeout` deadline.
    ///
    /// # Errors
    ///
    /// - [`LimitError::ExecutionTimeout`] if the deadline fires first
    /// - [`LimitError::OutOfFuel`] if the guest trapped having used its whole budget
    /// - [`LimitError::Trapped`] for any other trap
    /// - [`LimitError::Runtime`] if the invocation could not be prepared
    #[instrument(
        skip(self, invocation),
        fields(
            invocation_id = %Uuid::new_v4(),
            component_id = %invocation.handle.component_id(),
            function = %invocation.function,
        )
    )]
    pub async fn execute_with_limits(
        &self,
        invocation: Invocation<'_>,
        max_fuel: u64,
        timeout: Duration,
    ) -> Result<(ComponentOutput, FuelMetrics), LimitError> {
        let start = Instant::now();
        let gauge = Arc::new(FuelGauge::new(max_fuel));

        let call = self.engine.invoke(invocation, Arc::clone(&gauge));

        let Ok(result) = tokio::time::timeout(timeout, call).await else {
            let fuel_consumed = gauge.consumed();
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

            warn!(timeout_ms, ?fuel_consumed, "Invocation deadline expired");

            return Err(LimitError::ExecutionTimeout {
                timeout_ms,
                fuel_consumed,
            });
        };

        match result {
            Ok(output) => {
                let metrics = FuelMetrics::new(max_fuel, gauge.consumed().unwrap_or(0));

                debug!(
                    duration_ms = start.elapsed().as_millis(),
                    consumed = metrics.consumed,
                    usage_pct = metrics.usage_pct(),
                    "Invocation within limits"
                );

                Ok((output, metrics))
            }
            Err(InvokeError::Trap(trap)) => {
                let metrics = FuelMetrics::new(max_fuel, trap.fuel_consumed);

                // Consumption decides, whatever the trap text says.
                if metrics.is_exhausted() {
                    warn!(
                        max_fuel,
                        consumed = metrics.consumed,
                        "Invocation exhausted its fuel"
                    );
                    return Err(LimitError::OutOfFuel {
                        max_fuel,
                        consumed: metrics.consumed,
                        usage_pct: metrics.usage_pct(),
                    });
                }

                Err(LimitError::Trapped {
                    reason: trap.reason,
                })
            }
            Err(InvokeError::Setup(e)) => Err(LimitError::Runtime(e)),
        }
    }
}

impl std::fmt::Debug for ResourceLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLimiter").finish_non_exhaustive()
    }
}
