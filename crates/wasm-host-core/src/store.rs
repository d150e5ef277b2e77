//! Per-invocation store state.
//!
//! This module provides:
//! - [`InvocationContext`]: WASI context and memory limits for one invocation
//! - [`create_store`]: A fuel-loaded, memory-capped store
//! - [`fuel_consumed`]: Fuel accounting after a call returns

use wasmtime::{Store, StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::preview1::WasiP1Ctx;

use crate::WasmEngine;
use wasm_host_common::{ComponentId, RuntimeError};

/// Per-invocation execution context.
///
/// Created for each call into a guest and dropped when the call ends, so no
/// guest state survives between invocations.
///
/// # Contents
///
/// - `wasi`: WASI preview1 context; stdio is inherited only when granted
/// - `limits`: Linear memory cap enforced by the store limiter
/// - `component_id`: Owning component, for tracing
pub struct InvocationContext {
    wasi: WasiP1Ctx,

    limits: StoreLimits,

    /// Component the invocation belongs to.
    pub component_id: ComponentId,
}

impl InvocationContext {
    /// Create a new context.
    ///
    /// # Arguments
    ///
    /// * `component_id` - Owning component
    /// * `max_memory_bytes` - Upper bound for any single linear memory
    /// * `inherit_stdio` - Whether guest stdout/stderr reach the host's
    pub fn new(component_id: ComponentId, max_memory_bytes: u64, inherit_stdio: bool) -> Self {
        let mut builder = WasiCtxBuilder::new();
        if inherit_stdio {
            builder.inherit_stdout().inherit_stderr();
        }

        let limits = StoreLimitsBuilder::new()
            .memory_size(usize::try_from(max_memory_bytes).unwrap_or(usize::MAX))
            .instances(1)
            .build();

        Self {
            wasi: builder.build_p1(),
            limits,
            component_id,
        }
    }

    /// WASI context accessor used by the linker.
    pub fn wasi_mut(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("component_id", &self.component_id)
            .finish_non_exhaustive()
    }
}

/// Create a new store loaded with `max_fuel` and capped at the context's
/// memory limit.
///
/// # Errors
///
/// Returns an error if fuel cannot be configured on the store.
pub fn create_store(
    engine: &WasmEngine,
    context: InvocationContext,
    max_fuel: u64,
) -> Result<Store<InvocationContext>, RuntimeError> {
    let mut store = Store::new(engine.inner(), context);

    store.limiter(|ctx| &mut ctx.limits);

    store
        .set_fuel(max_fuel)
        .map_err(|e| RuntimeError::invalid_config(format!("Failed to set fuel: {e}")))?;

    // Yielding lets a dropped future (deadline expiry) stop guest code that
    // never calls back into the host.
    store
        .fuel_async_yield_interval(Some(engine.config().fuel_yield_interval))
        .map_err(|e| RuntimeError::invalid_config(format!("Failed to set yield interval: {e}")))?;

    Ok(store)
}

/// Fuel consumed so far, given the initial budget.
pub fn fuel_consumed(initial_fuel: u64, store: &Store<InvocationContext>) -> u64 {
    let remaining = store.get_fuel().unwrap_or(0);
    initial_fuel.saturating_sub(remaining)
}
