//! WebAssembly instance lifecycle management.
//!
//! This module provides [`InstanceRunner`], which handles one complete call
//! into a guest:
//!
//! 1. Create a fresh fuel-loaded store
//! 2. Instantiate the module against the WASI linker
//! 3. Call the requested export
//! 4. Record fuel consumption and classify traps

use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use wasmtime::{Linker, Val};

use crate::store::{InvocationContext, create_store, fuel_consumed};
use crate::{CompiledModule, FuelGauge, InvokeError, Trap, WasmEngine};
use wasm_host_common::RuntimeError;

/// Instance lifecycle manager.
///
/// # Thread Safety
///
/// `InstanceRunner` is thread-safe and can be shared across tasks. Each call
/// uses its own store, so guests never observe each other's state.
pub struct InstanceRunner {
    engine: WasmEngine,
    linker: Linker<InvocationContext>,
}

impl InstanceRunner {
    /// Create a new instance runner with WASI preview1 linked in.
    ///
    /// # Errors
    ///
    /// Returns an error if the WASI imports cannot be added to the linker.
    pub fn new(engine: WasmEngine) -> Result<Self, RuntimeError> {
        let mut linker = Linker::new(engine.inner());

        wasmtime_wasi::preview1::add_to_linker_async(&mut linker, InvocationContext::wasi_mut)
            .map_err(|e| {
                RuntimeError::engine_initialization(format!("Failed to link WASI: {e}"))
            })?;

        Ok(Self { engine, linker })
    }

    /// Instantiate `module` and call `function` with `args`.
    ///
    /// Fuel consumption is written to `gauge` whether or not the call traps.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Setup`] if the store cannot be prepared, the
    /// module fails to instantiate, or the export does not exist, and
    /// [`InvokeError::Trap`] if the guest traps.
    #[instrument(skip_all, fields(component_id = %context.component_id, function = %function))]
    pub async fn call(
        &self,
        module: &CompiledModule,
        context: InvocationContext,
        function: &str,
        args: &[Val],
        gauge: &FuelGauge,
    ) -> Result<Vec<Val>, InvokeError> {
        let start = Instant::now();
        let max_fuel = gauge.max_fuel();

        let mut store = create_store(&self.engine, context, max_fuel)?;

        debug!("Instantiating module");

        let instance = match self.linker.instantiate_async(&mut store, module.inner()).await {
            Ok(instance) => instance,
            Err(e) => {
                let consumed = fuel_consumed(max_fuel, &store);
                gauge.record(consumed);

                // A start function can trap just like an export.
                if e.downcast_ref::<wasmtime::Trap>().is_some() {
                    return Err(InvokeError::Trap(Trap {
                        reason: extract_trap_message(&e),
                        fuel_consumed: consumed,
                    }));
                }
                return Err(RuntimeError::compilation_failed(format!(
                    "Instantiation failed: {e}"
                ))
                .into());
            }
        };

        let func = instance
            .get_func(&mut store, function)
            .ok_or_else(|| RuntimeError::function_not_found(function))?;

        let result_count = func.ty(&store).results().len();
        let mut results = vec![Val::I32(0); result_count];

        debug!("Calling export");

        let outcome = func.call_async(&mut store, args, &mut results).await;

        let consumed = fuel_consumed(max_fuel, &store);
        gauge.record(consumed);

        let duration = start.elapsed();

        match outcome {
            Ok(()) => {
                info!(
                    duration_ms = duration.as_millis(),
                    fuel_consumed = consumed,
                    "Invocation completed"
                );
                Ok(results)
            }
            Err(e) => {
                let reason = extract_trap_message(&e);

                warn!(
                    duration_ms = duration.as_millis(),
                    fuel_consumed = consumed,
                    out_of_fuel = is_out_of_fuel(&e),
                    trap_message = %reason,
                    "Invocation trapped"
                );

                Err(InvokeError::Trap(Trap {
                    reason,
                    fuel_consumed: consumed,
                }))
            }
        }
    }

    /// Get the engine this runner instantiates against.
    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }
}

impl std::fmt::Debug for InstanceRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRunner")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

/// Extract a human-readable trap message, preferring the trap code.
fn extract_trap_message(error: &wasmtime::Error) -> String {
    match error.downcast_ref::<wasmtime::Trap>() {
        Some(trap) => trap.to_string(),
        None => error.to_string(),
    }
}

/// Check if an error is due to fuel exhaustion.
fn is_out_of_fuel(error: &wasmtime::Error) -> bool {
    error
        .downcast_ref::<wasmtime::Trap>()
        .is_some_and(|trap| *trap == wasmtime::Trap::OutOfFuel)
}
