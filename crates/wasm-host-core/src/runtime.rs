//! The engine contract consumed by the rest of the host.
//!
//! The coordination layer never touches Wasmtime directly. It loads modules
//! and invokes exports through [`RuntimeEngine`], which keeps the limiter and
//! the actor layer testable against scripted engines.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use wasmtime::Val;

use crate::store::InvocationContext;
use crate::{CompiledModule, InstanceRunner, WasmEngine};
use wasm_host_common::{ComponentId, EngineConfig, RuntimeError};

/// A numeric WebAssembly value passed to or returned from an export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
}

impl From<Value> for Val {
    fn from(value: Value) -> Self {
        match value {
            Value::I32(v) => Val::I32(v),
            Value::I64(v) => Val::I64(v),
            Value::F32(v) => Val::F32(v.to_bits()),
            Value::F64(v) => Val::F64(v.to_bits()),
        }
    }
}

impl TryFrom<&Val> for Value {
    type Error = RuntimeError;

    fn try_from(val: &Val) -> Result<Self, Self::Error> {
        match val {
            Val::I32(v) => Ok(Value::I32(*v)),
            Val::I64(v) => Ok(Value::I64(*v)),
            Val::F32(bits) => Ok(Value::F32(f32::from_bits(*bits))),
            Val::F64(bits) => Ok(Value::F64(f64::from_bits(*bits))),
            other => Err(RuntimeError::invalid_config(format!(
                "Unsupported result value: {other:?}"
            ))),
        }
    }
}

/// Values returned by a successful invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentOutput {
    /// Results in declaration order.
    pub values: Vec<Value>,
}

impl ComponentOutput {
    /// Create an output from result values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// The first result, if it is an `i32`.
    pub fn as_i32(&self) -> Option<i32> {
        match self.values.first() {
            Some(Value::I32(v)) => Some(*v),
            _ => None,
        }
    }
}

/// A loaded component, ready to be invoked.
#[derive(Debug, Clone)]
pub struct ComponentHandle {
    component_id: ComponentId,
    module: Arc<CompiledModule>,
}

impl ComponentHandle {
    /// Create a handle for a compiled module.
    pub fn new(component_id: ComponentId, module: CompiledModule) -> Self {
        Self {
            component_id,
            module: Arc::new(module),
        }
    }

    /// The component this handle was loaded for.
    pub fn component_id(&self) -> &ComponentId {
        &self.component_id
    }

    /// The compiled module.
    pub fn module(&self) -> &CompiledModule {
        &self.module
    }

    /// Check whether the component exports `function`.
    pub fn has_export(&self, function: &str) -> bool {
        self.module.exports_function(function)
    }
}

/// Fuel budget shared between the limiter and the engine for one invocation.
///
/// The engine records consumption when the call returns. If the call is
/// abandoned at a deadline, nothing is recorded and [`consumed`](Self::consumed)
/// returns `None`.
#[derive(Debug)]
pub struct FuelGauge {
    max_fuel: u64,
    consumed: AtomicU64,
    recorded: AtomicBool,
}

impl FuelGauge {
    /// Create a gauge with the given budget.
    pub fn new(max_fuel: u64) -> Self {
        Self {
            max_fuel,
            consumed: AtomicU64::new(0),
            recorded: AtomicBool::new(false),
        }
    }

    /// The budget.
    pub fn max_fuel(&self) -> u64 {
        self.max_fuel
    }

    /// Record consumption.
    pub fn record(&self, consumed: u64) {
        self.consumed.store(consumed, Ordering::Release);
        self.recorded.store(true, Ordering::Release);
    }

    /// Consumption, if the engine has reported it.
    pub fn consumed(&self) -> Option<u64> {
        self.recorded
            .load(Ordering::Acquire)
            .then(|| self.consumed.load(Ordering::Acquire))
    }
}

/// A guest trap, with the fuel consumed up to the trap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trap {
    /// Trap description.
    pub reason: String,
    /// Fuel consumed before the trap.
    pub fuel_consumed: u64,
}

/// Why an invocation did not produce output.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The guest trapped.
    #[error("Wasm trap: {}", .0.reason)]
    Trap(Trap),

    /// The invocation could not be prepared.
    #[error(transparent)]
    Setup(#[from] RuntimeError),
}

/// One call into a loaded component.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// The component to call into.
    pub handle: &'a ComponentHandle,
    /// Export name.
    pub function: &'a str,
    /// Arguments in declaration order.
    pub args: &'a [Value],
    /// Cap on any single linear memory.
    pub max_memory_bytes: u64,
    /// Route guest stdout/stderr to the host's.
    pub inherit_stdio: bool,
}

/// The engine contract.
///
/// Implementations must expose consumed fuel alongside every trap so callers
/// can tell fuel exhaustion apart from other faults.
#[async_trait]
pub trait RuntimeEngine: Send + Sync + 'static {
    /// Compile `bytes` (binary or WAT) into an invocable handle.
    async fn load_component(
        &self,
        component_id: &ComponentId,
        bytes: &[u8],
    ) -> Result<ComponentHandle, RuntimeError>;

    /// Run one export with the budget held by `gauge`.
    ///
    /// Consumption is recorded into `gauge` when the call returns.
    async fn invoke(
        &self,
        invocation: Invocation<'_>,
        gauge: Arc<FuelGauge>,
    ) -> Result<ComponentOutput, InvokeError>;
}

/// [`RuntimeEngine`] backed by Wasmtime.
#[derive(Debug, Clone)]
pub struct WasmtimeRuntime {
    runner: Arc<InstanceRunner>,
}

impl WasmtimeRuntime {
    /// Bootstrap the Wasmtime engine.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::EngineInitialization`] if the engine or the
    /// WASI linker cannot be created.
    pub fn new(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let engine = WasmEngine::new(config)?;
        let runner = InstanceRunner::new(engine)?;
        Ok(Self {
            runner: Arc::new(runner),
        })
    }

    /// The underlying engine.
    pub fn engine(&self) -> &WasmEngine {
        self.runner.engine()
    }
}

#[async_trait]
impl RuntimeEngine for WasmtimeRuntime {
    async fn load_component(
        &self,
        component_id: &ComponentId,
        bytes: &[u8],
    ) -> Result<ComponentHandle, RuntimeError> {
        let module = CompiledModule::from_source(self.engine().inner(), bytes)?;
        Ok(ComponentHandle::new(component_id.clone(), module))
    }

    async fn invoke(
        &self,
        invocation: Invocation<'_>,
        gauge: Arc<FuelGauge>,
    ) -> Result<ComponentOutput, InvokeError> {
        let context = InvocationContext::new(
            invocation.handle.component_id().clone(),
            invocation.max_memory_bytes,
            invocation.inherit_stdio,
        );
        let args: Vec<Val> = invocation.args.iter().copied().map(Val::from).collect();

        let results = self
            .runner
            .call(
                invocation.handle.module(),
                context,
                invocation.function,
                &args,
                &gauge,
            )
            .await?;

        let values = results
            .iter()
            .map(Value::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ComponentOutput::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ECHO_WAT: &str = r#"
        (module
            (func (export "double") (param i64) (result i64)
                local.get 0
                i64.const 2
                i64.mul)
            (func (export "half") (param f64) (result f64)
                local.get 0
                f64.const 0.5
                f64.mul)
            (func (export "init"))
        )
    "#;

    #[test]
    fn test_value_conversion() {
        let val: Val = Value::F32(1.5).into();
        assert_eq!(Value::try_from(&val).unwrap(), Value::F32(1.5));

        let val: Val = Value::I64(-7).into();
        assert_eq!(Value::try_from(&val).unwrap(), Value::I64(-7));
    }

    #[test]
    fn test_output_as_i32() {
        assert_eq!(ComponentOutput::new(vec![Value::I32(4)]).as_i32(), Some(4));
        assert_eq!(ComponentOutput::new(vec![Value::I64(4)]).as_i32(), None);
        assert_eq!(ComponentOutput::default().as_i32(), None);
    }

    #[test]
    fn test_fuel_gauge() {
        let gauge = FuelGauge::new(100);
        assert_eq!(gauge.max_fuel(), 100);
        assert_eq!(gauge.consumed(), None);

        gauge.record(42);
        assert_eq!(gauge.consumed(), Some(42));
    }

    #[tokio::test]
    async fn test_load_and_invoke() {
        let runtime = WasmtimeRuntime::new(&EngineConfig::default()).unwrap();
        let id = ComponentId::new("math");

        let handle = runtime
            .load_component(&id, ECHO_WAT.as_bytes())
            .await
            .unwrap();
        assert!(handle.has_export("init"));
        assert!(!handle.has_export("cleanup"));
        assert_eq!(handle.component_id(), &id);

        let gauge = Arc::new(FuelGauge::new(10_000));
        let output = runtime
            .invoke(
                Invocation {
                    handle: &handle,
                    function: "double",
                    args: &[Value::I64(21)],
                    max_memory_bytes: 1024 * 1024,
                    inherit_stdio: false,
                },
                Arc::clone(&gauge),
            )
            .await
            .unwrap();

        assert_eq!(output.values, vec![Value::I64(42)]);
        assert!(gauge.consumed().is_some());

        let output = runtime
            .invoke(
                Invocation {
                    handle: &handle,
                    function: "half",
                    args: &[Value::F64(3.0)],
                    max_memory_bytes: 1024 * 1024,
                    inherit_stdio: false,
                },
                Arc::new(FuelGauge::new(10_000)),
            )
            .await
            .unwrap();

        assert_eq!(output.values, vec![Value::F64(1.5)]);
    }

    #[tokio::test]
    async fn test_load_invalid_bytes() {
        let runtime = WasmtimeRuntime::new(&EngineConfig::default()).unwrap();

        let err = runtime
            .load_component(&ComponentId::new("bad"), b"(module (func")
            .await
            .unwrap_err();

        assert!(matches!(err, RuntimeError::CompilationFailed { .. }));
    }
}
