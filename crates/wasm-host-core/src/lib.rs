//! Wasmtime engine, invocation, and resource limiting for wasm-host.
//!
//! This crate provides the execution side of the host:
//! - [`WasmEngine`]: Configured Wasmtime engine with fuel metering
//! - [`CompiledModule`]: Compiled WebAssembly module wrapper
//! - [`InvocationContext`]: Per-invocation store state
//! - [`InstanceRunner`]: Instantiate a module and call one export
//! - [`RuntimeEngine`]: The engine contract the rest of the host depends on
//! - [`ResourceLimiter`]: Fuel budget plus wall-clock deadline per invocation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   ResourceLimiter                       │
//! │  - Allocates the fuel budget (FuelGauge)                │
//! │  - Races the invocation against the deadline            │
//! │  - Classifies traps: OutOfFuel before Trapped           │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          dyn RuntimeEngine (WasmtimeRuntime)            │
//! │  - load_component: bytes -> ComponentHandle             │
//! │  - invoke: fresh Store, fuel, memory cap, call export   │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │        Store<InvocationContext> + Instance              │
//! │  (Per-invocation, isolated)                             │
//! │  - Fuel metering with async yielding                    │
//! │  - Linear memory capped by max_memory_bytes             │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod instance;
pub mod limiter;
pub mod module;
pub mod runtime;
pub mod store;

pub use engine::WasmEngine;
pub use instance::InstanceRunner;
pub use limiter::{FuelMetrics, ResourceLimiter};
pub use module::CompiledModule;
pub use runtime::{
    ComponentHandle, ComponentOutput, FuelGauge, InvokeError, Invocation, RuntimeEngine, Trap,
    Value, WasmtimeRuntime,
};
pub use store::InvocationContext;
