//! Host system coordination for wasm-host.
//!
//! [`HostSystemManager`] owns every subsystem and is the only entry point a
//! host application needs:
//!
//! ```text
//! CorrelationTracker ─┐
//! TimeoutHandler ─────┼──► MessagingService ─┐
//! MessageRouter ──────┘                      │
//! RuntimeEngine ──► ResourceLimiter ─────────┼──► ComponentSpawner
//! ComponentRegistry ─────────────────────────┘
//! ```
//!
//! Leaves are built first and handed down by constructor, so no subsystem
//! reaches back into the manager.

pub mod manager;

pub use manager::HostSystemManager;

// Re-exported so host applications can depend on this crate alone.
pub use wasm_host_actor::{ComponentAddress, WasmSource};
pub use wasm_host_common::{
    CapabilitySet, ComponentId, ComponentMetadata, ComponentStatus, HostConfig, HostError,
};
pub use wasm_host_core::{ComponentOutput, FuelMetrics, Value};
