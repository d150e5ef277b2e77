//! Common types, errors, and configuration for wasm-host.
//!
//! This crate provides shared functionality used across the wasm-host workspace:
//! - Error types using `thiserror` for every subsystem boundary
//! - Configuration structures for the engine, messaging, and lifecycle
//! - Component identity, metadata, capability, and status types

pub mod component;
pub mod config;
pub mod config_file;
pub mod error;

pub use component::{Capability, CapabilitySet, ComponentId, ComponentMetadata, ComponentStatus};
pub use config::{EngineConfig, HostConfig, LifecycleConfig, MessagingConfig};
pub use config_file::{ComponentEntry, ConfigFile, ConfigFileError};
pub use error::{
    HostError, LimitError, MessagingError, RegistryError, RequestError, RuntimeError, SpawnError,
    SpawnErrorKind, TrackerError, TransportError,
};
