//! Actors, registry, and spawning for wasm-host.
//!
//! This crate provides:
//! - [`Actor`], [`ActorSystem`], [`ActorAddress`]: Tokio mailbox transport
//! - [`ComponentActor`]: Runs one component's exports under its limits
//! - [`ComponentRegistry`]: Component id to address lookup
//! - [`ComponentSpawner`]: Source to registered, routable actor

pub mod actor;
pub mod component_actor;
pub mod registry;
pub mod spawner;
pub mod system;

pub use actor::Actor;
pub use component_actor::{
    CLEANUP_EXPORT, ComponentActor, ComponentAddress, HANDLE_MESSAGE_EXPORT,
    HANDLE_REQUEST_EXPORT, INIT_EXPORT, InvokeOutcome,
};
pub use registry::ComponentRegistry;
pub use spawner::{ComponentSpawner, WasmSource};
pub use system::{ActorAddress, ActorSystem};
