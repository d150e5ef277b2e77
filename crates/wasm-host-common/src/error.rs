//! Error types for wasm-host.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`RuntimeError`]: Engine, compilation, and store setup failures
//! - [`LimitError`]: Per-invocation fuel/timeout/trap outcomes
//! - [`RegistryError`], [`SpawnError`]: Component membership failures
//! - [`TrackerError`], [`MessagingError`], [`RequestError`]: Messaging failures
//! - [`TransportError`]: Actor mailbox and termination failures
//! - [`HostError`]: Everything surfaced by the host system manager

use std::io;

use thiserror::Error;

/// Engine-level errors.
///
/// These errors represent failures that happen before a guest function runs:
/// engine bootstrap, compilation, and store preparation.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The Wasmtime engine could not be created.
    #[error("Engine initialization failed: {reason}")]
    EngineInitialization {
        /// Description of the bootstrap failure.
        reason: String,
    },

    /// WebAssembly compilation or instantiation failed.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// The requested export does not exist or has the wrong type.
    #[error("Function not found: {function}")]
    FunctionNotFound {
        /// Name of the missing export.
        function: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RuntimeError {
    /// Create a new `EngineInitialization` error.
    pub fn engine_initialization(reason: impl Into<String>) -> Self {
        Self::EngineInitialization {
            reason: reason.into(),
        }
    }

    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `FunctionNotFound` error.
    pub fn function_not_found(function: impl Into<String>) -> Self {
        Self::FunctionNotFound {
            function: function.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Outcome of a limited invocation that did not succeed.
///
/// Fuel and timeout variants carry enough numbers to tune a component's
/// metadata after the fact.
#[derive(Error, Debug)]
pub enum LimitError {
    /// The invocation consumed its whole fuel budget.
    #[error("Out of fuel: consumed {consumed} of {max_fuel} ({usage_pct:.1}%)")]
    OutOfFuel {
        /// Fuel budget allocated for the invocation.
        max_fuel: u64,
        /// Fuel consumed before the trap.
        consumed: u64,
        /// Consumption as a percentage of the budget.
        usage_pct: f64,
    },

    /// The wall-clock deadline fired before the invocation finished.
    #[error("Execution timeout after {timeout_ms}ms")]
    ExecutionTimeout {
        /// The deadline in milliseconds.
        timeout_ms: u64,
        /// Fuel consumed when the deadline fired, if the engine reported it.
        fuel_consumed: Option<u64>,
    },

    /// The guest trapped for a reason other than fuel exhaustion.
    #[error("Wasm trap: {reason}")]
    Trapped {
        /// Description of the trap.
        reason: String,
    },

    /// The invocation could not be prepared.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl LimitError {
    /// Returns `true` for fuel exhaustion and deadline expiry.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::OutOfFuel { .. } | Self::ExecutionTimeout { .. })
    }
}

/// Component registry errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No component is registered under the id.
    #[error("Component not found: {component_id}")]
    ComponentNotFound {
        /// The id that was looked up.
        component_id: String,
    },

    /// A component is already registered under the id.
    #[error("Component already registered: {component_id}")]
    AlreadyRegistered {
        /// The id that collided.
        component_id: String,
    },
}

/// Why a spawn failed.
#[derive(Error, Debug)]
pub enum SpawnErrorKind {
    /// The id is already registered; spawns never overwrite.
    #[error("component already exists")]
    AlreadyExists,

    /// The module could not be read or compiled.
    #[error("load failed: {0}")]
    LoadFailed(#[source] RuntimeError),

    /// The actor could not be started.
    #[error("actor failed: {0}")]
    ActorFailed(String),
}

/// A spawn failure, tagged with the component it concerned.
#[derive(Error, Debug)]
#[error("Failed to spawn component {component_id}: {kind}")]
pub struct SpawnError {
    /// The component that failed to spawn.
    pub component_id: String,
    /// Root cause.
    #[source]
    pub kind: SpawnErrorKind,
}

impl SpawnError {
    /// Create a spawn error for a component.
    pub fn new(component_id: impl Into<String>, kind: SpawnErrorKind) -> Self {
        Self {
            component_id: component_id.into(),
            kind,
        }
    }

    /// Returns `true` if the id was already registered.
    pub fn is_already_exists(&self) -> bool {
        matches!(self.kind, SpawnErrorKind::AlreadyExists)
    }
}

/// Correlation tracker errors.
///
/// `NotFound` is the expected result for whichever of response or timeout
/// loses the race for a correlation id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// A pending request with this correlation id already exists.
    #[error("Duplicate correlation ID: {0}")]
    DuplicateCorrelationId(String),

    /// No pending request exists for this correlation id.
    #[error("Correlation ID not found: {0}")]
    NotFound(String),
}

/// Failure delivered to a request waiter instead of a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No response arrived before the request deadline.
    #[error("request timed out")]
    Timeout,

    /// The request was cancelled because a participant stopped.
    #[error("request cancelled")]
    Cancelled,

    /// The target component is not reachable.
    #[error("target component not found: {0}")]
    TargetNotFound(String),

    /// The target failed while handling the request.
    #[error("processing failed: {0}")]
    ProcessingFailed(String),
}

/// Messaging service errors.
#[derive(Error, Debug)]
pub enum MessagingError {
    /// No route exists for the target component.
    #[error("Target component not found: {0}")]
    TargetNotFound(String),

    /// The target's mailbox rejected the message.
    #[error("Message delivery failed: {0}")]
    DeliveryFailed(String),

    /// Correlation bookkeeping failed.
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Actor transport errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The actor's mailbox is closed; the actor has terminated.
    #[error("Mailbox closed for actor {0}")]
    MailboxClosed(String),

    /// The actor did not finish starting.
    #[error("Actor {actor} failed to start: {reason}")]
    StartFailed {
        /// Actor name.
        actor: String,
        /// Description of the failure.
        reason: String,
    },

    /// The actor terminated with an error while stopping.
    #[error("Actor {actor} failed to stop: {reason}")]
    StopFailed {
        /// Actor name.
        actor: String,
        /// Description of the failure.
        reason: String,
    },
}

/// Errors surfaced by the host system manager.
///
/// Every subsystem error is wrapped here with the operation and component it
/// concerned.
#[derive(Error, Debug)]
pub enum HostError {
    /// The manager is not started, or the engine could not be created.
    #[error("Initialization failed: {reason}")]
    InitializationFailed {
        /// Description of the failure.
        reason: String,
    },

    /// No component is registered under the id.
    #[error("Component not found: {component_id}")]
    ComponentNotFound {
        /// The id that was looked up.
        component_id: String,
    },

    /// Spawning a component failed.
    #[error(transparent)]
    ComponentSpawnFailed(#[from] SpawnError),

    /// An invocation exhausted its fuel.
    #[error("Component {component_id} ran out of fuel: consumed {consumed} of {max_fuel} ({usage_pct:.1}%)")]
    OutOfFuel {
        /// Component that ran the invocation.
        component_id: String,
        /// Fuel budget.
        max_fuel: u64,
        /// Fuel consumed.
        consumed: u64,
        /// Consumption percentage.
        usage_pct: f64,
    },

    /// An invocation exceeded its wall-clock deadline.
    #[error("Component {component_id} execution timeout after {timeout_ms}ms")]
    ExecutionTimeout {
        /// Component that ran the invocation.
        component_id: String,
        /// The deadline in milliseconds.
        timeout_ms: u64,
        /// Fuel consumed when the deadline fired, if known.
        fuel_consumed: Option<u64>,
    },

    /// An invocation trapped.
    #[error("Component {component_id} trapped: {reason}")]
    Trapped {
        /// Component that ran the invocation.
        component_id: String,
        /// Trap description.
        reason: String,
    },

    /// A bounded lifecycle operation did not finish in time.
    #[error("{operation} of component {component_id} timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out (e.g. `stop`).
        operation: &'static str,
        /// Component concerned.
        component_id: String,
        /// The bound in milliseconds.
        timeout_ms: u64,
    },

    /// Messaging failed.
    #[error("Messaging error for component {component_id}: {source}")]
    Messaging {
        /// Component concerned.
        component_id: String,
        /// Root cause.
        #[source]
        source: MessagingError,
    },

    /// Any other failure, with context.
    #[error("Internal error: {reason}")]
    Internal {
        /// Description of the failure.
        reason: String,
    },
}

impl HostError {
    /// Create a new `InitializationFailed` error.
    pub fn initialization_failed(reason: impl Into<String>) -> Self {
        Self::InitializationFailed {
            reason: reason.into(),
        }
    }

    /// Error returned by every operation while the manager is not started.
    pub fn not_started() -> Self {
        Self::initialization_failed("HostSystemManager not started")
    }

    /// Create a new `ComponentNotFound` error.
    pub fn component_not_found(component_id: impl Into<String>) -> Self {
        Self::ComponentNotFound {
            component_id: component_id.into(),
        }
    }

    /// Create a new `Internal` error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Wrap a per-invocation failure with the component it concerned.
    pub fn from_limit(component_id: impl Into<String>, error: LimitError) -> Self {
        let component_id = component_id.into();
        match error {
            LimitError::OutOfFuel {
                max_fuel,
                consumed,
                usage_pct,
            } => Self::OutOfFuel {
                component_id,
                max_fuel,
                consumed,
                usage_pct,
            },
            LimitError::ExecutionTimeout {
                timeout_ms,
                fuel_consumed,
            } => Self::ExecutionTimeout {
                component_id,
                timeout_ms,
                fuel_consumed,
            },
            LimitError::Trapped { reason } => Self::Trapped {
                component_id,
                reason,
            },
            LimitError::Runtime(e) => Self::Internal {
                reason: format!("invocation setup failed for {component_id}: {e}"),
            },
        }
    }

    /// Returns `true` if this error indicates the component was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ComponentNotFound { .. })
    }

    /// Returns `true` if the manager was not started or failed to start.
    pub fn is_not_started(&self) -> bool {
        matches!(self, Self::InitializationFailed { .. })
    }

    /// Returns `true` if this error indicates a resource limit was exceeded.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            Self::OutOfFuel { .. } | Self::ExecutionTimeout { .. } | Self::Timeout { .. }
        )
    }
}
