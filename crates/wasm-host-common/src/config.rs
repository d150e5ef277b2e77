//! Configuration structures for wasm-host.
//!
//! This module defines configuration options for the host subsystems:
//! - [`HostConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (pooling, yielding)
//! - [`MessagingConfig`]: Request defaults and mailbox sizing
//! - [`LifecycleConfig`]: Bounds on lifecycle operations
//!
//! Per-component limits are not configured here; they arrive with each spawn
//! as [`ComponentMetadata`](crate::ComponentMetadata).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HostConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Messaging configuration.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Lifecycle configuration.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Wasmtime engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable pooling allocator for high-performance instance creation.
    ///
    /// Pooling reserves virtual memory for every slot up front, so it is off
    /// by default.
    #[serde(default = "defaults::pooling_allocator")]
    pub pooling_allocator: bool,

    /// Maximum concurrent instances in the pool.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,

    /// Memory per instance slot in megabytes.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::instance_memory_mb")]
    pub instance_memory_mb: u32,

    /// Optimize generated code for speed.
    #[serde(default = "defaults::cranelift_opt")]
    pub cranelift_opt: bool,

    /// Fuel consumed between cooperative yields to the async executor.
    ///
    /// Guest code that never calls back into the host only observes the
    /// wall-clock deadline at these yield points.
    #[serde(default = "defaults::fuel_yield_interval")]
    pub fuel_yield_interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: defaults::pooling_allocator(),
            max_instances: defaults::max_instances(),
            instance_memory_mb: defaults::instance_memory_mb(),
            cranelift_opt: defaults::cranelift_opt(),
            fuel_yield_interval: defaults::fuel_yield_interval(),
        }
    }
}

/// Messaging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagingConfig {
    /// Timeout applied to requests issued without an explicit one.
    #[serde(default = "defaults::default_request_timeout_ms")]
    pub default_request_timeout_ms: u64,

    /// Capacity of each component's mailbox.
    #[serde(default = "defaults::mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            default_request_timeout_ms: defaults::default_request_timeout_ms(),
            mailbox_capacity: defaults::mailbox_capacity(),
        }
    }
}

impl MessagingConfig {
    /// Get the default request timeout as a `Duration`.
    pub fn default_request_timeout(&self) -> Duration {
        Duration::from_millis(self.default_request_timeout_ms)
    }
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LifecycleConfig {
    /// Upper bound on waiting for an actor to terminate during stop.
    #[serde(default = "defaults::stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: defaults::stop_timeout_ms(),
        }
    }
}

impl LifecycleConfig {
    /// Get the stop bound as a `Duration`.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn pooling_allocator() -> bool {
        false
    }

    pub const fn max_instances() -> u32 {
        1000
    }

    pub const fn instance_memory_mb() -> u32 {
        64
    }

    pub const fn cranelift_opt() -> bool {
        true
    }

    pub const fn fuel_yield_interval() -> u64 {
        10_000
    }

    pub const fn default_request_timeout_ms() -> u64 {
        5_000
    }

    pub const fn mailbox_capacity() -> usize {
        1_024
    }

    pub const fn stop_timeout_ms() -> u64 {
        5_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();

        assert!(!config.engine.pooling_allocator);
        assert_eq!(config.engine.max_instances, 1000);
        assert_eq!(config.engine.instance_memory_mb, 64);
        assert_eq!(config.engine.fuel_yield_interval, 10_000);

        assert_eq!(config.messaging.default_request_timeout_ms, 5_000);
        assert_eq!(config.messaging.mailbox_capacity, 1_024);
        assert_eq!(config.lifecycle.stop_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_serialization() {
        let config = HostConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: HostConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(
            config.engine.max_instances,
            deserialized.engine.max_instances
        );
        assert_eq!(
            config.lifecycle.stop_timeout_ms,
            deserialized.lifecycle.stop_timeout_ms
        );
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"lifecycle": {"stop_timeout_ms": 250}}"#;
        let config: HostConfig = serde_json::from_str(json).unwrap();

        // Explicitly set value
        assert_eq!(config.lifecycle.stop_timeout_ms, 250);
        // Default values for unspecified fields
        assert_eq!(config.messaging.mailbox_capacity, 1_024);
        assert!(config.engine.cranelift_opt);
    }

    #[test]
    fn test_request_timeout() {
        let config = MessagingConfig {
            default_request_timeout_ms: 500,
            ..Default::default()
        };

        assert_eq!(config.default_request_timeout(), Duration::from_millis(500));
    }
}
