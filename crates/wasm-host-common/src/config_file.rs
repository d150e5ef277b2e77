//! Configuration file structures for wasm-host.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ComponentEntry`]: A component to spawn at startup

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CapabilitySet, ComponentId, ComponentMetadata, HostConfig};

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [host.engine]
/// fuel_yield_interval = 10_000
///
/// [host.lifecycle]
/// stop_timeout_ms = 5000
///
/// [[components]]
/// id = "echo"
/// path = "./components/echo.wasm"
/// capabilities = ["wasi:stdio"]
///
/// [components.metadata]
/// max_memory_bytes = 16_777_216
/// max_fuel = 1_000_000
/// timeout_ms = 100
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Host configuration.
    #[serde(default)]
    pub host: HostConfig,

    /// Components to spawn at startup.
    #[serde(default)]
    pub components: Vec<ComponentEntry>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// A component to spawn at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComponentEntry {
    /// Component identifier.
    pub id: ComponentId,

    /// Path to the WebAssembly module file.
    pub path: String,

    /// Capabilities granted to the component.
    #[serde(default)]
    pub capabilities: CapabilitySet,

    /// Declared resource profile.
    pub metadata: ComponentMetadata,
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}
