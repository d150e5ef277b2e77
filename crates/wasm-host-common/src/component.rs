//! Component identity and declared profile.
//!
//! - [`ComponentId`]: Stable caller-chosen identity of a component
//! - [`ComponentMetadata`]: Declared resource profile (memory, fuel, timeout)
//! - [`CapabilitySet`]: Capabilities granted to a component at spawn
//! - [`ComponentStatus`]: Coarse health signal

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable identity of a component.
///
/// The identifier is opaque to the host; callers choose it at spawn time and
/// use it for every subsequent lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// Create a new component identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Declared resource profile of a component.
///
/// `max_memory_bytes` has no default: a component must state how much linear
/// memory it needs. Fuel and timeout fall back to defaults suited to short
/// message handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    /// Human-readable name.
    #[serde(default)]
    pub name: Option<String>,

    /// Component version string.
    #[serde(default)]
    pub version: Option<String>,

    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,

    /// Maximum linear memory in bytes.
    pub max_memory_bytes: u64,

    /// Fuel budget per invocation.
    ///
    /// 1,000,000 fuel is roughly 10-50ms of guest execution.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Wall-clock limit per invocation in milliseconds.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,
}

impl ComponentMetadata {
    /// Create metadata with the mandatory memory limit and default fuel/timeout.
    pub fn new(max_memory_bytes: u64) -> Self {
        Self {
            name: None,
            version: None,
            description: None,
            max_memory_bytes,
            max_fuel: defaults::max_fuel(),
            timeout_ms: defaults::timeout_ms(),
        }
    }

    /// Set the fuel budget.
    #[must_use]
    pub fn with_max_fuel(mut self, max_fuel: u64) -> Self {
        self.max_fuel = max_fuel;
        self
    }

    /// Set the wall-clock limit in milliseconds.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Get the timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// A single granted capability, e.g. `wasi:stdio` or `messaging:send`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    /// Guest may write to the host's stdout/stderr.
    pub const WASI_STDIO: &'static str = "wasi:stdio";

    /// Create a capability from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Capability name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set of capabilities granted to a component.
///
/// Policy evaluation happens outside the host; the set is carried into the
/// component's actor as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// Create an empty capability set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a capability.
    pub fn grant(&mut self, capability: impl Into<String>) {
        self.capabilities.insert(Capability::new(capability));
    }

    /// Builder-style grant.
    #[must_use]
    pub fn with(mut self, capability: impl Into<String>) -> Self {
        self.grant(capability);
        self
    }

    /// Check whether a capability was granted.
    pub fn has(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c.as_str() == capability)
    }

    /// Iterate over granted capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    /// Number of granted capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Returns `true` if nothing was granted.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for capability in iter {
            set.grant(capability);
        }
        set
    }
}

/// Coarse health signal of a component.
///
/// The host only distinguishes registered components from absent ones, so
/// status queries return [`ComponentStatus::Running`] for every registered id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentStatus {
    /// Registered but not yet processing messages.
    Registered,
    /// Actor is alive and registered.
    Running,
    /// Actor has terminated.
    Stopped,
    /// Actor failed with the given reason.
    Error(String),
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentStatus::Registered => write!(f, "registered"),
            ComponentStatus::Running => write!(f, "running"),
            ComponentStatus::Stopped => write!(f, "stopped"),
            ComponentStatus::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn max_fuel() -> u64 {
        1_000_000
    }

    pub const fn timeout_ms() -> u64 {
        100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id_display() {
        let id = ComponentId::new("billing");
        assert_eq!(id.to_string(), "billing");
        assert_eq!(id.as_str(), "billing");
        assert_eq!(ComponentId::from("billing"), id);
    }

    #[test]
    fn test_metadata_defaults() {
        let metadata = ComponentMetadata::new(16 * 1024 * 1024);

        assert_eq!(metadata.max_fuel, 1_000_000);
        assert_eq!(metadata.timeout_ms, 100);
        assert_eq!(metadata.timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_metadata_requires_memory_limit() {
        let missing = serde_json::from_str::<ComponentMetadata>(r#"{"max_fuel": 10}"#);
        assert!(missing.is_err());

        let present: ComponentMetadata =
            serde_json::from_str(r#"{"max_memory_bytes": 1048576}"#).unwrap();
        assert_eq!(present.max_memory_bytes, 1_048_576);
        assert_eq!(present.max_fuel, 1_000_000);
        assert_eq!(present.timeout_ms, 100);
    }

    #[test]
    fn test_capability_set() {
        let caps: CapabilitySet = ["wasi:stdio", "messaging:send", "wasi:stdio"]
            .into_iter()
            .collect();

        assert_eq!(caps.len(), 2);
        assert!(caps.has(Capability::WASI_STDIO));
        assert!(!caps.has("http:outbound"));
        assert!(CapabilitySet::new().is_empty());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ComponentStatus::Running.to_string(), "running");
        assert_eq!(
            ComponentStatus::Error("trap".into()).to_string(),
            "error: trap"
        );
    }
}
