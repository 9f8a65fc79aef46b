//! Resource and registry state definitions.

use std::fmt;
use std::str::FromStr;

use crate::error::LoaderError;

/// When a resource is (re)loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdatePolicy {
    /// Load the bundled fallback once, never go remote.
    Never,
    /// Load once, asynchronously, when registered.
    OnStartup,
    /// Reload on a timer described by the resource properties.
    Scheduled,
    /// Load on first access.
    Lazy,
}

impl UpdatePolicy {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdatePolicy::Never => "NEVER",
            UpdatePolicy::OnStartup => "ONSTARTUP",
            UpdatePolicy::Scheduled => "SCHEDULED",
            UpdatePolicy::Lazy => "LAZY",
        }
    }
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdatePolicy {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace(['_', '-'], "").as_str() {
            "NEVER" => Ok(UpdatePolicy::Never),
            "ONSTARTUP" => Ok(UpdatePolicy::OnStartup),
            "SCHEDULED" => Ok(UpdatePolicy::Scheduled),
            "LAZY" => Ok(UpdatePolicy::Lazy),
            _ => Err(LoaderError::InvalidPolicy(s.to_string())),
        }
    }
}

/// Load state of a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// No data.
    Unloaded,
    /// A load is in progress.
    Loading,
    /// Data came from a remote location.
    Loaded,
    /// Data came from the disk cache or the bundled snapshot.
    FallbackLoaded,
}

/// Where the bytes of a load came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOrigin {
    /// A remote location, by URL.
    Remote(String),
    /// The local disk cache.
    Cache,
    /// The bundled fallback snapshot.
    Fallback,
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataOrigin::Remote(url) => write!(f, "remote {}", url),
            DataOrigin::Cache => f.write_str("disk cache"),
            DataOrigin::Fallback => f.write_str("fallback"),
        }
    }
}

/// Registry operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// Accepting registrations and loads.
    Running,
    /// Shutting down, not accepting new registrations.
    ShuttingDown,
    /// Timers cancelled and loads drained.
    Stopped,
}

impl RegistryState {
    /// Check if the registry accepts new work.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, RegistryState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parse() {
        assert_eq!("never".parse::<UpdatePolicy>().unwrap(), UpdatePolicy::Never);
        assert_eq!("OnStartup".parse::<UpdatePolicy>().unwrap(), UpdatePolicy::OnStartup);
        assert_eq!("on_startup".parse::<UpdatePolicy>().unwrap(), UpdatePolicy::OnStartup);
        assert_eq!("SCHEDULED".parse::<UpdatePolicy>().unwrap(), UpdatePolicy::Scheduled);
        assert_eq!(" lazy ".parse::<UpdatePolicy>().unwrap(), UpdatePolicy::Lazy);
        assert!(matches!(
            "sometimes".parse::<UpdatePolicy>(),
            Err(LoaderError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_policy_display_round_trips() {
        for policy in [
            UpdatePolicy::Never,
            UpdatePolicy::OnStartup,
            UpdatePolicy::Scheduled,
            UpdatePolicy::Lazy,
        ] {
            assert_eq!(policy.to_string().parse::<UpdatePolicy>().unwrap(), policy);
        }
    }
}
