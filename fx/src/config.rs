//! Feed provider configuration.

use std::time::Duration;

use ratefeed_common::{constants, Currency};

use crate::rate::RateKind;

/// Configuration of one feed-backed rate provider.
#[derive(Debug, Clone)]
pub struct FeedProviderConfig {
    /// Provider name used in queries and rate contexts.
    pub name: String,
    /// Loader resource holding the feed bytes.
    pub resource_id: String,
    /// Currency every feed rate is quoted against.
    pub reference: Currency,
    /// Kind stamped on produced rates.
    pub kind: RateKind,
    /// How long a query waits for the first data.
    pub first_load_timeout: Duration,
}

impl FeedProviderConfig {
    /// Configuration for a provider reading `resource_id`.
    pub fn new(name: impl Into<String>, resource_id: impl Into<String>, reference: Currency) -> Self {
        Self {
            name: name.into(),
            resource_id: resource_id.into(),
            reference,
            kind: RateKind::Historic,
            first_load_timeout: constants::FIRST_LOAD_TIMEOUT,
        }
    }

    /// Apply `RATEFEED_FIRST_LOAD_TIMEOUT_MS` if set.
    pub fn from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("RATEFEED_FIRST_LOAD_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.first_load_timeout = Duration::from_millis(ms);
            }
        }
        self
    }

    pub fn with_kind(mut self, kind: RateKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_first_load_timeout(mut self, timeout: Duration) -> Self {
        self.first_load_timeout = timeout;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("provider name is required".to_string());
        }
        if self.resource_id.trim().is_empty() {
            return Err(format!("provider {} has no resource id", self.name));
        }
        if self.first_load_timeout.is_zero() {
            return Err(format!("provider {} has a zero first load timeout", self.name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FeedProviderConfig::new("ECB", "ECB-DAILY", Currency::eur());

        assert_eq!(config.kind, RateKind::Historic);
        assert_eq!(config.first_load_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(FeedProviderConfig::new("", "ECB", Currency::eur()).validate().is_err());
        assert!(FeedProviderConfig::new("ECB", " ", Currency::eur()).validate().is_err());
        assert!(FeedProviderConfig::new("ECB", "ECB", Currency::eur())
            .with_first_load_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
