//! Scheduler tuning.
//!
//! # Invariants
//! - `max_attempts >= 1`.
//! - `backoff_base_ms <= backoff_max_ms`.
//! - Missing JSON keys fall back to `SchedulerConfig::default()`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Retry and deadline policy for transactional write operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Attempts per operation when the store reports lock contention.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubled for each further attempt.
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Deadline applied by `RequestContext::with_default_deadline`.
    pub default_deadline_ms: Option<u64>,
    /// Longest a single attempt waits for the write lock. Shortened further
    /// to whatever the caller's deadline has left.
    pub lock_wait_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_base_ms: 20,
            backoff_max_ms: 320,
            default_deadline_ms: Some(10_000),
            lock_wait_ms: 5_000,
        }
    }
}

impl SchedulerConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ConfigError::Invalid(format!(
                "backoff_base_ms ({}) exceeds backoff_max_ms ({})",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }
        Ok(())
    }

    /// Sleep before retrying after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let millis = self
            .backoff_base_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.backoff_max_ms);
        Duration::from_millis(millis)
    }

    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline_ms.map(Duration::from_millis)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid scheduler config: {message}"),
            Self::Invalid(message) => write!(f, "scheduler config rejected: {message}"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, SchedulerConfig};
    use std::time::Duration;

    #[test]
    fn missing_keys_use_defaults() {
        let config = SchedulerConfig::from_json_str(r#"{ "max_attempts": 2 }"#).unwrap();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(
            config.backoff_base_ms,
            SchedulerConfig::default().backoff_base_ms
        );
        assert_eq!(config.lock_wait(), Duration::from_secs(5));
    }

    #[test]
    fn rejects_zero_attempts_and_inverted_backoff() {
        let err = SchedulerConfig::from_json_str(r#"{ "max_attempts": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SchedulerConfig::from_json_str(
            r#"{ "backoff_base_ms": 500, "backoff_max_ms": 100 }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SchedulerConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = SchedulerConfig {
            backoff_base_ms: 10,
            backoff_max_ms: 35,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.backoff_for(1), Duration::from_millis(10));
        assert_eq!(config.backoff_for(2), Duration::from_millis(20));
        assert_eq!(config.backoff_for(3), Duration::from_millis(35));
        assert_eq!(config.backoff_for(40), Duration::from_millis(35));
    }
}
