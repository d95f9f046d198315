use crate::error::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use crate::utils::retry::RetryPolicy;

/// Egress proxy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub enabled: bool,
    pub rotate_on_failure: bool,
    pub file: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            rotate_on_failure: true,
            file: "proxy.txt".to_string(),
        }
    }
}

/// Reachability check run before each account's workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub url: String,
    pub timeout_secs: u64,
    /// Rotation attempts are capped at `pool size * rotation_rounds`.
    pub rotation_rounds: u32,
    pub rotation_delay_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            url: "https://api.ipify.org?format=json".to_string(),
            timeout_secs: 30,
            rotation_rounds: 3,
            rotation_delay_ms: 1000,
        }
    }
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn rotation_delay(&self) -> Duration {
        Duration::from_millis(self.rotation_delay_ms)
    }
}

/// Inclusive range of whole seconds to pause between value-moving operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min_secs: 5,
            max_secs: 10,
        }
    }
}

impl DelayRange {
    pub const NONE: DelayRange = DelayRange {
        min_secs: 0,
        max_secs: 0,
    };

    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    pub fn sample(&self) -> Duration {
        if self.max_secs <= self.min_secs {
            return Duration::from_secs(self.min_secs);
        }
        let secs = rand::thread_rng().gen_range(self.min_secs..=self.max_secs);
        Duration::from_secs(secs)
    }

    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.min_secs > self.max_secs {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                reason: format!(
                    "min_secs ({}) is greater than max_secs ({})",
                    self.min_secs, self.max_secs
                ),
            });
        }
        Ok(())
    }
}

/// Inclusive bounds on how many times a workflow's steps repeat per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundRange {
    pub min: u32,
    pub max: u32,
}

impl Default for RoundRange {
    fn default() -> Self {
        Self::ONCE
    }
}

impl RoundRange {
    pub const ONCE: RoundRange = RoundRange { min: 1, max: 1 };

    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn fixed(rounds: u32) -> Self {
        Self::new(rounds, rounds)
    }

    pub fn sample(&self) -> u32 {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }

    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.max == 0 || self.min > self.max {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                reason: format!("expected 0 < max and min <= max, got [{}, {}]", self.min, self.max),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Accounts processed at the same time. `1` keeps file order strictly sequential.
    pub concurrency: usize,
    pub account_delay_secs: u64,
    pub cooldown_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            account_delay_secs: 3,
            cooldown_secs: 24 * 60 * 60,
        }
    }
}

impl SchedulerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// REST collaborators: request timeout plus their own retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            retry: RetryPolicy::fixed(5, 5000),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
