use anyhow::Result;
use config::{Config, Environment, File};
use core_logic::config::RetryPolicy;
use core_logic::{
    ConfigError, DelayRange, GasConfig, HttpSettings, ProbeSettings, ProxySettings,
    RoundRange, SchedulerSettings,
};
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct PharosConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    #[serde(default = "default_accounts_file")]
    pub accounts_file: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(default)]
    pub delay: DelayRange,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub submitter: SubmitterSettings,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub spout: SpoutSettings,
    #[serde(default)]
    pub bitverse: BitverseSettings,
    #[serde(default)]
    pub autostaking: AutoStakingSettings,
}

fn default_accounts_file() -> String {
    "accounts.txt".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

/// Send and confirm phases retry independently.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SubmitterSettings {
    pub send_retry: RetryPolicy,
    pub confirm_retry: RetryPolicy,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for SubmitterSettings {
    fn default() -> Self {
        Self {
            send_retry: RetryPolicy::default(),
            confirm_retry: RetryPolicy::default(),
            confirmation_timeout_secs: 300,
            poll_interval_ms: 2000,
        }
    }
}

impl SubmitterSettings {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SpoutSettings {
    pub enabled: bool,
    pub actions: Vec<String>,
    pub trade_count: RoundRange,
    pub usdc_amount: f64,
    pub slqd_amount: f64,
    pub api_base: String,
}

impl Default for SpoutSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            actions: vec!["kyc".to_string(), "buy".to_string()],
            trade_count: RoundRange::ONCE,
            usdc_amount: 1.0,
            slqd_amount: 0.5,
            api_base: "https://www.spout.finance/api".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BitverseSettings {
    pub enabled: bool,
    pub actions: Vec<String>,
    pub deposit_amount: f64,
    pub trade_count: RoundRange,
    pub trade_amount: AmountRange,
    pub api_base: String,
}

impl Default for BitverseSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            actions: vec!["deposit".to_string(), "trade".to_string()],
            deposit_amount: 1.0,
            trade_count: RoundRange::ONCE,
            trade_amount: AmountRange::fixed(1.0),
            api_base: "https://api.bitverse.zone/bitverse".to_string(),
        }
    }
}

/// Token amount drawn uniformly from `[min, max]`, rounded to cents.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct AmountRange {
    pub min: f64,
    pub max: f64,
}

impl AmountRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn fixed(amount: f64) -> Self {
        Self::new(amount, amount)
    }

    pub fn sample(&self) -> f64 {
        if self.max <= self.min {
            return self.min;
        }
        let amount = rand::thread_rng().gen_range(self.min..=self.max);
        ((amount * 100.0).round() / 100.0).clamp(self.min, self.max)
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        check_amount(field, self.min)?;
        check_amount(field, self.max)?;
        if self.min > self.max {
            return Err(invalid(field, "min is greater than max"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AutoStakingSettings {
    pub enabled: bool,
    pub amount: f64,
    pub api_base: String,
    pub auth_token: String,
}

impl Default for AutoStakingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 1.0,
            api_base: "https://api.autostaking.pro".to_string(),
            auth_token: String::new(),
        }
    }
}

const SPOUT_ACTIONS: [&str; 3] = ["kyc", "buy", "sell"];
const BITVERSE_ACTIONS: [&str; 3] = ["deposit", "trade", "withdraw"];

impl PharosConfig {
    /// File source first, then `PHAROS_` environment overrides
    /// (e.g. `PHAROS_AUTOSTAKING__AUTH_TOKEN`).
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("PHAROS").separator("__"))
            .build()?;

        settings.try_deserialize().map_err(|e| anyhow::anyhow!(e))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "rpc_url".to_string(),
            });
        }
        if url::Url::parse(&self.rpc_url).is_err() {
            return Err(ConfigError::InvalidRpcUrl {
                url: self.rpc_url.clone(),
            });
        }

        self.delay.validate("delay")?;
        self.scheduler.validate()?;

        for (field, policy) in [
            ("submitter.send_retry", &self.submitter.send_retry),
            ("submitter.confirm_retry", &self.submitter.confirm_retry),
            ("http.retry", &self.http.retry),
        ] {
            if policy.max_attempts == 0 {
                return Err(invalid(field, "max_attempts must be at least 1"));
            }
        }

        if self.spout.enabled {
            check_actions("spout.actions", &self.spout.actions, &SPOUT_ACTIONS)?;
            self.spout.trade_count.validate("spout.trade_count")?;
            check_amount("spout.usdc_amount", self.spout.usdc_amount)?;
            if self.spout.actions.iter().any(|a| a == "sell") {
                check_amount("spout.slqd_amount", self.spout.slqd_amount)?;
            }
        }

        if self.bitverse.enabled {
            check_actions("bitverse.actions", &self.bitverse.actions, &BITVERSE_ACTIONS)?;
            check_amount("bitverse.deposit_amount", self.bitverse.deposit_amount)?;
            self.bitverse.trade_count.validate("bitverse.trade_count")?;
            self.bitverse.trade_amount.validate("bitverse.trade_amount")?;
        }

        if self.autostaking.enabled {
            check_amount("autostaking.amount", self.autostaking.amount)?;
            if self.autostaking.auth_token.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "autostaking.auth_token".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn check_amount(field: &str, amount: f64) -> Result<(), ConfigError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must be a positive number"))
    }
}

fn check_actions(field: &str, actions: &[String], known: &[&str]) -> Result<(), ConfigError> {
    match actions.iter().find(|a| !known.contains(&a.as_str())) {
        Some(unknown) => Err(invalid(field, &format!("unknown action '{}'", unknown))),
        None => Ok(()),
    }
}
