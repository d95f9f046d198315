//! # Core Logic - Gas Configuration
//!
//! Chain-agnostic fee and gas limit settings. Chain crates do the actual
//! estimation and use these values for fees, the estimate buffer, and the
//! fallback limits when estimation fails.

use serde::{Deserialize, Serialize};

/// Fallback gas limits per kind of operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackGasLimits {
    pub approve: u64,
    pub deploy_identity: u64,
    pub add_claim: u64,
    pub trade: u64,
    pub deposit: u64,
    pub faucet: u64,
    pub staking: u64,
}

impl Default for FallbackGasLimits {
    fn default() -> Self {
        Self {
            approve: 100_000,
            deploy_identity: 1_000_000,
            add_claim: 800_000,
            trade: 800_000,
            deposit: 300_000,
            faucet: 150_000,
            staking: 500_000,
        }
    }
}

/// Configuration for gas management
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub max_gwei: f64,
    pub priority_gwei: f64,
    /// Multiplier applied to `eth_estimateGas`.
    pub limit_buffer: f64,
    pub limits: FallbackGasLimits,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            max_gwei: 1.0,
            priority_gwei: 1.0,
            limit_buffer: 1.2,
            limits: FallbackGasLimits::default(),
        }
    }
}

impl GasConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_fee(mut self, max_gwei: f64) -> Self {
        self.max_gwei = max_gwei;
        self
    }

    pub fn with_priority_fee(mut self, priority_gwei: f64) -> Self {
        self.priority_gwei = priority_gwei;
        self
    }

    pub fn max_fee_wei(&self) -> u64 {
        gwei_to_wei(self.max_gwei)
    }

    pub fn priority_fee_wei(&self) -> u64 {
        gwei_to_wei(self.priority_gwei)
    }

    /// Applies the buffer to an estimate, never going below the estimate itself.
    pub fn buffered_limit(&self, estimate: u64) -> u64 {
        let percent = (self.limit_buffer.max(1.0) * 100.0).round() as u64;
        (estimate.saturating_mul(percent) / 100).max(estimate)
    }
}

/// Convert gwei to wei as u64
pub fn gwei_to_wei(gwei: f64) -> u64 {
    (gwei * 1e9) as u64
}
