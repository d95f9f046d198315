//! # Core Logic - Shared Orchestration Core
//!
//! Chain-agnostic pieces shared by every chain crate: proxy selection,
//! connectivity gating, retry, the per-account workflow engine and the
//! scheduler that drives it.
//!
//! ## Modules
//!
//! - [`config`] - Settings structs embedded in each chain's config file
//! - [`error`] - Typed error handling with thiserror
//! - [`metrics`] - Step and workflow outcome counters
//! - [`traits`] - Step, gate and account processor seams
//! - [`workflow`] - Gated step sequencing per account
//! - `utils` - Proxy pool, probe, REST client, retry, scheduler, logger

// Module declarations - internal modules marked pub(crate)
pub mod config;
pub mod error;
pub mod metrics;
pub mod traits;
pub(crate) mod utils;
pub mod workflow;

// Selective exports - only public API types
pub use config::{
    DelayRange, HttpSettings, ProbeSettings, ProxySettings, RoundRange, SchedulerSettings,
};
pub use error::{ConfigError, CoreError, NetworkError, WorkflowError};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use traits::{
    AccountProcessor, Gate, GateDecision, Step, StepOutcome, TransactionOutcome,
};
pub use workflow::{
    AccountReport, AccountStatus, Workflow, WorkflowEngine, WorkflowReport, WorkflowStatus,
    WorkflowStepResult,
};

// Utils are pub(crate) - only export specific public utilities
pub use utils::{
    gwei_to_wei, mask_account, setup_logger, AccountSecret, ConnectivityProbe,
    FallbackGasLimits, GasConfig, HttpJsonService, HttpProbe, HttpServiceConnector, JsonService,
    Probe, ProxyPool, Scheduler, ServiceConnector, WalletManager,
};

pub use utils::retry::{with_retry, RetryError, RetryPolicy};
