//! # Core Error Types
//!
//! Centralized error definitions for the core-logic crate.
//! All errors implement `std::error::Error` and `std::fmt::Display`.

use thiserror::Error;

/// Unified error type for core-logic operations.
///
/// This enum wraps all specific error types and provides a unified
/// error interface for the application layer.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Config(ConfigError),

    #[error(transparent)]
    Network(NetworkError),

    #[error(transparent)]
    Workflow(WorkflowError),

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        CoreError::Config(e)
    }
}

impl From<NetworkError> for CoreError {
    fn from(e: NetworkError) -> Self {
        CoreError::Network(e)
    }
}

impl From<WorkflowError> for CoreError {
    fn from(e: WorkflowError) -> Self {
        CoreError::Workflow(e)
    }
}

/// Startup input errors. These are the only errors that stop the process.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid RPC URL format: '{url}'")]
    InvalidRpcUrl { url: String },

    #[error("Missing required configuration field: '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error reading {path}: {msg}")]
    IoError { path: String, msg: String },

    #[error("No usable accounts in {path}")]
    EmptyAccountList { path: String },
}

/// HTTP client and transport errors
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Request timeout after {timeout_ms}ms to {endpoint}")]
    Timeout { timeout_ms: u64, endpoint: String },

    #[error("Connection refused to {endpoint}: {reason}")]
    ConnectionRefused { endpoint: String, reason: String },

    #[error("HTTP error {status_code} from {endpoint}")]
    HttpError { status_code: u16, endpoint: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Invalid proxy '{proxy}': {reason}")]
    InvalidProxy { proxy: String, reason: String },

    #[error("Failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        let endpoint = e
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        if e.is_timeout() {
            NetworkError::Timeout {
                timeout_ms: 0,
                endpoint,
            }
        } else if let Some(status) = e.status() {
            NetworkError::HttpError {
                status_code: status.as_u16(),
                endpoint,
            }
        } else if e.is_connect() {
            NetworkError::ConnectionRefused {
                endpoint,
                reason: e.to_string(),
            }
        } else {
            NetworkError::InvalidResponse {
                endpoint,
                reason: e.to_string(),
            }
        }
    }
}

/// Failures raised while running an account's workflows.
///
/// Every variant is caught at the step boundary by the workflow engine.
/// Only [`WorkflowError::InsufficientBalance`] is a skip; everything else
/// ends the current workflow early.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Connectivity check failed for {account} after {attempts} attempt(s)")]
    ConnectivityFailure { account: String, attempts: u32 },

    #[error("Insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        asset: String,
        required: String,
        available: String,
    },

    #[error("Transaction submission exhausted after {attempts} attempt(s): {last_error}")]
    SubmissionExhausted { attempts: u32, last_error: String },

    #[error("Confirmation of {tx_hash} exhausted after {attempts} attempt(s): {last_error}")]
    ConfirmationExhausted {
        tx_hash: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Transaction {tx_hash} reverted in block {block_number}")]
    TransactionReverted { tx_hash: String, block_number: u64 },

    #[error("{service} request failed: {reason}")]
    ExternalServiceFailure { service: String, reason: String },

    #[error("Precondition not met: {reason}")]
    PreconditionFailed { reason: String },

    #[error("RPC {method} failed: {reason}")]
    Rpc { method: String, reason: String },
}

impl WorkflowError {
    pub fn rpc(method: &str, reason: impl std::fmt::Display) -> Self {
        WorkflowError::Rpc {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn service(service: &str, reason: impl std::fmt::Display) -> Self {
        WorkflowError::ExternalServiceFailure {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn precondition(reason: impl Into<String>) -> Self {
        WorkflowError::PreconditionFailed {
            reason: reason.into(),
        }
    }

    /// Stable label used in structured log fields and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::ConnectivityFailure { .. } => "connectivity_failure",
            WorkflowError::InsufficientBalance { .. } => "insufficient_balance",
            WorkflowError::SubmissionExhausted { .. } => "submission_exhausted",
            WorkflowError::ConfirmationExhausted { .. } => "confirmation_exhausted",
            WorkflowError::TransactionReverted { .. } => "transaction_reverted",
            WorkflowError::ExternalServiceFailure { .. } => "external_service_failure",
            WorkflowError::PreconditionFailed { .. } => "precondition_failed",
            WorkflowError::Rpc { .. } => "rpc_error",
        }
    }

    /// Whether this failure skips the rest of a workflow without counting as an abort.
    pub fn is_skip(&self) -> bool {
        matches!(self, WorkflowError::InsufficientBalance { .. })
    }
}
