//! # Utilities Module
//!
//! Internal utility modules for the core-logic crate.
//! These modules are marked as `pub(crate)` to enforce API boundaries.

// Internal modules - not part of public API
pub(crate) mod connectivity;
pub(crate) mod gas;
pub(crate) mod logger;
pub(crate) mod proxy_manager;
pub(crate) mod rest;
pub(crate) mod retry;
pub(crate) mod runner;
pub(crate) mod wallet_manager;

// Selective exports - only public utilities
pub use connectivity::{ConnectivityProbe, HttpProbe, Probe};
pub use gas::{gwei_to_wei, FallbackGasLimits, GasConfig};
pub use logger::{mask_account, setup_logger};
pub use proxy_manager::ProxyPool;
pub use rest::{HttpJsonService, HttpServiceConnector, JsonService, ServiceConnector};
pub use runner::Scheduler;
pub use wallet_manager::{AccountSecret, WalletManager};
