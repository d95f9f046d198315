use crate::config::PharosConfig;
use crate::utils::{ChainRpc, GasManager, TransactionSubmitter, TxSigner};
use core_logic::{ConfigError, JsonService, TransactionOutcome, Workflow, WorkflowError};
use ethers::types::{Address, Bytes};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

pub mod autostaking;
pub mod bitverse;
pub mod common;
pub mod spout;

pub type PharosWorkflow = Workflow<TaskContext>;

/// Everything a step needs for one account, built once per account per pass.
#[derive(Clone)]
pub struct TaskContext {
    pub rpc: Arc<dyn ChainRpc>,
    pub api: Arc<dyn JsonService>,
    pub signer: Arc<dyn TxSigner>,
    pub submitter: Arc<TransactionSubmitter>,
    pub gas: Arc<GasManager>,
    pub config: Arc<PharosConfig>,
    pub identities: Arc<IdentityCache>,
    pub proxy: Option<String>,
}

impl TaskContext {
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, WorkflowError> {
        self.rpc.call(to, data).await
    }

    /// Prepares gas, then signs, broadcasts and confirms through the submitter.
    pub async fn send(
        &self,
        to: Address,
        data: Bytes,
        fallback_gas: u64,
    ) -> Result<TransactionOutcome, WorkflowError> {
        let call = self
            .gas
            .prepare(self.rpc.as_ref(), self.address(), to, data, fallback_gas)
            .await;
        self.submitter
            .submit(self.rpc.as_ref(), self.signer.as_ref(), &call)
            .await
    }
}

/// Identity contract per account, filled in as identities are discovered.
#[derive(Debug, Default)]
pub struct IdentityCache {
    identities: Mutex<HashMap<Address, Address>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, account: Address) -> Option<Address> {
        let identities = self.identities.lock().unwrap_or_else(PoisonError::into_inner);
        identities.get(&account).copied()
    }

    pub fn insert(&self, account: Address, identity: Address) {
        let mut identities = self.identities.lock().unwrap_or_else(PoisonError::into_inner);
        identities.insert(account, identity);
    }
}

/// Workflows enabled in the config, in run order.
pub fn build_workflows(config: &PharosConfig) -> Result<Vec<PharosWorkflow>, ConfigError> {
    let mut workflows = Vec::new();
    if config.spout.enabled {
        workflows.extend(spout::workflows(&config.spout)?);
    }
    if config.bitverse.enabled {
        workflows.extend(bitverse::workflows(&config.bitverse)?);
    }
    if config.autostaking.enabled {
        workflows.push(autostaking::workflow(&config.autostaking)?);
    }
    Ok(workflows)
}

pub(crate) fn parse_address(field: &str, value: &str) -> Result<Address, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        reason: format!("'{}' is not an address", value),
    })
}
