//! Account orchestration: the per-run state every account shares (proxy pool,
//! nonces, identity cache) and the connect-then-run-workflows unit of work
//! the scheduler drives.

use crate::config::PharosConfig;
use crate::task::{IdentityCache, PharosWorkflow, TaskContext};
use crate::utils::{wallet_from_secret, GasManager, RpcConnector, TransactionSubmitter, TxSigner};
use async_trait::async_trait;
use core_logic::{
    mask_account, AccountProcessor, AccountReport, AccountSecret, ConnectivityProbe, Probe,
    ProxyPool, ServiceConnector, WorkflowEngine, WorkflowError,
};
use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity plus signing capability. Immutable once loaded.
#[derive(Clone)]
pub struct Account {
    pub address: Address,
    pub signer: Arc<dyn TxSigner>,
}

impl Account {
    pub fn new(signer: Arc<dyn TxSigner>) -> Self {
        Self {
            address: signer.address(),
            signer,
        }
    }

    pub fn from_secret(secret: &AccountSecret, chain_id: u64) -> anyhow::Result<Self> {
        let wallet = wallet_from_secret(secret, chain_id)?;
        Ok(Self::new(Arc::new(wallet)))
    }

    /// Parses every secret, logging and skipping the ones that are not keys.
    pub fn load_all(secrets: &[AccountSecret], chain_id: u64) -> Vec<Self> {
        secrets
            .iter()
            .enumerate()
            .filter_map(|(i, secret)| match Self::from_secret(secret, chain_id) {
                Ok(account) => Some(account),
                Err(e) => {
                    warn!("Skipping account #{}: {}", i + 1, e);
                    None
                }
            })
            .collect()
    }

    /// Full address. Keys the proxy assignment.
    pub fn identity(&self) -> String {
        format!("{:?}", self.address)
    }

    /// Masked address for logs.
    pub fn id(&self) -> String {
        mask_account(&self.identity())
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .finish()
    }
}

/// Owns the state shared across accounts for one run.
pub struct AccountOrchestrator {
    config: Arc<PharosConfig>,
    proxies: Arc<ProxyPool>,
    probe: ConnectivityProbe<Box<dyn Probe>>,
    rpc: Box<dyn RpcConnector>,
    services: Box<dyn ServiceConnector>,
    submitter: Arc<TransactionSubmitter>,
    gas: Arc<GasManager>,
    identities: Arc<IdentityCache>,
    engine: WorkflowEngine,
    workflows: Vec<PharosWorkflow>,
}

impl AccountOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<PharosConfig>,
        proxies: Arc<ProxyPool>,
        probe: Box<dyn Probe>,
        rpc: Box<dyn RpcConnector>,
        services: Box<dyn ServiceConnector>,
        submitter: Arc<TransactionSubmitter>,
        workflows: Vec<PharosWorkflow>,
    ) -> Self {
        Self {
            probe: ConnectivityProbe::new(probe, config.probe.clone()),
            gas: Arc::new(GasManager::new(config.gas.clone())),
            engine: WorkflowEngine::new(config.delay),
            identities: Arc::new(IdentityCache::new()),
            config,
            proxies,
            rpc,
            services,
            submitter,
            workflows,
        }
    }

    pub fn identities(&self) -> &Arc<IdentityCache> {
        &self.identities
    }

    pub fn workflows(&self) -> &[PharosWorkflow] {
        &self.workflows
    }

    /// Connectivity check, RPC and REST clients on the chosen egress, nonce seeding.
    async fn connect(&self, account: &Account) -> Result<TaskContext, WorkflowError> {
        let id = account.id();
        let proxy = self
            .probe
            .probe_with_rotation(
                &self.proxies,
                &account.identity(),
                self.config.proxy.enabled,
                self.config.proxy.rotate_on_failure,
            )
            .await?;

        let rpc = self.rpc.connect(proxy.as_deref())?;
        let api = self.services.connect(proxy.as_deref())?;

        let pending = rpc.pending_nonce(account.address).await?;
        let nonce = self.submitter.nonces().seed(account.address, pending).await;
        debug!(account = %id, nonce, "Nonce seeded");

        Ok(TaskContext {
            rpc,
            api,
            signer: account.signer.clone(),
            submitter: self.submitter.clone(),
            gas: self.gas.clone(),
            config: self.config.clone(),
            identities: self.identities.clone(),
            proxy,
        })
    }
}

#[async_trait]
impl AccountProcessor for AccountOrchestrator {
    type Account = Account;

    async fn process(&self, account: &Account) -> AccountReport {
        let id = account.id();
        info!(target: "task_result", account = %id, "Processing account");

        self.engine
            .run_account(&id, || self.connect(account), &self.workflows)
            .await
    }
}
