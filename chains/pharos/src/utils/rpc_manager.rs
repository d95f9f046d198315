use async_trait::async_trait;
use core_logic::WorkflowError;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes, TransactionRequest,
    H256, U256, U64,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// The parts of a receipt the submitter cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub block_number: u64,
    pub success: bool,
}

/// Chain RPC endpoint as seen by the workflows and the submitter.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    fn chain_id(&self) -> u64;

    async fn pending_nonce(&self, address: Address) -> Result<u64, WorkflowError>;

    async fn balance(&self, address: Address) -> Result<U256, WorkflowError>;

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, WorkflowError>;

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<U256, WorkflowError>;

    async fn broadcast(&self, raw: Bytes) -> Result<H256, WorkflowError>;

    /// `None` while the transaction is still pending.
    async fn receipt(&self, hash: H256) -> Result<Option<ReceiptSummary>, WorkflowError>;
}

/// Builds a [`ChainRpc`] bound to one account's egress.
pub trait RpcConnector: Send + Sync {
    fn connect(&self, proxy: Option<&str>) -> Result<Arc<dyn ChainRpc>, WorkflowError>;
}

pub struct EthersRpc {
    provider: Provider<Http>,
    chain_id: u64,
}

impl EthersRpc {
    pub fn new(
        rpc_url: &str,
        chain_id: u64,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, WorkflowError> {
        let url = Url::parse(rpc_url).map_err(|e| WorkflowError::rpc("connect", e))?;

        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| WorkflowError::rpc("connect", e))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| WorkflowError::rpc("connect", e))?;

        let provider = Provider::new(Http::new_with_client(url, client));
        Ok(Self { provider, chain_id })
    }

    pub fn provider(&self) -> &Provider<Http> {
        &self.provider
    }
}

#[async_trait]
impl ChainRpc for EthersRpc {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, WorkflowError> {
        let count = self
            .provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| WorkflowError::rpc("eth_getTransactionCount", e))?;
        Ok(count.as_u64())
    }

    async fn balance(&self, address: Address) -> Result<U256, WorkflowError> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(|e| WorkflowError::rpc("eth_getBalance", e))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, WorkflowError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.provider
            .call(&tx, None)
            .await
            .map_err(|e| WorkflowError::rpc("eth_call", e))
    }

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<U256, WorkflowError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(to)
            .data(data)
            .into();
        self.provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| WorkflowError::rpc("eth_estimateGas", e))
    }

    async fn broadcast(&self, raw: Bytes) -> Result<H256, WorkflowError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| WorkflowError::rpc("eth_sendRawTransaction", e))?;
        let hash = pending.tx_hash();
        debug!("Broadcast accepted: {:?}", hash);
        Ok(hash)
    }

    async fn receipt(&self, hash: H256) -> Result<Option<ReceiptSummary>, WorkflowError> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| WorkflowError::rpc("eth_getTransactionReceipt", e))?;

        Ok(receipt.and_then(|r| {
            r.block_number.map(|block| ReceiptSummary {
                block_number: block.as_u64(),
                success: r.status == Some(U64::from(1)),
            })
        }))
    }
}

/// One ethers HTTP provider per account egress.
#[derive(Debug, Clone)]
pub struct HttpRpcConnector {
    rpc_url: String,
    chain_id: u64,
    timeout: Duration,
}

impl HttpRpcConnector {
    pub fn new(rpc_url: impl Into<String>, chain_id: u64, timeout: Duration) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
            timeout,
        }
    }
}

impl RpcConnector for HttpRpcConnector {
    fn connect(&self, proxy: Option<&str>) -> Result<Arc<dyn ChainRpc>, WorkflowError> {
        let rpc = EthersRpc::new(&self.rpc_url, self.chain_id, proxy, self.timeout)?;
        Ok(Arc::new(rpc))
    }
}
