#![allow(dead_code)]

use async_trait::async_trait;
use config::{Config, File, FileFormat};
use core_logic::{GasConfig, JsonService, RetryPolicy, WorkflowError};
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::id;
use pharos_project::config::{PharosConfig, SubmitterSettings};
use pharos_project::task::{IdentityCache, TaskContext};
use pharos_project::utils::{
    ChainRpc, GasManager, NonceTracker, ReceiptSummary, TransactionSubmitter, TxSigner,
    UnsignedTransaction,
};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const CHAIN_ID: u64 = 688688;
pub const BLOCK: u64 = 4_242;

/// Which outcome the mock chain hands back for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
    Success,
    Reverted,
    Unavailable,
}

/// In-memory chain: ERC-20 views answered by selector, broadcasts recorded.
pub struct MockRpc {
    pub pending_nonce: u64,
    pub native_balance: U256,
    pub decimals: u64,
    pub token_balance: U256,
    pub allowance: U256,
    pub identity: Address,
    pub kyc_claims: usize,
    pub receipt_mode: ReceiptMode,
    send_failures: AtomicU32,
    broadcast_attempts: AtomicU32,
    broadcasts: Mutex<Vec<u64>>,
}

impl MockRpc {
    pub fn new(pending_nonce: u64) -> Self {
        Self {
            pending_nonce,
            native_balance: U256::exp10(18),
            decimals: 6,
            token_balance: U256::zero(),
            allowance: U256::zero(),
            identity: Address::zero(),
            kyc_claims: 0,
            receipt_mode: ReceiptMode::Success,
            send_failures: AtomicU32::new(0),
            broadcast_attempts: AtomicU32::new(0),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    /// Whole-token balance and allowance at the mock's decimals.
    pub fn with_token(mut self, balance: u64, allowance: u64) -> Self {
        let unit = U256::exp10(self.decimals as usize);
        self.token_balance = U256::from(balance) * unit;
        self.allowance = U256::from(allowance) * unit;
        self
    }

    pub fn with_kyc(mut self, identity: Address, claims: usize) -> Self {
        self.identity = identity;
        self.kyc_claims = claims;
        self
    }

    pub fn with_receipts(mut self, mode: ReceiptMode) -> Self {
        self.receipt_mode = mode;
        self
    }

    /// The first `count` broadcasts fail.
    pub fn failing_sends(self, count: u32) -> Self {
        self.send_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn broadcast_attempts(&self) -> u32 {
        self.broadcast_attempts.load(Ordering::SeqCst)
    }

    /// Nonces of the broadcasts the mock accepted, in order.
    pub fn broadcast_nonces(&self) -> Vec<u64> {
        self.broadcasts.lock().unwrap().clone()
    }
}

fn selector_of(data: &[u8]) -> [u8; 4] {
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&data[..4]);
    selector
}

#[async_trait]
impl ChainRpc for MockRpc {
    fn chain_id(&self) -> u64 {
        CHAIN_ID
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64, WorkflowError> {
        Ok(self.pending_nonce)
    }

    async fn balance(&self, _address: Address) -> Result<U256, WorkflowError> {
        Ok(self.native_balance)
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, WorkflowError> {
        if data.len() < 4 {
            return Err(WorkflowError::rpc("eth_call", "calldata too short"));
        }
        let selector = selector_of(&data);
        let token = if selector == id("decimals()") {
            Token::Uint(U256::from(self.decimals))
        } else if selector == id("balanceOf(address)") {
            Token::Uint(self.token_balance)
        } else if selector == id("allowance(address,address)") {
            Token::Uint(self.allowance)
        } else if selector == id("getIdentity(address)") {
            Token::Address(self.identity)
        } else if selector == id("getClaimIdsByTopic(uint256)") {
            Token::Array(vec![Token::FixedBytes(vec![7u8; 32]); self.kyc_claims])
        } else {
            return Err(WorkflowError::rpc("eth_call", "execution reverted"));
        };
        Ok(Bytes::from(encode(&[token])))
    }

    async fn estimate_gas(
        &self,
        _from: Address,
        _to: Address,
        _data: Bytes,
    ) -> Result<U256, WorkflowError> {
        Ok(U256::from(60_000))
    }

    async fn broadcast(&self, raw: Bytes) -> Result<H256, WorkflowError> {
        self.broadcast_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.send_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.send_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(WorkflowError::rpc("eth_sendRawTransaction", "connection reset"));
        }

        let nonce = MockSigner::nonce_of(&raw);
        self.broadcasts.lock().unwrap().push(nonce);
        Ok(H256::from_low_u64_be(nonce + 1))
    }

    async fn receipt(&self, _hash: H256) -> Result<Option<ReceiptSummary>, WorkflowError> {
        match self.receipt_mode {
            ReceiptMode::Success => Ok(Some(ReceiptSummary {
                block_number: BLOCK,
                success: true,
            })),
            ReceiptMode::Reverted => Ok(Some(ReceiptSummary {
                block_number: BLOCK,
                success: false,
            })),
            ReceiptMode::Unavailable => Err(WorkflowError::rpc(
                "eth_getTransactionReceipt",
                "upstream unavailable",
            )),
        }
    }
}

/// Signs by writing the nonce as the raw transaction so the chain mock can read it back.
pub struct MockSigner {
    pub address: Address,
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            address: Address::repeat_byte(0x11),
        }
    }

    pub fn nonce_of(raw: &[u8]) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&raw[..8]);
        u64::from_be_bytes(bytes)
    }
}

#[async_trait]
impl TxSigner for MockSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Bytes, WorkflowError> {
        Ok(Bytes::from(tx.nonce.to_be_bytes().to_vec()))
    }
}

/// REST collaborator that answers every request with the same value.
pub struct MockApi {
    pub response: Result<Value, WorkflowError>,
    pub requests: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn ok(response: Value) -> Self {
        Self {
            response: Ok(response),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: Err(WorkflowError::service("mock", "503 Service Unavailable")),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl JsonService for MockApi {
    async fn get_json(&self, url: &str, _headers: &[(&str, &str)]) -> Result<Value, WorkflowError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.response.clone()
    }

    async fn post_json(
        &self,
        url: &str,
        _body: &Value,
        _headers: &[(&str, &str)],
    ) -> Result<Value, WorkflowError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.response.clone()
    }
}

pub fn test_config() -> PharosConfig {
    let raw = r#"
        rpc_url = "http://127.0.0.1:8545"
        chain_id = 688688

        [delay]
        min_secs = 0
        max_secs = 0

        [scheduler]
        concurrency = 1
        account_delay_secs = 0
        cooldown_secs = 1
    "#;
    Config::builder()
        .add_source(File::from_str(raw, FileFormat::Toml))
        .build()
        .unwrap()
        .try_deserialize()
        .unwrap()
}

/// Millisecond retries so failure paths finish quickly.
pub fn fast_submitter_settings() -> SubmitterSettings {
    SubmitterSettings {
        send_retry: RetryPolicy::fixed(5, 1),
        confirm_retry: RetryPolicy::fixed(3, 1),
        confirmation_timeout_secs: 5,
        poll_interval_ms: 1,
    }
}

pub fn submitter() -> Arc<TransactionSubmitter> {
    Arc::new(TransactionSubmitter::new(
        Arc::new(NonceTracker::new()),
        fast_submitter_settings(),
    ))
}

pub fn context(
    rpc: Arc<MockRpc>,
    api: Arc<MockApi>,
    submitter: Arc<TransactionSubmitter>,
) -> TaskContext {
    TaskContext {
        rpc,
        api,
        signer: Arc::new(MockSigner::new()),
        submitter,
        gas: Arc::new(GasManager::new(GasConfig::default())),
        config: Arc::new(test_config()),
        identities: Arc::new(IdentityCache::new()),
        proxy: None,
    }
}
