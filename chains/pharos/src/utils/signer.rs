use crate::utils::tx_sender::UnsignedTransaction;
use async_trait::async_trait;
use core_logic::{AccountSecret, WorkflowError};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes};

/// Signing capability bound to exactly one account.
#[async_trait]
pub trait TxSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Returns the RLP-encoded signed transaction, ready for broadcast.
    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Bytes, WorkflowError>;
}

#[async_trait]
impl TxSigner for LocalWallet {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Bytes, WorkflowError> {
        let typed = tx.to_typed(Signer::address(self));
        let signature = self
            .sign_transaction(&typed)
            .await
            .map_err(|e| WorkflowError::rpc("sign_transaction", e))?;
        Ok(typed.rlp_signed(&signature))
    }
}

/// Parses a hex private key (with or without `0x`) into a wallet for `chain_id`.
pub fn wallet_from_secret(secret: &AccountSecret, chain_id: u64) -> anyhow::Result<LocalWallet> {
    let key = secret.expose().trim();
    let key = key.strip_prefix("0x").unwrap_or(key);
    let wallet: LocalWallet = key
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid private key: {}", e))?;
    Ok(wallet.with_chain_id(chain_id))
}
