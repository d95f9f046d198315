//! Transaction Submitter - sign, broadcast, confirm
//!
//! One call to [`TransactionSubmitter::submit`] is one transaction, split in
//! two independently retried phases:
//!
//! 1. **Send**: sign with the account's nonce and broadcast. Exhausting the
//!    retry budget gives [`WorkflowError::SubmissionExhausted`] and leaves the
//!    nonce untouched.
//! 2. **Confirm**: poll for the receipt until the confirmation timeout.
//!    Exhausting the budget gives [`WorkflowError::ConfirmationExhausted`].
//!
//! The nonce is advanced exactly once, right after the send phase succeeds,
//! whatever happens during confirmation.

use crate::config::SubmitterSettings;
use crate::utils::nonce_manager::NonceTracker;
use crate::utils::rpc_manager::{ChainRpc, ReceiptSummary};
use crate::utils::signer::TxSigner;
use core_logic::{with_retry, TransactionOutcome, WorkflowError};
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest, H256, U256,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Call with gas parameters filled in, not yet bound to a nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall {
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

impl PreparedCall {
    pub fn bind(&self, nonce: u64, chain_id: u64) -> UnsignedTransaction {
        UnsignedTransaction {
            to: self.to,
            data: self.data.clone(),
            gas_limit: self.gas_limit,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            nonce,
            chain_id,
        }
    }
}

/// A transaction bound to exactly one nonce. Built per submission, never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub nonce: u64,
    pub chain_id: u64,
}

impl UnsignedTransaction {
    pub fn to_typed(&self, from: Address) -> TypedTransaction {
        Eip1559TransactionRequest::new()
            .from(from)
            .to(self.to)
            .data(self.data.clone())
            .gas(self.gas_limit)
            .max_fee_per_gas(self.max_fee_per_gas)
            .max_priority_fee_per_gas(self.max_priority_fee_per_gas)
            .nonce(self.nonce)
            .chain_id(self.chain_id)
            .into()
    }
}

pub struct TransactionSubmitter {
    nonces: Arc<NonceTracker>,
    settings: SubmitterSettings,
}

impl TransactionSubmitter {
    pub fn new(nonces: Arc<NonceTracker>, settings: SubmitterSettings) -> Self {
        Self { nonces, settings }
    }

    pub fn nonces(&self) -> &Arc<NonceTracker> {
        &self.nonces
    }

    pub async fn submit(
        &self,
        rpc: &dyn ChainRpc,
        signer: &dyn TxSigner,
        call: &PreparedCall,
    ) -> Result<TransactionOutcome, WorkflowError> {
        let mut lease = self.nonces.lease(signer.address()).await?;
        let tx = call.bind(lease.nonce(), rpc.chain_id());
        let tx_ref = &tx;

        let hash = with_retry(&self.settings.send_retry, "Send transaction", move || async move {
            let raw = signer.sign(tx_ref).await?;
            rpc.broadcast(raw).await
        })
        .await
        .map_err(|e| WorkflowError::SubmissionExhausted {
            attempts: e.attempts,
            last_error: e.last_error.to_string(),
        })?;

        lease.advance();
        drop(lease);

        let tx_hash = format!("{:?}", hash);
        info!(nonce = tx.nonce, tx_hash = %tx_hash, "Transaction broadcast");

        let timeout = self.settings.confirmation_timeout();
        let poll = self.settings.poll_interval();
        let receipt = with_retry(&self.settings.confirm_retry, "Confirm transaction", || {
            wait_for_receipt(rpc, hash, timeout, poll)
        })
        .await
        .map_err(|e| WorkflowError::ConfirmationExhausted {
            tx_hash: tx_hash.clone(),
            attempts: e.attempts,
            last_error: e.last_error.to_string(),
        })?;

        if !receipt.success {
            return Err(WorkflowError::TransactionReverted {
                tx_hash,
                block_number: receipt.block_number,
            });
        }

        debug!("{} confirmed in block {}", tx_hash, receipt.block_number);
        Ok(TransactionOutcome {
            tx_hash,
            block_number: receipt.block_number,
        })
    }
}

async fn wait_for_receipt(
    rpc: &dyn ChainRpc,
    hash: H256,
    timeout: Duration,
    poll: Duration,
) -> Result<ReceiptSummary, WorkflowError> {
    match tokio::time::timeout(timeout, poll_receipt(rpc, hash, poll)).await {
        Ok(result) => result,
        Err(_) => Err(WorkflowError::rpc(
            "eth_getTransactionReceipt",
            format!("no receipt within {}s", timeout.as_secs_f64()),
        )),
    }
}

async fn poll_receipt(
    rpc: &dyn ChainRpc,
    hash: H256,
    poll: Duration,
) -> Result<ReceiptSummary, WorkflowError> {
    loop {
        if let Some(receipt) = rpc.receipt(hash).await? {
            return Ok(receipt);
        }
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_carries_nonce_and_chain() {
        let call = PreparedCall {
            to: Address::repeat_byte(9),
            data: Bytes::from(vec![1, 2, 3]),
            gas_limit: U256::from(120_000),
            max_fee_per_gas: U256::from(1_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
        };
        let tx = call.bind(7, 688688);
        assert_eq!(tx.nonce, 7);
        assert_eq!(tx.chain_id, 688688);

        let typed = tx.to_typed(Address::repeat_byte(1));
        assert_eq!(typed.nonce(), Some(&U256::from(7)));
        assert_eq!(typed.gas(), Some(&U256::from(120_000)));
        assert_eq!(typed.to_addr(), Some(&Address::repeat_byte(9)));
    }
}
