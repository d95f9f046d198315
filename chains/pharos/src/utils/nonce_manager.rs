//! Nonce Tracker - per-account transaction sequence numbers
//!
//! Holds the next nonce for every account address that has been seeded in
//! this process.
//!
//! # Lifecycle
//!
//! 1. **Seed**: once per account per pass, from the chain's pending
//!    transaction count, before anything is submitted
//! 2. **Lease**: the submitter locks the account's slot and reads the nonce
//! 3. **Advance**: only after the network accepted the broadcast, exactly once
//!
//! A send that never reaches acceptance drops the lease without advancing, so
//! the same nonce is offered to the next transaction.
//!
//! # Thread Safety
//!
//! Every address has its own [`tokio::sync::Mutex`]. Callers for the same
//! account are serialized for the whole send phase; different accounts never
//! contend. The outer map lock is only held to look up or create a slot.

use core_logic::WorkflowError;
use ethers::types::Address;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

type Slot = Arc<AsyncMutex<Option<u64>>>;

#[derive(Debug, Default)]
pub struct NonceTracker {
    slots: Mutex<HashMap<Address, Slot>>,
}

impl NonceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, address: Address) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(address).or_default().clone()
    }

    /// Seeds the account from the chain's pending count and returns the nonce
    /// that will be used next.
    ///
    /// When a later pass re-seeds an account the larger of the local value
    /// and the pending count wins, so the sequence never goes backwards.
    pub async fn seed(&self, address: Address, pending: u64) -> u64 {
        let slot = self.slot(address);
        let mut current = slot.lock().await;

        let seeded = match *current {
            Some(local) if local > pending => {
                warn!(
                    "Pending nonce {} for {:?} is behind local {}, keeping local",
                    pending, address, local
                );
                local
            }
            _ => pending,
        };
        *current = Some(seeded);
        debug!("Nonce for {:?} seeded at {}", address, seeded);
        seeded
    }

    /// Value the next transaction would use, `None` when never seeded.
    pub async fn current(&self, address: Address) -> Option<u64> {
        let slot = self.slot(address);
        let current = *slot.lock().await;
        current
    }

    /// Returns the nonce for the next transaction without consuming it.
    pub async fn next(&self, address: Address) -> Result<u64, WorkflowError> {
        self.current(address).await.ok_or_else(|| unseeded(address))
    }

    /// Consumes the current nonce. Called once per accepted broadcast.
    pub async fn advance(&self, address: Address) -> Result<u64, WorkflowError> {
        let mut lease = self.lease(address).await?;
        lease.advance();
        Ok(lease.nonce())
    }

    /// Locks the account's slot until the lease is dropped.
    ///
    /// Holding the lease across sign and broadcast keeps two submissions for
    /// the same account from reading the same nonce.
    pub async fn lease(&self, address: Address) -> Result<NonceLease, WorkflowError> {
        let guard = self.slot(address).lock_owned().await;
        match *guard {
            Some(_) => Ok(NonceLease { guard }),
            None => Err(unseeded(address)),
        }
    }
}

fn unseeded(address: Address) -> WorkflowError {
    WorkflowError::precondition(format!("nonce for {:?} was never seeded", address))
}

/// Exclusive access to one account's nonce.
pub struct NonceLease {
    guard: OwnedMutexGuard<Option<u64>>,
}

impl NonceLease {
    pub fn nonce(&self) -> u64 {
        (*self.guard).unwrap_or_default()
    }

    pub fn advance(&mut self) {
        let next = self.nonce().saturating_add(1);
        *self.guard = Some(next);
    }
}
