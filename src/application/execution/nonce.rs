//! Per-wallet nonce serialization.
//!
//! Every submission for a wallet holds that wallet's slot for the whole
//! approve, submit and confirm sequence, so concurrently decided trades
//! never race for a nonce. Different wallets proceed in parallel.

use std::sync::Arc;

use alloy_primitives::Address;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::Result;
use crate::port::DexRouter;

/// Locally tracked nonce for one wallet.
#[derive(Debug, Default)]
pub struct NonceSlot {
    next: Option<u64>,
}

impl NonceSlot {
    /// The next nonce to use, fetched from the chain when unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending nonce cannot be fetched.
    pub async fn current(&mut self, dex: &dyn DexRouter) -> Result<u64> {
        if let Some(next) = self.next {
            return Ok(next);
        }
        let next = dex.pending_nonce().await?;
        self.next = Some(next);
        Ok(next)
    }

    /// Record that `nonce` was consumed on chain.
    pub fn consumed(&mut self, nonce: u64) {
        self.next = Some(nonce + 1);
    }

    /// Forget the cached nonce so the next call refetches it.
    pub fn reset(&mut self) {
        self.next = None;
    }
}

/// Registry of per-wallet nonce slots.
#[derive(Default)]
pub struct NonceManager {
    slots: DashMap<(u64, Address), Arc<Mutex<NonceSlot>>>,
}

impl NonceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive use of the wallet's nonce sequence on `chain_id`.
    pub async fn acquire(&self, chain_id: u64, wallet: Address) -> OwnedMutexGuard<NonceSlot> {
        let slot = self
            .slots
            .entry((chain_id, wallet))
            .or_default()
            .value()
            .clone();
        slot.lock_owned().await
    }
}
