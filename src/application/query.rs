use crate::domain::account::Address;
use crate::domain::ports::LedgerStoreRef;
use crate::domain::transfer::TransferRecord;
use crate::error::{LedgerError, Result};

/// Page size used when the caller gives no (or a non-positive) limit.
pub const DEFAULT_TRANSFER_LIMIT: usize = 10;

/// Hard cap on the number of transfers returned by one listing.
pub const MAX_TRANSFER_LIMIT: usize = 100;

/// Read-only access to balances and the transfer journal. Takes no row locks.
#[derive(Clone)]
pub struct QueryService {
    store: LedgerStoreRef,
}

impl QueryService {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    /// Committed balance of `address`, in minor units.
    pub async fn balance(&self, address: &Address) -> Result<i64> {
        self.store
            .balance(address)
            .await
            .map_err(LedgerError::Internal)?
            .ok_or(LedgerError::WalletNotFound)
    }

    /// Most recent transfers, newest first, with `limit` clamped by [`clamp_limit`].
    pub async fn recent_transfers(&self, limit: Option<i64>) -> Result<Vec<TransferRecord>> {
        self.store
            .recent_transfers(clamp_limit(limit))
            .await
            .map_err(LedgerError::Internal)
    }
}

/// `None` or `<= 0` selects the default page; anything above the cap is capped.
pub fn clamp_limit(limit: Option<i64>) -> usize {
    match limit {
        Some(n) if n > 0 => usize::try_from(n)
            .unwrap_or(MAX_TRANSFER_LIMIT)
            .min(MAX_TRANSFER_LIMIT),
        _ => DEFAULT_TRANSFER_LIMIT,
    }
}
