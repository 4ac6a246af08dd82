use super::account::{Address, Amount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A transfer about to be appended to the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

/// A completed transfer as recorded in the journal.
///
/// `id` and `created_at` are assigned by the store. Records are never updated or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: i64,
    pub from: Address,
    pub to: Address,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn new(id: i64, transfer: NewTransfer, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            from: transfer.from,
            to: transfer.to,
            amount: transfer.amount.value(),
            created_at,
        }
    }

    /// Journal ordering key: newest records sort last.
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.id)
    }
}
