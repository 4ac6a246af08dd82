use super::account::{Account, Address};
use super::transfer::{NewTransfer, TransferRecord};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::sync::Arc;

/// How the retry loop should treat a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Lock collision (deadlock, lock wait expiry). The whole attempt may be retried.
    Transient,
    /// Anything else. Surfaced as an internal error.
    Fatal,
}

/// Backend-specific recognition of transient lock conflicts.
pub trait ConflictClassifier {
    fn classify(&self, err: &StoreError) -> ErrorClass;
}

/// Durable record of wallet balances and the transfer journal.
#[async_trait]
pub trait LedgerStore: ConflictClassifier + Send + Sync {
    /// Opens a read-committed transaction.
    async fn begin<'a>(&'a self) -> StoreResult<Box<dyn LedgerTransaction + 'a>>;

    /// Committed balance of `address`, read without taking any lock.
    async fn balance(&self, address: &Address) -> StoreResult<Option<i64>>;

    /// Up to `limit` journal records, newest first (ties broken by higher id first).
    async fn recent_transfers(&self, limit: usize) -> StoreResult<Vec<TransferRecord>>;

    /// All committed accounts in address order.
    async fn accounts(&self) -> StoreResult<Vec<Account>>;

    /// Inserts the initial wallets in a single atomic write.
    async fn populate(&self, accounts: &[Account]) -> StoreResult<()>;
}

/// A unit of work against a [`LedgerStore`].
///
/// Writes are invisible to other readers until [`commit`](Self::commit). Dropping the
/// transaction without committing rolls it back and releases its row locks.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Takes exclusive row locks on the given addresses, in slice order, and returns the
    /// rows that exist with their balances as of lock acquisition. Missing rows are skipped.
    async fn lock_accounts(&mut self, addresses: &[Address]) -> StoreResult<Vec<Account>>;

    /// Stages a new balance for a row previously locked by this transaction.
    async fn set_balance(&mut self, address: &Address, balance: i64) -> StoreResult<()>;

    /// Stages a journal record; the store assigns its id and timestamp.
    async fn append_transfer(&mut self, transfer: NewTransfer) -> StoreResult<TransferRecord>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
