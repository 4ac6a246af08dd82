use crate::domain::account::{Account, Address};
use crate::domain::ports::{ConflictClassifier, ErrorClass, LedgerStore, LedgerTransaction};
use crate::domain::transfer::{NewTransfer, TransferRecord};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Default time a transaction waits for a row lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Committed ledger contents. Guarded as a whole so a commit becomes visible atomically.
#[derive(Default)]
struct Committed {
    balances: BTreeMap<Address, i64>,
    journal: BTreeMap<(DateTime<Utc>, i64), TransferRecord>,
}

struct Shared {
    committed: RwLock<Committed>,
    row_locks: RwLock<HashMap<Address, Arc<Mutex<()>>>>,
    next_id: AtomicI64,
    lock_timeout: Duration,
}

/// A thread-safe in-memory ledger with per-row exclusive locks.
///
/// Row locks are fair `tokio` mutexes, so waiting for one is an ordinary await point and
/// can be abandoned by dropping the future. A wait longer than the configured lock timeout
/// fails with [`StoreError::LockTimeout`], which this store classifies as transient.
#[derive(Clone)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                committed: RwLock::new(Committed::default()),
                row_locks: RwLock::new(HashMap::new()),
                next_id: AtomicI64::new(1),
                lock_timeout,
            }),
        }
    }
}

impl ConflictClassifier for InMemoryLedgerStore {
    fn classify(&self, err: &StoreError) -> ErrorClass {
        match err {
            StoreError::Deadlock | StoreError::LockTimeout(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin<'a>(&'a self) -> StoreResult<Box<dyn LedgerTransaction + 'a>> {
        Ok(Box::new(InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            _row_guards: Vec::new(),
            locked: Vec::new(),
            staged_balances: BTreeMap::new(),
            staged_transfers: Vec::new(),
        }))
    }

    async fn balance(&self, address: &Address) -> StoreResult<Option<i64>> {
        let committed = self.shared.committed.read().await;
        Ok(committed.balances.get(address).copied())
    }

    async fn recent_transfers(&self, limit: usize) -> StoreResult<Vec<TransferRecord>> {
        let committed = self.shared.committed.read().await;
        Ok(committed
            .journal
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn accounts(&self) -> StoreResult<Vec<Account>> {
        let committed = self.shared.committed.read().await;
        Ok(committed
            .balances
            .iter()
            .map(|(address, balance)| Account::new(address.clone(), *balance))
            .collect())
    }

    async fn populate(&self, accounts: &[Account]) -> StoreResult<()> {
        let mut row_locks = self.shared.row_locks.write().await;
        let mut committed = self.shared.committed.write().await;

        for account in accounts {
            if account.balance < 0 {
                return Err(StoreError::ConstraintViolation(format!(
                    "negative starting balance for {}",
                    account.address
                )));
            }
            if committed.balances.contains_key(&account.address) {
                return Err(StoreError::ConstraintViolation(format!(
                    "duplicate address {}",
                    account.address
                )));
            }
        }

        for account in accounts {
            committed
                .balances
                .insert(account.address.clone(), account.balance);
            row_locks.insert(account.address.clone(), Arc::new(Mutex::new(())));
        }
        Ok(())
    }
}

/// Transaction over [`InMemoryLedgerStore`].
///
/// Writes are staged locally and published under the committed-state write lock, so
/// readers see either none or all of them. Row guards are released on drop.
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    _row_guards: Vec<OwnedMutexGuard<()>>,
    locked: Vec<Address>,
    staged_balances: BTreeMap<Address, i64>,
    staged_transfers: Vec<TransferRecord>,
}

impl InMemoryTransaction {
    fn ensure_locked(&self, address: &Address) -> StoreResult<()> {
        if self.locked.contains(address) {
            Ok(())
        } else {
            Err(StoreError::NotLocked(address.clone()))
        }
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn lock_accounts(&mut self, addresses: &[Address]) -> StoreResult<Vec<Account>> {
        let mut rows = Vec::with_capacity(addresses.len());

        for address in addresses {
            if self.locked.contains(address) {
                continue;
            }

            let lock = {
                let row_locks = self.shared.row_locks.read().await;
                match row_locks.get(address) {
                    Some(lock) => Arc::clone(lock),
                    None => continue,
                }
            };

            let timeout = self.shared.lock_timeout;
            let guard = tokio::time::timeout(timeout, lock.lock_owned())
                .await
                .map_err(|_| StoreError::LockTimeout(timeout))?;
            self._row_guards.push(guard);
            self.locked.push(address.clone());

            // Balance is read only after the row lock is held.
            let committed = self.shared.committed.read().await;
            let balance = committed.balances.get(address).copied().ok_or_else(|| {
                StoreError::Corrupt(format!("row lock exists without balance for {address}"))
            })?;
            rows.push(Account::new(address.clone(), balance));
        }

        Ok(rows)
    }

    async fn set_balance(&mut self, address: &Address, balance: i64) -> StoreResult<()> {
        self.ensure_locked(address)?;
        if balance < 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "balance of {address} would become {balance}"
            )));
        }
        self.staged_balances.insert(address.clone(), balance);
        Ok(())
    }

    async fn append_transfer(&mut self, transfer: NewTransfer) -> StoreResult<TransferRecord> {
        if transfer.from == transfer.to {
            return Err(StoreError::ConstraintViolation(
                "transfer endpoints must differ".to_string(),
            ));
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let record = TransferRecord::new(id, transfer, Utc::now());
        self.staged_transfers.push(record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        let mut committed = this.shared.committed.write().await;
        for (address, balance) in std::mem::take(&mut this.staged_balances) {
            committed.balances.insert(address, balance);
        }
        for record in std::mem::take(&mut this.staged_transfers) {
            committed.journal.insert(record.order_key(), record);
        }
        drop(committed);
        // Row guards drop with `this`, after the new state is visible.
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        tracing::trace!(
            discarded_writes = self.staged_balances.len(),
            "rolling back in-memory transaction"
        );
        Ok(())
    }
}
