use crate::domain::account::{Account, Address};
use crate::domain::ports::{ConflictClassifier, ErrorClass, LedgerStore, LedgerTransaction};
use crate::domain::transfer::{NewTransfer, TransferRecord};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, ErrorKind, IteratorMode, Options, Transaction,
    TransactionDB, TransactionDBOptions, TransactionOptions, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Column Family for wallet balances, keyed by address.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for the transfer journal, keyed by `(created_at micros, id)` big-endian.
pub const CF_TRANSFERS: &str = "transfers";

#[derive(Debug, Serialize, Deserialize)]
struct AccountRow {
    balance: i64,
}

/// A persistent ledger backed by a pessimistic RocksDB `TransactionDB`.
///
/// Row locks are RocksDB key locks taken with `get_for_update`. Deadlock detection is
/// enabled per transaction; both a detected deadlock (`Busy`) and an expired lock wait
/// (`TimedOut`) are classified as transient.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDBLedgerStore {
    db: Arc<TransactionDB>,
    next_id: Arc<AtomicI64>,
    lock_timeout: Duration,
}

impl RocksDBLedgerStore {
    /// Opens or creates a ledger at the specified path.
    ///
    /// Ensures that the required column families ("accounts" and "transfers") exist and
    /// resumes the journal id sequence after the highest stored id.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    /// * `lock_timeout` - How long a transaction waits for a row lock.
    pub fn open<P: AsRef<Path>>(path: P, lock_timeout: Duration) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(lock_timeout_millis(lock_timeout));

        let cf_accounts = ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default());
        let cf_transfers = ColumnFamilyDescriptor::new(CF_TRANSFERS, Options::default());

        let db: TransactionDB = TransactionDB::open_cf_descriptors(
            &opts,
            &txn_db_opts,
            path,
            vec![cf_accounts, cf_transfers],
        )?;

        let store = Self {
            db: Arc::new(db),
            next_id: Arc::new(AtomicI64::new(1)),
            lock_timeout,
        };
        let last_id = store.max_transfer_id()?;
        store.next_id.store(last_id + 1, Ordering::SeqCst);

        Ok(store)
    }

    fn cf(&self, name: &str) -> StoreResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Corrupt(format!("column family {name} not found")))
    }

    fn max_transfer_id(&self) -> StoreResult<i64> {
        let cf = self.cf(CF_TRANSFERS)?;
        let mut max_id = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            max_id = max_id.max(decode_transfer_id(&key)?);
        }
        Ok(max_id)
    }
}

/// Runs a RocksDB call that may park on a key lock for up to the lock timeout.
///
/// On a multi-thread runtime the calling worker hands its other tasks to a fresh worker
/// first, so a queue of waiters on one hot key never starves unrelated transfers or reads.
/// A current-thread runtime has no spare worker and runs `f` in place.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn lock_timeout_millis(timeout: Duration) -> i64 {
    i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX)
}

fn transfer_key(record: &TransferRecord) -> [u8; 16] {
    let micros = record.created_at.timestamp_micros().max(0) as u64;
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&micros.to_be_bytes());
    key[8..].copy_from_slice(&(record.id as u64).to_be_bytes());
    key
}

fn decode_transfer_id(key: &[u8]) -> StoreResult<i64> {
    let id_bytes: [u8; 8] = key
        .get(8..16)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| StoreError::Corrupt(format!("transfer key of {} bytes", key.len())))?;
    Ok(u64::from_be_bytes(id_bytes) as i64)
}

fn decode_address(key: &[u8]) -> StoreResult<Address> {
    let raw = std::str::from_utf8(key)
        .map_err(|e| StoreError::Corrupt(format!("account key is not utf-8: {e}")))?;
    Address::parse(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

impl ConflictClassifier for RocksDBLedgerStore {
    fn classify(&self, err: &StoreError) -> ErrorClass {
        match err {
            StoreError::Deadlock | StoreError::LockTimeout(_) => ErrorClass::Transient,
            StoreError::Backend(source) => match source.downcast_ref::<rocksdb::Error>() {
                Some(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain
                    ) =>
                {
                    ErrorClass::Transient
                }
                _ => ErrorClass::Fatal,
            },
            _ => ErrorClass::Fatal,
        }
    }
}

#[async_trait]
impl LedgerStore for RocksDBLedgerStore {
    async fn begin<'a>(&'a self) -> StoreResult<Box<dyn LedgerTransaction + 'a>> {
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_deadlock_detect(true);
        txn_opts.set_lock_timeout(lock_timeout_millis(self.lock_timeout));

        let txn = self.db.transaction_opt(&WriteOptions::default(), &txn_opts);
        Ok(Box::new(RocksDBTransaction {
            store: self,
            txn,
            locked: Vec::new(),
        }))
    }

    async fn balance(&self, address: &Address) -> StoreResult<Option<i64>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, address.as_str())? {
            Some(bytes) => {
                let row: AccountRow = serde_json::from_slice(&bytes)?;
                Ok(Some(row.balance))
            }
            None => Ok(None),
        }
    }

    async fn recent_transfers(&self, limit: usize) -> StoreResult<Vec<TransferRecord>> {
        let cf = self.cf(CF_TRANSFERS)?;
        let mut records = Vec::with_capacity(limit);
        for item in self.db.iterator_cf(cf, IteratorMode::End).take(limit) {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    async fn accounts(&self) -> StoreResult<Vec<Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let row: AccountRow = serde_json::from_slice(&value)?;
            accounts.push(Account::new(decode_address(&key)?, row.balance));
        }
        Ok(accounts)
    }

    async fn populate(&self, accounts: &[Account]) -> StoreResult<()> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let txn = self.db.transaction();
        for account in accounts {
            if account.balance < 0 {
                return Err(StoreError::ConstraintViolation(format!(
                    "negative starting balance for {}",
                    account.address
                )));
            }
            let existing =
                blocking(|| txn.get_for_update_cf(cf, account.address.as_str(), true))?;
            if existing.is_some() {
                return Err(StoreError::ConstraintViolation(format!(
                    "duplicate address {}",
                    account.address
                )));
            }
            let row = serde_json::to_vec(&AccountRow {
                balance: account.balance,
            })?;
            txn.put_cf(cf, account.address.as_str(), row)?;
        }
        blocking(|| txn.commit())?;
        Ok(())
    }
}

/// Transaction over [`RocksDBLedgerStore`]. Dropping it rolls back and releases key locks.
pub struct RocksDBTransaction<'a> {
    store: &'a RocksDBLedgerStore,
    txn: Transaction<'a, TransactionDB>,
    locked: Vec<Address>,
}

#[async_trait]
impl LedgerTransaction for RocksDBTransaction<'_> {
    async fn lock_accounts(&mut self, addresses: &[Address]) -> StoreResult<Vec<Account>> {
        let cf = self.store.cf(CF_ACCOUNTS)?;
        let mut rows = Vec::with_capacity(addresses.len());
        for address in addresses {
            if self.locked.contains(address) {
                continue;
            }
            // get_for_update locks the key even when it is absent.
            let txn = &self.txn;
            let value = blocking(|| txn.get_for_update_cf(cf, address.as_str(), true))?;
            self.locked.push(address.clone());
            if let Some(bytes) = value {
                let row: AccountRow = serde_json::from_slice(&bytes)?;
                rows.push(Account::new(address.clone(), row.balance));
            }
        }
        Ok(rows)
    }

    async fn set_balance(&mut self, address: &Address, balance: i64) -> StoreResult<()> {
        if !self.locked.contains(address) {
            return Err(StoreError::NotLocked(address.clone()));
        }
        if balance < 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "balance of {address} would become {balance}"
            )));
        }
        let cf = self.store.cf(CF_ACCOUNTS)?;
        let row = serde_json::to_vec(&AccountRow { balance })?;
        self.txn.put_cf(cf, address.as_str(), row)?;
        Ok(())
    }

    async fn append_transfer(&mut self, transfer: NewTransfer) -> StoreResult<TransferRecord> {
        if transfer.from == transfer.to {
            return Err(StoreError::ConstraintViolation(
                "transfer endpoints must differ".to_string(),
            ));
        }
        let cf = self.store.cf(CF_TRANSFERS)?;
        let id = self.store.next_id.fetch_add(1, Ordering::SeqCst);
        let record = TransferRecord::new(id, transfer, Utc::now());
        let value = serde_json::to_vec(&record)?;
        self.txn.put_cf(cf, transfer_key(&record), value)?;
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let txn = self.txn;
        blocking(|| txn.commit())?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.txn.rollback()?;
        Ok(())
    }
}
