#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wallet_ledger::application::transfer::{RetryPolicy, TransferEngine};
use wallet_ledger::domain::account::{Account, Address};
use wallet_ledger::domain::ports::{
    ConflictClassifier, ErrorClass, LedgerStore, LedgerStoreRef, LedgerTransaction,
};
use wallet_ledger::domain::transfer::{NewTransfer, TransferRecord};
use wallet_ledger::error::{StoreError, StoreResult};
use wallet_ledger::infrastructure::in_memory::InMemoryLedgerStore;

/// Deterministic, distinct address for wallet `n`.
pub fn wallet(n: u32) -> Address {
    Address::parse(&format!("{n:064x}")).unwrap()
}

/// A fresh in-memory ledger holding one wallet per entry of `balances`.
pub async fn seeded_store(balances: &[i64]) -> (Arc<InMemoryLedgerStore>, Vec<Address>) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let addresses: Vec<Address> = (0..balances.len() as u32).map(wallet).collect();
    let accounts: Vec<Account> = addresses
        .iter()
        .zip(balances)
        .map(|(address, balance)| Account::new(address.clone(), *balance))
        .collect();
    store.populate(&accounts).await.unwrap();
    (store, addresses)
}

/// Retry schedule short enough to keep contention tests fast.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 10,
        base_backoff: Duration::from_millis(1),
        max_jitter: Duration::from_millis(2),
    }
}

pub fn engine(store: LedgerStoreRef) -> TransferEngine {
    TransferEngine::new(store, fast_policy())
}

pub async fn balance_of(store: &dyn LedgerStore, address: &Address) -> i64 {
    store.balance(address).await.unwrap().unwrap()
}

pub async fn total_balance(store: &dyn LedgerStore) -> i64 {
    store
        .accounts()
        .await
        .unwrap()
        .iter()
        .map(|a| a.balance)
        .sum()
}

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Deadlock,
    Fatal,
}

/// Wraps an in-memory ledger, failing the next `failures` lock requests with `fault`
/// and recording every lock request it sees. Commits can be slowed down to keep row
/// locks held for a fixed time.
pub struct ProbeStore {
    inner: InMemoryLedgerStore,
    fault: Fault,
    commit_delay: Duration,
    failures_left: AtomicU32,
    begins: AtomicU32,
    lock_requests: Mutex<Vec<Vec<Address>>>,
}

impl ProbeStore {
    pub async fn seeded(
        balances: &[i64],
        fault: Fault,
        failures: u32,
    ) -> (Arc<Self>, Vec<Address>) {
        let (inner, addresses) = seeded_store(balances).await;
        let probe = Self {
            inner: (*inner).clone(),
            fault,
            commit_delay: Duration::ZERO,
            failures_left: AtomicU32::new(failures),
            begins: AtomicU32::new(0),
            lock_requests: Mutex::new(Vec::new()),
        };
        (Arc::new(probe), addresses)
    }

    /// A fault-free ledger whose transactions hold their row locks for `delay` before
    /// committing.
    pub async fn with_commit_delay(
        balances: &[i64],
        delay: Duration,
    ) -> (Arc<Self>, Vec<Address>) {
        let (inner, addresses) = seeded_store(balances).await;
        let probe = Self {
            inner: (*inner).clone(),
            fault: Fault::Deadlock,
            commit_delay: delay,
            failures_left: AtomicU32::new(0),
            begins: AtomicU32::new(0),
            lock_requests: Mutex::new(Vec::new()),
        };
        (Arc::new(probe), addresses)
    }

    pub fn begins(&self) -> u32 {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn lock_requests(&self) -> Vec<Vec<Address>> {
        self.lock_requests.lock().unwrap().clone()
    }

    fn take_fault(&self) -> Option<StoreError> {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| match self.fault {
                Fault::Deadlock => StoreError::Deadlock,
                Fault::Fatal => StoreError::Backend(Box::new(std::io::Error::other(
                    "simulated disk failure",
                ))),
            })
    }
}

impl ConflictClassifier for ProbeStore {
    fn classify(&self, err: &StoreError) -> ErrorClass {
        self.inner.classify(err)
    }
}

#[async_trait]
impl LedgerStore for ProbeStore {
    async fn begin<'a>(&'a self) -> StoreResult<Box<dyn LedgerTransaction + 'a>> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.begin().await?;
        Ok(Box::new(ProbeTransaction { probe: self, inner }))
    }

    async fn balance(&self, address: &Address) -> StoreResult<Option<i64>> {
        self.inner.balance(address).await
    }

    async fn recent_transfers(&self, limit: usize) -> StoreResult<Vec<TransferRecord>> {
        self.inner.recent_transfers(limit).await
    }

    async fn accounts(&self) -> StoreResult<Vec<Account>> {
        self.inner.accounts().await
    }

    async fn populate(&self, accounts: &[Account]) -> StoreResult<()> {
        self.inner.populate(accounts).await
    }
}

struct ProbeTransaction<'a> {
    probe: &'a ProbeStore,
    inner: Box<dyn LedgerTransaction + 'a>,
}

#[async_trait]
impl LedgerTransaction for ProbeTransaction<'_> {
    async fn lock_accounts(&mut self, addresses: &[Address]) -> StoreResult<Vec<Account>> {
        self.probe
            .lock_requests
            .lock()
            .unwrap()
            .push(addresses.to_vec());
        if let Some(err) = self.probe.take_fault() {
            return Err(err);
        }
        self.inner.lock_accounts(addresses).await
    }

    async fn set_balance(&mut self, address: &Address, balance: i64) -> StoreResult<()> {
        self.inner.set_balance(address, balance).await
    }

    async fn append_transfer(&mut self, transfer: NewTransfer) -> StoreResult<TransferRecord> {
        self.inner.append_transfer(transfer).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if !self.probe.commit_delay.is_zero() {
            tokio::time::sleep(self.probe.commit_delay).await;
        }
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}
