use crate::domain::account::{Account, Address, Amount};
use crate::domain::ports::{ErrorClass, LedgerStore, LedgerStoreRef, LedgerTransaction};
use crate::domain::transfer::{NewTransfer, TransferRecord};
use crate::error::{LedgerError, Result, StoreError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Bounded retry schedule for transient lock conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Linear backoff step: the wait after attempt `n` starts at `base_backoff * n`.
    pub base_backoff: Duration,
    /// Upper bound (exclusive) of the random jitter added to every wait.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_backoff: Duration::from_millis(15),
            max_jitter: Duration::from_millis(15),
        }
    }
}

impl RetryPolicy {
    /// Wait before retrying after failed attempt `attempt` (1-based).
    pub fn backoff<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.gen_range(0..jitter_ms))
        };
        self.base_backoff.saturating_mul(attempt) + jitter
    }
}

/// Why a single attempt did not commit.
enum AttemptError {
    /// Business outcome; final, never retried.
    Rejected(LedgerError),
    /// Storage failure; the store's classifier decides whether to retry.
    Store(StoreError),
}

impl From<StoreError> for AttemptError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Moves value between two wallets.
///
/// Each attempt runs in one store transaction that locks both rows in ascending address
/// order, so two transfers over the same pair (in either direction) always request their
/// locks in the same sequence. Transient store conflicts restart the whole attempt after a
/// growing, jittered backoff, up to [`RetryPolicy::max_attempts`].
pub struct TransferEngine {
    store: LedgerStoreRef,
    policy: RetryPolicy,
    rng: Mutex<StdRng>,
}

impl TransferEngine {
    pub fn new(store: LedgerStoreRef, policy: RetryPolicy) -> Self {
        Self::with_rng(store, policy, StdRng::from_entropy())
    }

    /// Creates an engine with an explicit jitter source, for reproducible schedules.
    pub fn with_rng(store: LedgerStoreRef, policy: RetryPolicy, rng: StdRng) -> Self {
        Self {
            store,
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
            rng: Mutex::new(rng),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Transfers `amount` minor units from `from` to `to`.
    ///
    /// Validation happens before any storage access. If `deadline` passes while waiting for
    /// a row lock or between retries, the attempt is abandoned (its transaction rolled back)
    /// and [`LedgerError::Timeout`] is returned.
    #[tracing::instrument(skip_all, fields(from = %from, to = %to, amount = amount))]
    pub async fn transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: i64,
        deadline: Option<Instant>,
    ) -> Result<TransferRecord> {
        if from == to {
            return Err(LedgerError::SameAddress);
        }
        let amount = Amount::new(amount)?;

        let max_attempts = self.policy.max_attempts;
        for attempt in 1..=max_attempts {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(LedgerError::Timeout);
            }

            let outcome = match deadline {
                Some(d) => tokio::time::timeout_at(d, self.attempt(from, to, amount))
                    .await
                    .map_err(|_| LedgerError::Timeout)?,
                None => self.attempt(from, to, amount).await,
            };

            let err = match outcome {
                Ok(record) => {
                    debug!(attempt, id = record.id, "transfer committed");
                    return Ok(record);
                }
                Err(AttemptError::Rejected(err)) => {
                    debug!(attempt, error = %err, "transfer rejected");
                    return Err(err);
                }
                Err(AttemptError::Store(err)) => err,
            };

            if self.store.classify(&err) == ErrorClass::Fatal {
                return Err(LedgerError::Internal(err));
            }
            if attempt == max_attempts {
                warn!(attempts = attempt, error = %err, "transfer retry budget exhausted");
                break;
            }

            let delay = self.next_backoff(attempt);
            warn!(attempt, ?delay, error = %err, "transient lock conflict, retrying");
            match deadline {
                Some(d) if Instant::now() + delay >= d => {
                    tokio::time::sleep_until(d).await;
                    return Err(LedgerError::Timeout);
                }
                _ => tokio::time::sleep(delay).await,
            }
        }

        Err(LedgerError::ContentionExhausted {
            attempts: max_attempts,
        })
    }

    fn next_backoff(&self, attempt: u32) -> Duration {
        match self.rng.lock() {
            Ok(mut rng) => self.policy.backoff(attempt, &mut *rng),
            Err(poisoned) => self.policy.backoff(attempt, &mut *poisoned.into_inner()),
        }
    }

    async fn attempt(
        &self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> std::result::Result<TransferRecord, AttemptError> {
        let store: &dyn LedgerStore = &*self.store;
        let mut tx = store.begin().await?;

        match apply(tx.as_mut(), from, to, amount).await {
            Ok(record) => {
                tx.commit().await?;
                Ok(record)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Returns the pair in lock order (ascending address), regardless of transfer direction.
pub fn lock_order(a: &Address, b: &Address) -> [Address; 2] {
    if a <= b {
        [a.clone(), b.clone()]
    } else {
        [b.clone(), a.clone()]
    }
}

async fn apply(
    tx: &mut (dyn LedgerTransaction + '_),
    from: &Address,
    to: &Address,
    amount: Amount,
) -> std::result::Result<TransferRecord, AttemptError> {
    let rows = tx.lock_accounts(&lock_order(from, to)).await?;
    if rows.len() < 2 {
        return Err(AttemptError::Rejected(LedgerError::WalletNotFound));
    }

    let sender = find(&rows, from)?;
    let receiver = find(&rows, to)?;
    if sender < amount.value() {
        return Err(AttemptError::Rejected(LedgerError::InsufficientFunds {
            available: sender,
            requested: amount.value(),
        }));
    }
    let credited = receiver.checked_add(amount.value()).ok_or_else(|| {
        StoreError::ConstraintViolation(format!("balance of {to} would overflow"))
    })?;

    tx.set_balance(from, sender - amount.value()).await?;
    tx.set_balance(to, credited).await?;
    let record = tx
        .append_transfer(NewTransfer {
            from: from.clone(),
            to: to.clone(),
            amount,
        })
        .await?;
    Ok(record)
}

fn find(rows: &[Account], address: &Address) -> std::result::Result<i64, AttemptError> {
    rows.iter()
        .find(|row| &row.address == address)
        .map(|row| row.balance)
        .ok_or(AttemptError::Rejected(LedgerError::WalletNotFound))
}
