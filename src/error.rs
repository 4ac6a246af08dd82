use crate::domain::account::Address;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcomes of ledger operations, as seen by the boundary layer.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("from must differ from to")]
    SameAddress,
    #[error("amount must be > 0, got {0}")]
    InvalidAmount(i64),
    #[error("invalid address format: {0:?}")]
    MalformedAddress(String),
    #[error("wallet not found")]
    WalletNotFound,
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },
    #[error("operation deadline exceeded")]
    Timeout,
    #[error("transfer abandoned after {attempts} conflicting attempts")]
    ContentionExhausted { attempts: u32 },
    #[error("internal storage failure: {0}")]
    Internal(#[source] StoreError),
}

/// Coarse classes used to decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    Cancelled,
    ContentionExhausted,
    Fatal,
}

impl LedgerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SameAddress | Self::InvalidAmount(_) | Self::MalformedAddress(_) => {
                ErrorCategory::Validation
            }
            Self::WalletNotFound => ErrorCategory::NotFound,
            Self::InsufficientFunds { .. } => ErrorCategory::Conflict,
            Self::Timeout => ErrorCategory::Cancelled,
            Self::ContentionExhausted { .. } => ErrorCategory::ContentionExhausted,
            Self::Internal(_) => ErrorCategory::Fatal,
        }
    }
}

/// Failures reported by a ledger store backend.
///
/// Whether a given error is worth retrying is decided by the backend's
/// [`ConflictClassifier`](crate::domain::ports::ConflictClassifier), not here.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("deadlock detected")]
    Deadlock,
    #[error("row lock not granted within {0:?}")]
    LockTimeout(Duration),
    #[error("row {0} is not locked by this transaction")]
    NotLocked(Address),
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),
    #[error("corrupt ledger data: {0}")]
    Corrupt(String),
    #[error("storage backend error: {0}")]
    Backend(#[source] BoxError),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Backend(Box::new(err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}
