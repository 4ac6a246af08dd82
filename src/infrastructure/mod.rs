//! Concrete [`LedgerStore`](crate::domain::ports::LedgerStore) backends.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
