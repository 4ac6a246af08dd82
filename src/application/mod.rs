//! Application layer containing the ledger's use cases.
//!
//! [`TransferEngine`](transfer::TransferEngine) is the only writer of balances after the
//! one-time population in [`seed`]. [`QueryService`](query::QueryService) is read-only.
//! Both are written against the [`LedgerStore`](crate::domain::ports::LedgerStore) port
//! and share no state beyond the store itself.

pub mod query;
pub mod seed;
pub mod transfer;
