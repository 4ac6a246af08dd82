//! Ledger entities and the storage port the application layer is written against.

pub mod account;
pub mod ports;
pub mod transfer;
