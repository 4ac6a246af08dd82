//! Wallet ledger: per-address balances and an append-only transfer journal.
//!
//! - **domain**: wallets, transfers and the [`LedgerStore`](domain::ports::LedgerStore) port
//! - **application**: the transfer engine, read queries and initial population
//! - **infrastructure**: in-memory and RocksDB stores
//! - **interfaces**: the HTTP API

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
