//! Adapters that expose the ledger to the outside world.

pub mod http;
