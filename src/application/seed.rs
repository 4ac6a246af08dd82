use crate::domain::account::{Account, Address};
use crate::domain::ports::LedgerStore;
use crate::error::{LedgerError, Result};
use rand::rngs::OsRng;
use std::collections::BTreeSet;
use tracing::info;

/// Number of wallets created on first start.
pub const DEFAULT_WALLETS: usize = 10;

/// Starting balance of every seeded wallet, in minor units (100.00).
pub const DEFAULT_STARTING_BALANCE: i64 = 10_000;

/// One-time initial population.
///
/// Does nothing and returns an empty list when the store already holds accounts.
/// Otherwise inserts `count` wallets with random addresses and `starting_balance`
/// each, in a single atomic write, and returns their addresses.
pub async fn populate_initial_wallets(
    store: &dyn LedgerStore,
    count: usize,
    starting_balance: i64,
) -> Result<Vec<Address>> {
    if starting_balance < 0 {
        return Err(LedgerError::InvalidAmount(starting_balance));
    }

    let existing = store.accounts().await.map_err(LedgerError::Internal)?;
    if !existing.is_empty() {
        info!(wallets = existing.len(), "ledger already populated, skipping seed");
        return Ok(Vec::new());
    }

    let mut addresses = BTreeSet::new();
    while addresses.len() < count {
        addresses.insert(Address::generate(&mut OsRng));
    }
    let addresses: Vec<Address> = addresses.into_iter().collect();

    let accounts: Vec<Account> = addresses
        .iter()
        .map(|address| Account::new(address.clone(), starting_balance))
        .collect();
    store
        .populate(&accounts)
        .await
        .map_err(LedgerError::Internal)?;

    if let Some(first) = addresses.first() {
        info!(
            wallets = addresses.len(),
            starting_balance,
            first = %first,
            "seeded initial wallets"
        );
    }
    Ok(addresses)
}

/// Sum of all balances, widened so a large seed cannot overflow it.
pub fn total_balance(accounts: &[Account]) -> i128 {
    accounts.iter().map(|a| i128::from(a.balance)).sum()
}
