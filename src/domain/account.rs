use crate::error::LedgerError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of raw bytes behind an address.
pub const ADDRESS_BYTES: usize = 32;

/// Length of the hex-encoded address.
pub const ADDRESS_LEN: usize = ADDRESS_BYTES * 2;

/// Opaque wallet identifier: 64 hexadecimal characters.
///
/// Ordering is plain lexicographic byte order. The transfer engine relies on it
/// as the total order for row locks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        if raw.len() == ADDRESS_LEN && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(LedgerError::MalformedAddress(raw.to_string()))
        }
    }

    /// Draws a fresh address from `rng`.
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; ADDRESS_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// A strictly positive amount of minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(i64);

impl Amount {
    pub fn new(minor_units: i64) -> Result<Self, LedgerError> {
        if minor_units > 0 {
            Ok(Self(minor_units))
        } else {
            Err(LedgerError::InvalidAmount(minor_units))
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Amount {
    type Error = LedgerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// A wallet row: address and its balance in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: i64,
}

impl Account {
    pub fn new(address: Address, balance: i64) -> Self {
        Self { address, balance }
    }
}
