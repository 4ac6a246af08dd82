use crate::domain::transfer::TransferRecord;
use crate::error::LedgerError;
use chrono::SecondsFormat;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Minor units per major unit (two decimal places).
const MINOR_UNIT_SCALE: u32 = 2;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub status: String,
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub count: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferDto {
    pub id: i64,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub created_at: String,
}

impl From<TransferRecord> for TransferDto {
    fn from(record: TransferRecord) -> Self {
        Self {
            id: record.id,
            from: record.from.to_string(),
            to: record.to.to_string(),
            amount: format_minor_units(record.amount),
            created_at: record.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Renders minor units as a signed decimal with two places, e.g. `-1.05`.
pub fn format_minor_units(minor_units: i64) -> String {
    Decimal::new(minor_units, MINOR_UNIT_SCALE).to_string()
}

/// Converts a decimal amount to minor units. Sub-cent digits are truncated toward zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount.trunc().to_i64().unwrap_or(0)));
    }
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|scaled| scaled.trunc())
        .and_then(|scaled| scaled.to_i64())
        .ok_or(LedgerError::InvalidAmount(i64::MAX))
}
