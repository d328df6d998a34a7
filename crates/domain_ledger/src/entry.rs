//! Ledger entry rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{LedgerEntryId, LoanId, Money};

use crate::account::LedgerAccount;
use crate::error::LedgerError;

/// Side of a posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "DEBIT",
            EntryType::Credit => "CREDIT",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBIT" => Ok(EntryType::Debit),
            "CREDIT" => Ok(EntryType::Credit),
            other => Err(LedgerError::UnknownCode(other.to_string())),
        }
    }
}

/// An immutable ledger row
///
/// Entries are only ever created by sealing a [`crate::JournalBatch`]; there is
/// no API to mutate or remove one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub loan_id: LoanId,
    pub entry_type: EntryType,
    pub account: LedgerAccount,
    /// Always positive; the side is carried by `entry_type`
    pub amount: Money,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn is_debit(&self) -> bool {
        self.entry_type == EntryType::Debit
    }

    pub fn is_credit(&self) -> bool {
        self.entry_type == EntryType::Credit
    }
}
