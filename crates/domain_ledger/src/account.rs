//! Ledger accounts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// The four accounts every loan posts against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerAccount {
    BankCapital,
    Borrower,
    Recovery,
    Provisioning,
}

impl LedgerAccount {
    pub const ALL: [LedgerAccount; 4] = [
        LedgerAccount::BankCapital,
        LedgerAccount::Borrower,
        LedgerAccount::Recovery,
        LedgerAccount::Provisioning,
    ];

    /// Storage code
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerAccount::BankCapital => "BANK_CAPITAL",
            LedgerAccount::Borrower => "BORROWER",
            LedgerAccount::Recovery => "RECOVERY",
            LedgerAccount::Provisioning => "PROVISIONING",
        }
    }
}

impl fmt::Display for LedgerAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerAccount {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LedgerAccount::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| LedgerError::UnknownCode(s.to_string()))
    }
}
