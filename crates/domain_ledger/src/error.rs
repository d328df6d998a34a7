//! Ledger domain errors

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while assembling or reading ledger postings
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Balanced batch whose debit and credit totals differ
    #[error("Unbalanced batch: debits={debits}, credits={credits}")]
    UnbalancedBatch {
        debits: Decimal,
        credits: Decimal,
    },

    /// A batch with no postings
    #[error("Empty batch: {0}")]
    EmptyBatch(String),

    /// Zero or negative posting amount
    #[error("Invalid posting: {0}")]
    InvalidPosting(String),

    /// Memo batch with more than one leg
    #[error("Memo batch must carry exactly one posting, found {0}")]
    MemoShape(usize),

    /// Arithmetic error (currency mismatch)
    #[error("Calculation error: {0}")]
    CalculationError(String),

    /// Unknown account or entry type code read from storage
    #[error("Unknown code: {0}")]
    UnknownCode(String),
}

impl From<core_kernel::MoneyError> for LedgerError {
    fn from(err: core_kernel::MoneyError) -> Self {
        LedgerError::CalculationError(err.to_string())
    }
}
