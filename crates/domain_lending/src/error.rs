//! Lending domain errors

use thiserror::Error;

use core_kernel::MoneyError;

use crate::collateral::CollateralStatus;
use crate::emi::EmiStatus;
use crate::loan::LoanStatus;
use crate::recovery::RecoveryStatus;

/// Errors that can occur in the lending domain
#[derive(Debug, Error, PartialEq)]
pub enum LendingError {
    #[error("Invalid loan transition from {from} to {to}")]
    InvalidLoanTransition { from: LoanStatus, to: LoanStatus },

    #[error("Invalid EMI transition from {from} to {to}")]
    InvalidEmiTransition { from: EmiStatus, to: EmiStatus },

    #[error("Invalid collateral transition from {from} to {to}")]
    InvalidCollateralTransition {
        from: CollateralStatus,
        to: CollateralStatus,
    },

    #[error("Invalid recovery transition from {from} to {to}")]
    InvalidRecoveryTransition {
        from: RecoveryStatus,
        to: RecoveryStatus,
    },

    /// Recovery is only possible for defaulted loans
    #[error("Loan is {0}, recovery requires DEFAULT")]
    LoanNotInDefault(LoanStatus),

    /// Secured loans need a described, positively valued asset
    #[error("Collateral required: {0}")]
    CollateralRequired(String),

    /// Loan has already been disbursed
    #[error("Loan already disbursed")]
    AlreadyDisbursed,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Calculation error: {0}")]
    Calculation(String),
}

impl LendingError {
    pub fn validation(message: impl Into<String>) -> Self {
        LendingError::Validation(message.into())
    }
}

impl From<MoneyError> for LendingError {
    fn from(err: MoneyError) -> Self {
        LendingError::Calculation(err.to_string())
    }
}
