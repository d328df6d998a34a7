//! Credit domain errors

use thiserror::Error;

use core_kernel::MoneyError;

use crate::invoice::InvoiceStatus;
use crate::offer::OfferStatus;

/// Errors that can occur in the credit domain
#[derive(Debug, Error, PartialEq)]
pub enum CreditError {
    /// Invoice status change not allowed by the lifecycle
    #[error("Invalid invoice transition from {from} to {to}")]
    InvalidInvoiceTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    /// Offer status change not allowed by the lifecycle
    #[error("Invalid offer transition from {from} to {to}")]
    InvalidOfferTransition {
        from: OfferStatus,
        to: OfferStatus,
    },

    /// Input failed a domain rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// External payload could not be mapped to an internal shape
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// Unknown status or grade code read from storage
    #[error("Unknown code: {0}")]
    UnknownCode(String),

    /// Arithmetic error
    #[error("Calculation error: {0}")]
    Calculation(String),
}

impl CreditError {
    pub fn validation(message: impl Into<String>) -> Self {
        CreditError::Validation(message.into())
    }
}

impl From<MoneyError> for CreditError {
    fn from(err: MoneyError) -> Self {
        CreditError::Calculation(err.to_string())
    }
}
