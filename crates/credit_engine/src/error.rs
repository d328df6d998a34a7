//! Engine error taxonomy
//!
//! Callers see one of a small set of kinds plus a human readable detail. A
//! failed operation never leaves partial state: the unit of work is rolled
//! back before the error is returned.

use serde::Serialize;
use thiserror::Error;

use core_kernel::{Money, PortError};
use domain_credit::{CapBreach, CapKind, CreditError};
use domain_ledger::LedgerError;
use domain_lending::LendingError;

/// Coarse error category for mapping to an outer surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Expired,
    Validation,
    Forbidden,
    ExternalProvider,
    Storage,
    Internal,
}

/// Errors returned by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Wrong-state transition attempt
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The offer passed its expiry; it has been marked EXPIRED
    #[error("Expired: {0}")]
    Expired(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Exposure cap would be exceeded
    #[error(
        "{cap} exposure cap exceeded. Current: {current}, Requested: {requested}, Cap: {limit}"
    )]
    CapExceeded {
        cap: CapKind,
        current: Money,
        requested: Money,
        limit: Money,
    },

    /// Acting user does not own the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("External provider failure: {0}")]
    ExternalProvider(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        EngineError::Conflict(message.into())
    }

    /// Wraps a credit-bureau failure
    pub fn provider(err: PortError) -> Self {
        EngineError::ExternalProvider(err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Expired(_) => ErrorKind::Expired,
            EngineError::Validation(_) | EngineError::CapExceeded { .. } => ErrorKind::Validation,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::ExternalProvider(_) => ErrorKind::ExternalProvider,
            EngineError::Storage(_) => ErrorKind::Storage,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<CapBreach> for EngineError {
    fn from(breach: CapBreach) -> Self {
        EngineError::CapExceeded {
            cap: breach.cap,
            current: breach.current,
            requested: breach.requested,
            limit: breach.limit,
        }
    }
}

/// Store errors. Provider errors go through [`EngineError::provider`].
impl From<PortError> for EngineError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => {
                EngineError::NotFound { entity: entity_type, id }
            }
            PortError::Conflict { message } => EngineError::Conflict(message),
            PortError::Validation { message, .. } => EngineError::Validation(message),
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<CreditError> for EngineError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::InvalidInvoiceTransition { .. }
            | CreditError::InvalidOfferTransition { .. } => EngineError::Conflict(err.to_string()),
            CreditError::Validation(message) | CreditError::Normalization(message) => {
                EngineError::Validation(message)
            }
            CreditError::UnknownCode(_) | CreditError::Calculation(_) => {
                EngineError::Internal(err.to_string())
            }
        }
    }
}

impl From<LendingError> for EngineError {
    fn from(err: LendingError) -> Self {
        match err {
            LendingError::InvalidLoanTransition { .. }
            | LendingError::InvalidEmiTransition { .. }
            | LendingError::InvalidCollateralTransition { .. }
            | LendingError::InvalidRecoveryTransition { .. }
            | LendingError::AlreadyDisbursed => EngineError::Conflict(err.to_string()),
            LendingError::LoanNotInDefault(_) | LendingError::CollateralRequired(_) => {
                EngineError::Validation(err.to_string())
            }
            LendingError::Validation(message) => EngineError::Validation(message),
            LendingError::Calculation(_) => EngineError::Internal(err.to_string()),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        EngineError::Internal(format!("ledger posting rejected: {}", err))
    }
}
