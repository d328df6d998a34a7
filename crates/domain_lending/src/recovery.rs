//! Recovery actions on defaulted loans
//!
//! A completed action posts one RECOVERY credit for the recovered amount. The
//! loan itself stays in DEFAULT; there is no settled terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{LoanId, Money, RecoveryId};

use crate::error::LendingError;
use crate::loan::{Loan, LoanStatus};

core_kernel::code_enum! {
    /// Kind of recovery effort
    pub enum RecoveryActionType {
        CollateralSeizure => "COLLATERAL_SEIZURE",
        LegalNotice => "LEGAL_NOTICE",
        Settlement => "SETTLEMENT",
        WriteOff => "WRITE_OFF",
    }
}

core_kernel::code_enum! {
    /// Recovery progress
    pub enum RecoveryStatus {
        Initiated => "INITIATED",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
        Failed => "FAILED",
    }
}

impl RecoveryActionType {
    pub fn parse(code: &str) -> Result<Self, LendingError> {
        Self::parse_code(code).ok_or_else(|| {
            LendingError::validation(format!("unknown recovery action type {}", code))
        })
    }
}

impl RecoveryStatus {
    pub fn can_transition_to(&self, next: RecoveryStatus) -> bool {
        use RecoveryStatus::*;
        matches!(
            (self, next),
            (Initiated, InProgress)
                | (Initiated, Completed)
                | (Initiated, Failed)
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RecoveryStatus::Completed | RecoveryStatus::Failed)
    }

    pub fn parse(code: &str) -> Result<Self, LendingError> {
        Self::parse_code(code)
            .ok_or_else(|| LendingError::validation(format!("unknown recovery status {}", code)))
    }
}

/// One recovery effort against a defaulted loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub id: RecoveryId,
    pub loan_id: LoanId,
    pub action_type: RecoveryActionType,
    pub status: RecoveryStatus,
    pub amount_recovered: Money,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecoveryAction {
    /// Opens an action
    ///
    /// # Errors
    ///
    /// Returns `LoanNotInDefault` unless the loan is in DEFAULT.
    pub fn initiate(
        loan: &Loan,
        action_type: RecoveryActionType,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, LendingError> {
        if loan.status != LoanStatus::Default {
            return Err(LendingError::LoanNotInDefault(loan.status));
        }
        Ok(Self {
            id: RecoveryId::new_v7(),
            loan_id: loan.id,
            action_type,
            status: RecoveryStatus::Initiated,
            amount_recovered: Money::zero(loan.principal.currency()),
            notes: notes.filter(|n| !n.trim().is_empty()),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), LendingError> {
        self.transition_to(RecoveryStatus::InProgress, now)
    }

    /// Completes the action with the recovered amount
    pub fn complete(&mut self, amount: Money, now: DateTime<Utc>) -> Result<(), LendingError> {
        if !amount.is_positive() {
            return Err(LendingError::validation(format!(
                "recovered amount must be positive, got {}",
                amount
            )));
        }
        self.transition_to(RecoveryStatus::Completed, now)?;
        self.amount_recovered = amount.round_to_currency();
        Ok(())
    }

    /// Marks the action failed, appending the reason to the notes
    pub fn fail(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<(), LendingError> {
        self.transition_to(RecoveryStatus::Failed, now)?;
        if let Some(reason) = reason.filter(|r| !r.trim().is_empty()) {
            self.notes = Some(match self.notes.take() {
                Some(existing) => format!("{}\n{}", existing, reason),
                None => reason,
            });
        }
        Ok(())
    }

    fn transition_to(
        &mut self,
        next: RecoveryStatus,
        now: DateTime<Utc>,
    ) -> Result<(), LendingError> {
        if !self.status.can_transition_to(next) {
            return Err(LendingError::InvalidRecoveryTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
