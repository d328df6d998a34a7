//! Loan aggregate
//!
//! ```text
//! SANCTIONED ──► ACTIVE ──► CLOSED
//!                   │
//!                   └─────► DEFAULT
//! ```
//!
//! Status only moves forward; a closed or defaulted loan never becomes
//! active again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{BusinessId, InvoiceId, LoanId, Money, OfferId};
use domain_credit::{Invoice, LoanType, Offer};

use crate::error::LendingError;

core_kernel::code_enum! {
    /// Loan lifecycle state
    pub enum LoanStatus {
        Sanctioned => "SANCTIONED",
        Active => "ACTIVE",
        Closed => "CLOSED",
        Default => "DEFAULT",
    }
}

impl LoanStatus {
    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Sanctioned, Active) | (Active, Closed) | (Active, Default)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Closed | LoanStatus::Default)
    }

    /// Loans whose disbursed amount counts as outstanding exposure
    pub fn counts_toward_exposure(&self) -> bool {
        matches!(self, LoanStatus::Sanctioned | LoanStatus::Active)
    }

    pub fn parse(code: &str) -> Result<Self, LendingError> {
        Self::parse_code(code)
            .ok_or_else(|| LendingError::validation(format!("unknown loan status {}", code)))
    }
}

/// A loan financing one invoice through one accepted offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub offer_id: OfferId,
    pub invoice_id: InvoiceId,
    pub business_id: BusinessId,
    pub loan_type: LoanType,
    pub status: LoanStatus,
    pub principal: Money,
    /// Zero until disbursement, then equal to the principal
    pub disbursed_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// Creates a SANCTIONED loan for `offer` against `invoice`
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the offer does not belong to the invoice or the
    /// resulting principal is not positive.
    pub fn sanction(
        offer: &Offer,
        invoice: &Invoice,
        now: DateTime<Utc>,
    ) -> Result<Self, LendingError> {
        if offer.invoice_id != invoice.id {
            return Err(LendingError::validation(format!(
                "offer {} is not for invoice {}",
                offer.id, invoice.id
            )));
        }
        let principal = offer.principal_for(&invoice.amount);
        if !principal.is_positive() {
            return Err(LendingError::validation("loan principal must be positive"));
        }

        Ok(Self {
            id: LoanId::new_v7(),
            offer_id: offer.id,
            invoice_id: invoice.id,
            business_id: invoice.business_id,
            loan_type: offer.loan_type,
            status: LoanStatus::Sanctioned,
            disbursed_amount: Money::zero(principal.currency()),
            principal,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn requires_collateral(&self) -> bool {
        self.loan_type == LoanType::Secured
    }

    /// Sets the disbursed amount (exactly once) and activates the loan
    ///
    /// Returns the amount disbursed.
    pub fn disburse(&mut self, now: DateTime<Utc>) -> Result<Money, LendingError> {
        if !self.disbursed_amount.is_zero() {
            return Err(LendingError::AlreadyDisbursed);
        }
        self.transition_to(LoanStatus::Active, now)?;
        self.disbursed_amount = self.principal;
        Ok(self.disbursed_amount)
    }

    pub fn close(&mut self, now: DateTime<Utc>) -> Result<(), LendingError> {
        self.transition_to(LoanStatus::Closed, now)
    }

    pub fn mark_default(&mut self, now: DateTime<Utc>) -> Result<(), LendingError> {
        self.transition_to(LoanStatus::Default, now)
    }

    fn transition_to(&mut self, next: LoanStatus, now: DateTime<Utc>) -> Result<(), LendingError> {
        if !self.status.can_transition_to(next) {
            return Err(LendingError::InvalidLoanTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Outstanding exposure this loan contributes
    pub fn exposure(&self) -> Money {
        if self.status.counts_toward_exposure() {
            self.disbursed_amount
        } else {
            Money::zero(self.principal.currency())
        }
    }
}
