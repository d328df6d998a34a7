//! Invoices and their financing lifecycle
//!
//! ```text
//! UNPAID ──► OFFER_GENERATED ──► FINANCED ──► REPAID
//!    ▲             │                  │
//!    └─────────────┘ (offers expire)  └──────► DEFAULTED
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{BusinessId, InvoiceId, Money};

use crate::error::CreditError;

core_kernel::code_enum! {
    /// Financing state of an invoice
    pub enum InvoiceStatus {
        Unpaid => "UNPAID",
        OfferGenerated => "OFFER_GENERATED",
        Financed => "FINANCED",
        Repaid => "REPAID",
        Defaulted => "DEFAULTED",
    }
}

impl InvoiceStatus {
    /// Checks if the transition to a new status is valid
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Unpaid, OfferGenerated)
                | (OfferGenerated, Unpaid)
                | (OfferGenerated, Financed)
                | (Financed, Repaid)
                | (Financed, Defaulted)
        )
    }

    /// Terminal states admit no further financing
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Repaid | InvoiceStatus::Defaulted)
    }

    pub fn parse(code: &str) -> Result<Self, CreditError> {
        Self::parse_code(code).ok_or_else(|| CreditError::UnknownCode(code.to_string()))
    }
}

/// A GST invoice eligible for discounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub business_id: BusinessId,
    pub invoice_number: String,
    pub amount: Money,
    pub due_date: DateTime<Utc>,
    /// Accumulated payment delay reported by the provider
    pub delay_days: i32,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates a new UNPAID invoice
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the amount is not positive, the number is blank
    /// or the delay is negative.
    pub fn new(
        business_id: BusinessId,
        invoice_number: impl Into<String>,
        amount: Money,
        due_date: DateTime<Utc>,
        delay_days: i32,
        now: DateTime<Utc>,
    ) -> Result<Self, CreditError> {
        let invoice_number = invoice_number.into();
        if invoice_number.trim().is_empty() {
            return Err(CreditError::validation("invoice number must not be blank"));
        }
        if !amount.is_positive() {
            return Err(CreditError::validation(format!(
                "invoice amount must be positive, got {}",
                amount
            )));
        }
        if delay_days < 0 {
            return Err(CreditError::validation("delay days must not be negative"));
        }

        Ok(Self {
            id: InvoiceId::new_v7(),
            business_id,
            invoice_number,
            amount: amount.round_to_currency(),
            due_date,
            delay_days,
            status: InvoiceStatus::Unpaid,
            created_at: now,
            updated_at: now,
        })
    }

    /// Moves the invoice to `next`, enforcing the lifecycle
    pub fn transition_to(
        &mut self,
        next: InvoiceStatus,
        now: DateTime<Utc>,
    ) -> Result<(), CreditError> {
        if !self.status.can_transition_to(next) {
            return Err(CreditError::InvalidInvoiceTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// True while offers may be generated for this invoice
    pub fn is_financeable(&self) -> bool {
        self.status == InvoiceStatus::Unpaid
    }

    /// Refreshes provider-reported fields; only UNPAID invoices are touched
    ///
    /// Returns true if anything changed.
    pub fn refresh_from_provider(
        &mut self,
        amount: Money,
        due_date: DateTime<Utc>,
        delay_days: i32,
        now: DateTime<Utc>,
    ) -> bool {
        if self.status != InvoiceStatus::Unpaid {
            return false;
        }
        let amount = amount.round_to_currency();
        let changed =
            self.amount != amount || self.due_date != due_date || self.delay_days != delay_days;
        if changed {
            self.amount = amount;
            self.due_date = due_date;
            self.delay_days = delay_days;
            self.updated_at = now;
        }
        changed
    }
}
