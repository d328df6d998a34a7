//! Equated monthly installments
//!
//! PAID is terminal for a row. A BOUNCED row keeps its place in the schedule,
//! accumulates `retry_count` and can still be paid later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{EmiId, LoanId, Money};

use crate::error::LendingError;

core_kernel::code_enum! {
    /// Installment state
    pub enum EmiStatus {
        Pending => "PENDING",
        Paid => "PAID",
        Bounced => "BOUNCED",
    }
}

impl EmiStatus {
    pub fn parse(code: &str) -> Result<Self, LendingError> {
        Self::parse_code(code)
            .ok_or_else(|| LendingError::validation(format!("unknown EMI status {}", code)))
    }
}

/// One scheduled repayment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emi {
    pub id: EmiId,
    pub loan_id: LoanId,
    /// 1-based position in the schedule
    pub installment_number: u32,
    pub due_date: DateTime<Utc>,
    pub amount: Money,
    pub status: EmiStatus,
    pub retry_count: u32,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Emi {
    pub fn new(
        loan_id: LoanId,
        installment_number: u32,
        due_date: DateTime<Utc>,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EmiId::new_v7(),
            loan_id,
            installment_number,
            due_date,
            amount,
            status: EmiStatus::Pending,
            retry_count: 0,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == EmiStatus::Paid
    }

    /// PENDING and past its due date
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == EmiStatus::Pending && self.due_date < now
    }

    /// Marks the installment paid
    ///
    /// # Errors
    ///
    /// Returns `InvalidEmiTransition` if it is already PAID.
    pub fn pay(&mut self, now: DateTime<Utc>) -> Result<(), LendingError> {
        if self.is_paid() {
            return Err(LendingError::InvalidEmiTransition {
                from: self.status,
                to: EmiStatus::Paid,
            });
        }
        self.status = EmiStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Records a failed collection and returns the new retry count
    ///
    /// # Errors
    ///
    /// Returns `InvalidEmiTransition` if it is already PAID.
    pub fn bounce(&mut self, now: DateTime<Utc>) -> Result<u32, LendingError> {
        if self.is_paid() {
            return Err(LendingError::InvalidEmiTransition {
                from: self.status,
                to: EmiStatus::Bounced,
            });
        }
        self.status = EmiStatus::Bounced;
        self.retry_count = self.retry_count.saturating_add(1);
        self.updated_at = now;
        Ok(self.retry_count)
    }

    /// Whether the bounce count has reached the default threshold
    pub fn exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn emi() -> Emi {
        let now = Utc::now();
        Emi::new(LoanId::new_v7(), 1, now + Duration::days(30), Money::inr(dec!(8884.88)), now)
    }

    #[test]
    fn test_bounced_emi_can_still_be_paid() {
        let mut emi = emi();
        assert_eq!(emi.bounce(Utc::now()).unwrap(), 1);
        assert_eq!(emi.bounce(Utc::now()).unwrap(), 2);
        assert!(emi.exhausted(2));

        emi.pay(Utc::now()).unwrap();
        assert!(emi.is_paid());
        assert_eq!(emi.retry_count, 2);
    }

    #[test]
    fn test_paid_is_terminal() {
        let mut emi = emi();
        emi.pay(Utc::now()).unwrap();
        assert!(emi.pay(Utc::now()).is_err());
        assert!(emi.bounce(Utc::now()).is_err());
    }

    #[test]
    fn test_overdue_only_when_pending() {
        let mut emi = emi();
        let later = emi.due_date + Duration::seconds(1);
        assert!(!emi.is_overdue(emi.due_date));
        assert!(emi.is_overdue(later));
        emi.bounce(later).unwrap();
        assert!(!emi.is_overdue(later));
    }
}
