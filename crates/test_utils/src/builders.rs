//! Test Data Builders
//!
//! Fluent builders for the rows tests most often need to vary.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{BusinessId, LoanId, Money};
use domain_credit::{Invoice, InvoiceStatus};
use domain_lending::{Collateral, CollateralInput, Emi, EmiStatus};

use crate::fixtures::start;

/// Builder for invoices
///
/// # Example
///
/// ```rust,ignore
/// let invoice = InvoiceBuilder::new(business.id)
///     .number("INV-7")
///     .amount(dec!(250000))
///     .delay_days(12)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct InvoiceBuilder {
    business_id: BusinessId,
    number: String,
    amount: Decimal,
    due_in_days: i64,
    delay_days: i32,
    status: InvoiceStatus,
    created_at: DateTime<Utc>,
}

impl InvoiceBuilder {
    pub fn new(business_id: BusinessId) -> Self {
        Self {
            business_id,
            number: format!("INV-{}", uuid::Uuid::new_v4().simple()),
            amount: dec!(100000),
            due_in_days: 60,
            delay_days: 0,
            status: InvoiceStatus::Unpaid,
            created_at: start(),
        }
    }

    pub fn number(mut self, number: impl Into<String>) -> Self {
        self.number = number.into();
        self
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn due_in_days(mut self, days: i64) -> Self {
        self.due_in_days = days;
        self
    }

    pub fn delay_days(mut self, days: i32) -> Self {
        self.delay_days = days;
        self
    }

    /// Forces the status without walking the transition table
    pub fn status(mut self, status: InvoiceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// # Panics
    ///
    /// Panics if the invoice would be invalid (blank number, non-positive
    /// amount, negative delay).
    pub fn build(self) -> Invoice {
        let mut invoice = Invoice::new(
            self.business_id,
            self.number,
            Money::inr(self.amount),
            self.created_at + Duration::days(self.due_in_days),
            self.delay_days,
            self.created_at,
        )
        .expect("InvoiceBuilder produced an invalid invoice");
        invoice.status = self.status;
        invoice
    }
}

/// Builder for a single EMI row
#[derive(Debug, Clone)]
pub struct EmiBuilder {
    loan_id: LoanId,
    installment_number: u32,
    due_date: DateTime<Utc>,
    amount: Decimal,
    status: EmiStatus,
    retry_count: u32,
}

impl EmiBuilder {
    pub fn new(loan_id: LoanId) -> Self {
        Self {
            loan_id,
            installment_number: 1,
            due_date: start() + Duration::days(30),
            amount: dec!(10000),
            status: EmiStatus::Pending,
            retry_count: 0,
        }
    }

    pub fn installment(mut self, number: u32) -> Self {
        self.installment_number = number;
        self
    }

    pub fn due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = due;
        self
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn bounced(mut self, retries: u32) -> Self {
        self.status = EmiStatus::Bounced;
        self.retry_count = retries;
        self
    }

    pub fn build(self) -> Emi {
        let mut emi = Emi::new(
            self.loan_id,
            self.installment_number,
            self.due_date,
            Money::inr(self.amount),
            start(),
        );
        emi.status = self.status;
        emi.retry_count = self.retry_count;
        emi
    }
}

/// A pledged collateral for `loan_id`
///
/// # Panics
///
/// Panics if `value` is not positive.
pub fn pledged_collateral(loan_id: LoanId, description: &str, value: Decimal) -> Collateral {
    Collateral::pledge(loan_id, CollateralInput::new(description, Money::inr(value)), start())
        .expect("collateral value must be positive")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_builder_defaults() {
        let invoice = InvoiceBuilder::new(BusinessId::new_v7()).build();
        assert_eq!(invoice.status, InvoiceStatus::Unpaid);
        assert_eq!(invoice.amount, Money::inr(dec!(100000)));
        assert_eq!(invoice.due_date, start() + Duration::days(60));
        assert!(invoice.invoice_number.starts_with("INV-"));
    }

    #[test]
    fn test_invoice_builder_overrides() {
        let invoice = InvoiceBuilder::new(BusinessId::new_v7())
            .number("INV-7")
            .amount(dec!(250000))
            .delay_days(12)
            .status(InvoiceStatus::Repaid)
            .build();
        assert_eq!(invoice.invoice_number, "INV-7");
        assert_eq!(invoice.delay_days, 12);
        assert_eq!(invoice.status, InvoiceStatus::Repaid);
    }

    #[test]
    fn test_emi_builder_bounced() {
        let emi = EmiBuilder::new(LoanId::new_v7()).installment(3).bounced(2).build();
        assert_eq!(emi.installment_number, 3);
        assert_eq!(emi.status, EmiStatus::Bounced);
        assert!(emi.exhausted(2));
    }
}
