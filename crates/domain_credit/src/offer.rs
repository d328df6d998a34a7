//! Loan offers
//!
//! Every eligible invoice receives a pair of offers: one UNSECURED at a fixed
//! rate and one SECURED priced by risk grade. Both expire after a fixed window.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{InvoiceId, Money, OfferId, Rate};

use crate::error::CreditError;
use crate::scoring::RiskGrade;

core_kernel::code_enum! {
    /// Whether the loan is backed by pledged collateral
    pub enum LoanType {
        Secured => "SECURED",
        Unsecured => "UNSECURED",
    }
}

core_kernel::code_enum! {
    /// Offer lifecycle; ACCEPTED and EXPIRED are final
    pub enum OfferStatus {
        Generated => "GENERATED",
        Accepted => "ACCEPTED",
        Expired => "EXPIRED",
    }
}

impl OfferStatus {
    pub fn can_transition_to(&self, next: OfferStatus) -> bool {
        matches!(
            (self, next),
            (OfferStatus::Generated, OfferStatus::Accepted)
                | (OfferStatus::Generated, OfferStatus::Expired)
        )
    }
}

impl LoanType {
    pub fn parse(code: &str) -> Result<Self, CreditError> {
        Self::parse_code(code).ok_or_else(|| CreditError::UnknownCode(code.to_string()))
    }
}

impl OfferStatus {
    pub fn parse(code: &str) -> Result<Self, CreditError> {
        Self::parse_code(code).ok_or_else(|| CreditError::UnknownCode(code.to_string()))
    }
}

/// Financing percentage, annual rate and tenure of one offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferTerms {
    /// Percentage of invoice value financed (0–100)
    pub financed_percentage: Decimal,
    /// Annual interest rate in percent
    pub annual_rate_pct: Decimal,
    pub tenure_months: u32,
}

/// Pricing grid used by offer generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferPricing {
    pub unsecured: OfferTerms,
    pub secured_financed_percentage: Decimal,
    pub secured_rate_grade_a_pct: Decimal,
    pub secured_rate_grade_b_pct: Decimal,
    pub secured_rate_grade_c_pct: Decimal,
    pub secured_tenure_months: u32,
    /// Offer validity window
    pub expiry_hours: i64,
}

impl Default for OfferPricing {
    fn default() -> Self {
        Self {
            unsecured: OfferTerms {
                financed_percentage: dec!(100),
                annual_rate_pct: dec!(20),
                tenure_months: 8,
            },
            secured_financed_percentage: dec!(100),
            secured_rate_grade_a_pct: dec!(12),
            secured_rate_grade_b_pct: dec!(14),
            secured_rate_grade_c_pct: dec!(16),
            secured_tenure_months: 4,
            expiry_hours: 24,
        }
    }
}

impl OfferPricing {
    pub fn unsecured_terms(&self) -> OfferTerms {
        self.unsecured
    }

    pub fn secured_terms(&self, grade: RiskGrade) -> OfferTerms {
        let annual_rate_pct = match grade {
            RiskGrade::A => self.secured_rate_grade_a_pct,
            RiskGrade::B => self.secured_rate_grade_b_pct,
            RiskGrade::C => self.secured_rate_grade_c_pct,
        };
        OfferTerms {
            financed_percentage: self.secured_financed_percentage,
            annual_rate_pct,
            tenure_months: self.secured_tenure_months,
        }
    }

    pub fn expiry(&self) -> Duration {
        Duration::hours(self.expiry_hours)
    }

    /// Rejects grids that could never produce a valid loan
    pub fn validate(&self) -> Result<(), CreditError> {
        let grids = [
            self.unsecured,
            self.secured_terms(RiskGrade::A),
            self.secured_terms(RiskGrade::B),
            self.secured_terms(RiskGrade::C),
        ];
        for terms in grids {
            if terms.financed_percentage <= Decimal::ZERO || terms.financed_percentage > dec!(100) {
                return Err(CreditError::validation(format!(
                    "financed percentage {} outside (0, 100]",
                    terms.financed_percentage
                )));
            }
            if terms.annual_rate_pct < Decimal::ZERO {
                return Err(CreditError::validation("interest rate must not be negative"));
            }
            if terms.tenure_months == 0 {
                return Err(CreditError::validation("tenure must be at least one month"));
            }
        }
        if self.expiry_hours <= 0 {
            return Err(CreditError::validation("offer expiry must be positive"));
        }
        Ok(())
    }
}

/// A candidate loan against one invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub invoice_id: InvoiceId,
    pub loan_type: LoanType,
    pub financed_percentage: Decimal,
    pub interest_rate: Rate,
    pub tenure_months: u32,
    pub status: OfferStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    fn from_terms(
        invoice_id: InvoiceId,
        loan_type: LoanType,
        terms: OfferTerms,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OfferId::new_v7(),
            invoice_id,
            loan_type,
            financed_percentage: terms.financed_percentage,
            interest_rate: Rate::from_percentage(terms.annual_rate_pct),
            tenure_months: terms.tenure_months,
            status: OfferStatus::Generated,
            expires_at,
            created_at: now,
        }
    }

    /// Builds the UNSECURED and SECURED offers for an invoice, in that order
    pub fn generate_pair(
        invoice_id: InvoiceId,
        grade: RiskGrade,
        pricing: &OfferPricing,
        now: DateTime<Utc>,
    ) -> [Offer; 2] {
        let expires_at = now + pricing.expiry();
        let unsecured = pricing.unsecured_terms();
        let secured = pricing.secured_terms(grade);
        [
            Self::from_terms(invoice_id, LoanType::Unsecured, unsecured, expires_at, now),
            Self::from_terms(invoice_id, LoanType::Secured, secured, expires_at, now),
        ]
    }

    /// An offer is expired once its expiry instant has been reached
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Principal this offer finances against `invoice_amount`
    pub fn principal_for(&self, invoice_amount: &Money) -> Money {
        invoice_amount
            .multiply(self.financed_percentage / dec!(100))
            .round_to_currency()
    }

    pub fn transition_to(&mut self, next: OfferStatus) -> Result<(), CreditError> {
        if !self.status.can_transition_to(next) {
            return Err(CreditError::InvalidOfferTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
