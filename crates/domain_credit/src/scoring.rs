//! Hybrid credit scoring
//!
//! `final_score = external_weight × external + internal_weight × internal`
//!
//! The internal score (0–800) is built from four locally observable signals:
//!
//! | signal | contribution |
//! |---|---|
//! | GST returns filed / returns due | ratio × 200 |
//! | invoice count | +10 each, max 100 |
//! | average invoice delay (days) | −2 per day, max −200 |
//! | repaid invoice count | +50 each, max 250 |
//!
//! Risk grade: `final ≥ 700` → A, `final ≥ 500` → B, otherwise C.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{BusinessId, CreditScoreId};

use crate::error::CreditError;

core_kernel::code_enum! {
    /// Coarse risk bucket driving pricing and decisioning
    pub enum RiskGrade {
        A => "A",
        B => "B",
        C => "C",
    }
}

impl RiskGrade {
    /// Derives the grade from a final score using the configured thresholds
    pub fn from_score(final_score: Decimal, config: &ScoringConfig) -> Self {
        if final_score >= config.grade_a_threshold {
            RiskGrade::A
        } else if final_score >= config.grade_b_threshold {
            RiskGrade::B
        } else {
            RiskGrade::C
        }
    }

    pub fn parse(code: &str) -> Result<Self, CreditError> {
        Self::parse_code(code).ok_or_else(|| CreditError::UnknownCode(code.to_string()))
    }
}

/// Weights, fallback and thresholds for scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub external_weight: Decimal,
    pub internal_weight: Decimal,
    /// Used when the external provider fails or returns an unusable score
    pub fallback_external_score: Decimal,
    pub max_external_score: Decimal,
    pub grade_a_threshold: Decimal,
    pub grade_b_threshold: Decimal,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            external_weight: dec!(0.6),
            internal_weight: dec!(0.4),
            fallback_external_score: dec!(600),
            max_external_score: dec!(1000),
            grade_a_threshold: dec!(700),
            grade_b_threshold: dec!(500),
        }
    }
}

/// Counts of filed vs due GST returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GstReturnsSummary {
    pub filed: u32,
    pub total: u32,
}

impl GstReturnsSummary {
    /// filed / max(total, 1)
    pub fn filing_ratio(&self) -> Decimal {
        let total = self.total.max(1);
        Decimal::from(self.filed.min(total)) / Decimal::from(total)
    }
}

/// Inputs to the internal score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringSignals {
    /// Zeroed when the returns lookup failed
    pub gst_returns: GstReturnsSummary,
    pub invoice_count: u32,
    pub average_delay_days: Decimal,
    pub repaid_invoice_count: u32,
}

const MAX_INTERNAL_SCORE: Decimal = dec!(800);

impl ScoringSignals {
    /// Computes the internal score, clamped to [0, 800]
    pub fn internal_score(&self) -> Decimal {
        let compliance = self.gst_returns.filing_ratio() * dec!(200);
        let volume = (Decimal::from(self.invoice_count) * dec!(10)).min(dec!(100));
        let delay_penalty = (self.average_delay_days.max(Decimal::ZERO) * dec!(2)).min(dec!(200));
        let repayment = (Decimal::from(self.repaid_invoice_count) * dec!(50)).min(dec!(250));

        (compliance + volume - delay_penalty + repayment)
            .max(Decimal::ZERO)
            .min(MAX_INTERNAL_SCORE)
    }
}

/// Blends the two scores with the configured weights
pub fn blend(external: Decimal, internal: Decimal, config: &ScoringConfig) -> Decimal {
    config.external_weight * external + config.internal_weight * internal
}

/// Where the external component came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalScoreSource {
    Provider,
    Fallback,
}

/// An immutable score record; recalculation appends a new one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditScore {
    pub id: CreditScoreId,
    pub business_id: BusinessId,
    pub external_score: Decimal,
    pub internal_score: Decimal,
    pub final_score: Decimal,
    pub risk_grade: RiskGrade,
    pub created_at: DateTime<Utc>,
}

impl CreditScore {
    /// Builds a score record from the external score and local signals
    ///
    /// # Arguments
    ///
    /// * `external` - Provider score, or `None` if the provider failed
    /// * `signals` - Internal signals
    ///
    /// # Returns
    ///
    /// The record and whether the fallback external score was used
    pub fn compute(
        business_id: BusinessId,
        external: Option<Decimal>,
        signals: &ScoringSignals,
        config: &ScoringConfig,
        now: DateTime<Utc>,
    ) -> (Self, ExternalScoreSource) {
        let (external_score, source) = match external {
            Some(score) if score >= Decimal::ZERO && score <= config.max_external_score => {
                (score, ExternalScoreSource::Provider)
            }
            Some(score) => {
                tracing::warn!(%score, "scoring.external_score_out_of_range");
                (config.fallback_external_score, ExternalScoreSource::Fallback)
            }
            None => (config.fallback_external_score, ExternalScoreSource::Fallback),
        };

        let internal_score = signals.internal_score();
        let final_score = blend(external_score, internal_score, config);
        let risk_grade = RiskGrade::from_score(final_score, config);

        (
            Self {
                id: CreditScoreId::new_v7(),
                business_id,
                external_score,
                internal_score,
                final_score,
                risk_grade,
                created_at: now,
            },
            source,
        )
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn internal_score_stays_in_range(
            filed in 0u32..50,
            total in 0u32..50,
            invoices in 0u32..1000,
            delay in 0i64..10_000,
            repaid in 0u32..1000,
        ) {
            let signals = ScoringSignals {
                gst_returns: GstReturnsSummary { filed, total },
                invoice_count: invoices,
                average_delay_days: Decimal::from(delay),
                repaid_invoice_count: repaid,
            };
            let score = signals.internal_score();
            prop_assert!(score >= Decimal::ZERO);
            prop_assert!(score <= dec!(800));
        }

        #[test]
        fn final_score_is_weighted_blend(external in 0i64..=1000, internal in 0i64..=800) {
            let c = ScoringConfig::default();
            let e = Decimal::from(external);
            let i = Decimal::from(internal);
            prop_assert_eq!(blend(e, i, &c), dec!(0.6) * e + dec!(0.4) * i);
        }
    }
}
