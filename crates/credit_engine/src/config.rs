//! Engine configuration
//!
//! Every tunable of the lifecycle lives here so deployments can override it
//! from one configuration section.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use domain_credit::{ExposureCaps, OfferPricing, ScoringConfig};

use crate::error::EngineError;

/// Lifecycle engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Score weights, fallback score and grade thresholds
    pub scoring: ScoringConfig,
    /// Per-user, per-GST and portfolio exposure ceilings
    pub caps: ExposureCaps,
    /// Offer terms by loan type and risk grade
    pub pricing: OfferPricing,
    /// Share of the invoice value checked against the caps
    pub financing_ratio: Decimal,
    /// Days between consecutive EMIs
    pub emi_interval_days: u32,
    /// Bounces of one EMI that push the loan into default
    pub max_emi_retries: u32,
    /// How far ahead the reminder sweep looks, in days
    pub reminder_window_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            caps: ExposureCaps::default(),
            pricing: OfferPricing::default(),
            financing_ratio: dec!(0.85),
            emi_interval_days: 30,
            max_emi_retries: 2,
            reminder_window_days: 3,
        }
    }
}

impl EngineConfig {
    /// Rejects configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.financing_ratio <= Decimal::ZERO || self.financing_ratio > Decimal::ONE {
            return Err(EngineError::Validation(format!(
                "financing_ratio must be in (0, 1], got {}",
                self.financing_ratio
            )));
        }
        if self.emi_interval_days == 0 {
            return Err(EngineError::Validation("emi_interval_days must be positive".into()));
        }
        if self.max_emi_retries == 0 {
            return Err(EngineError::Validation("max_emi_retries must be positive".into()));
        }
        if self.scoring.external_weight + self.scoring.internal_weight != Decimal::ONE {
            return Err(EngineError::Validation("scoring weights must sum to 1".into()));
        }
        self.pricing.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.financing_ratio, dec!(0.85));
        assert_eq!(config.max_emi_retries, 2);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_emi_retries": 3}"#).unwrap();
        assert_eq!(config.max_emi_retries, 3);
        assert_eq!(config.emi_interval_days, 30);
    }

    #[test]
    fn test_rejects_bad_ratio() {
        let config = EngineConfig {
            financing_ratio: dec!(1.5),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
