//! Collateral pledged against secured loans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{CollateralId, LoanId, Money};

use crate::error::LendingError;

core_kernel::code_enum! {
    /// Collateral state
    pub enum CollateralStatus {
        Pledged => "PLEDGED",
        Seized => "SEIZED",
        Released => "RELEASED",
    }
}

impl CollateralStatus {
    pub fn can_transition_to(&self, next: CollateralStatus) -> bool {
        use CollateralStatus::*;
        matches!((self, next), (Pledged, Seized) | (Pledged, Released) | (Seized, Released))
    }

    pub fn parse(code: &str) -> Result<Self, LendingError> {
        Self::parse_code(code)
            .ok_or_else(|| LendingError::validation(format!("unknown collateral status {}", code)))
    }
}

/// Asset details supplied when sanctioning a secured loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralInput {
    pub asset_description: String,
    pub asset_value: Money,
}

impl CollateralInput {
    pub fn new(asset_description: impl Into<String>, asset_value: Money) -> Self {
        Self {
            asset_description: asset_description.into(),
            asset_value,
        }
    }

    /// Both fields are mandatory for a secured loan
    pub fn validate(&self) -> Result<(), LendingError> {
        if self.asset_description.trim().is_empty() {
            return Err(LendingError::CollateralRequired(
                "asset description must not be blank".into(),
            ));
        }
        if !self.asset_value.is_positive() {
            return Err(LendingError::CollateralRequired(format!(
                "asset value must be positive, got {}",
                self.asset_value
            )));
        }
        Ok(())
    }
}

/// A pledged asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collateral {
    pub id: CollateralId,
    pub loan_id: LoanId,
    pub asset_description: String,
    pub asset_value: Money,
    pub status: CollateralStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collateral {
    /// Pledges a validated asset against a loan
    pub fn pledge(
        loan_id: LoanId,
        input: CollateralInput,
        now: DateTime<Utc>,
    ) -> Result<Self, LendingError> {
        input.validate()?;
        Ok(Self {
            id: CollateralId::new_v7(),
            loan_id,
            asset_description: input.asset_description.trim().to_string(),
            asset_value: input.asset_value.round_to_currency(),
            status: CollateralStatus::Pledged,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_pledged(&self) -> bool {
        self.status == CollateralStatus::Pledged
    }

    /// Seizes the asset on default; returns its value
    pub fn seize(&mut self, now: DateTime<Utc>) -> Result<Money, LendingError> {
        self.transition_to(CollateralStatus::Seized, now)?;
        Ok(self.asset_value)
    }

    pub fn release(&mut self, now: DateTime<Utc>) -> Result<(), LendingError> {
        self.transition_to(CollateralStatus::Released, now)
    }

    fn transition_to(
        &mut self,
        next: CollateralStatus,
        now: DateTime<Utc>,
    ) -> Result<(), LendingError> {
        if !self.status.can_transition_to(next) {
            return Err(LendingError::InvalidCollateralTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
