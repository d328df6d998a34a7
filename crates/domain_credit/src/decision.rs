//! Credit decisioning
//!
//! [`decide`] is a pure function of the risk grade, the requested amount and
//! an exposure snapshot read by the caller inside its own transaction. Checks
//! run in a fixed order and the first breached cap wins:
//!
//! 1. portfolio cap
//! 2. per-user cap
//! 3. per-GST cap
//! 4. grade B or C → conditional approval, grade A → approval

use serde::{Deserialize, Serialize};
use rust_decimal_macros::dec;

use core_kernel::{Currency, Money};

use crate::error::CreditError;
use crate::scoring::RiskGrade;

core_kernel::code_enum! {
    /// Verdict of the decision engine
    pub enum CreditDecision {
        Approved => "APPROVED",
        ConditionalApproval => "CONDITIONAL_APPROVAL",
        Rejected => "REJECTED",
    }
}

core_kernel::code_enum! {
    /// The exposure cap a request was measured against
    pub enum CapKind {
        Portfolio => "PORTFOLIO",
        PerUser => "PER_USER",
        PerGst => "PER_GST",
    }
}

/// Configured exposure ceilings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureCaps {
    pub per_user: Money,
    pub per_gst: Money,
    pub portfolio: Money,
}

impl Default for ExposureCaps {
    fn default() -> Self {
        Self {
            per_user: Money::inr(dec!(10000000)),
            per_gst: Money::inr(dec!(25000000)),
            portfolio: Money::inr(dec!(500000000)),
        }
    }
}

/// Outstanding exposure at decision time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureSnapshot {
    pub user: Money,
    pub gst: Money,
    pub portfolio: Money,
}

impl ExposureSnapshot {
    pub fn empty(currency: Currency) -> Self {
        Self {
            user: Money::zero(currency),
            gst: Money::zero(currency),
            portfolio: Money::zero(currency),
        }
    }
}

/// A cap that the request would push exposure past
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapBreach {
    pub cap: CapKind,
    pub current: Money,
    pub requested: Money,
    pub limit: Money,
}

impl std::fmt::Display for CapBreach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} exposure cap exceeded. Current: {}, Requested: {}, Cap: {}",
            self.cap, self.current, self.requested, self.limit
        )
    }
}

/// Verdict plus the breached cap when rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: CreditDecision,
    pub breach: Option<CapBreach>,
}

impl DecisionOutcome {
    pub fn is_rejected(&self) -> bool {
        self.decision == CreditDecision::Rejected
    }
}

/// Evaluates a credit request
///
/// # Arguments
///
/// * `grade` - Latest risk grade of the business
/// * `requested` - Amount being requested
/// * `exposure` - Current user/GST/portfolio exposure
/// * `caps` - Configured ceilings
///
/// # Errors
///
/// Returns `Calculation` if the amounts are in different currencies.
pub fn decide(
    grade: RiskGrade,
    requested: Money,
    exposure: &ExposureSnapshot,
    caps: &ExposureCaps,
) -> Result<DecisionOutcome, CreditError> {
    let checks = [
        (CapKind::Portfolio, exposure.portfolio, caps.portfolio),
        (CapKind::PerUser, exposure.user, caps.per_user),
        (CapKind::PerGst, exposure.gst, caps.per_gst),
    ];

    for (cap, current, limit) in checks {
        if current.checked_add(&requested)?.exceeds(&limit)? {
            return Ok(DecisionOutcome {
                decision: CreditDecision::Rejected,
                breach: Some(CapBreach {
                    cap,
                    current,
                    requested,
                    limit,
                }),
            });
        }
    }

    let decision = match grade {
        RiskGrade::A => CreditDecision::Approved,
        RiskGrade::B | RiskGrade::C => CreditDecision::ConditionalApproval,
    };
    Ok(DecisionOutcome {
        decision,
        breach: None,
    })
}
