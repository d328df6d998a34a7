//! Engine services
//!
//! Each service owns a clone of the [`EngineContext`](crate::EngineContext)
//! and runs every state-changing operation in exactly one unit of work.
//! Sweeps pick candidates with lock-free reads and then process each one in
//! its own unit of work, so one bad candidate never blocks the rest.

pub mod exposure;
pub mod invoice_sync;
pub mod loans;
pub mod offers;
pub mod onboarding;
pub mod portfolio;
pub mod recovery;
pub mod repayment;
pub mod scoring;

use serde::{Deserialize, Serialize};

use core_kernel::UserId;
use domain_credit::BusinessProfile;

use crate::error::EngineError;

pub use exposure::ExposureCalculator;
pub use invoice_sync::{InvoiceSyncService, ManualInvoice, SyncReport};
pub use loans::LoanService;
pub use offers::OfferService;
pub use onboarding::{OnboardingRequest, OnboardingService};
pub use portfolio::{PortfolioService, PortfolioSummary};
pub use recovery::RecoveryService;
pub use repayment::{EmiReminder, RepaymentService};
pub use scoring::ScoringService;

/// Outcome of one sweep run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Candidates selected
    pub examined: usize,
    /// Candidates that changed state
    pub processed: usize,
    /// Candidates whose unit of work failed
    pub failed: usize,
}

pub(crate) fn require<T>(
    value: Option<T>,
    entity: &str,
    id: impl std::fmt::Display,
) -> Result<T, EngineError> {
    value.ok_or_else(|| EngineError::not_found(entity, id))
}

pub(crate) fn ensure_owner(business: &BusinessProfile, actor: UserId) -> Result<(), EngineError> {
    if business.is_owned_by(actor) {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "user {} does not own business {}",
            actor, business.id
        )))
    }
}
