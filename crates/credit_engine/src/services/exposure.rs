//! Exposure Calculator
//!
//! Outstanding principal of SANCTIONED and ACTIVE loans, aggregated per user,
//! per GST registration and across the portfolio. Offer generation reads the
//! snapshot inside its own unit of work, after locking the invoice and the
//! business, so the cap check and the offer inserts commit together.

use core_kernel::{BusinessId, Money, UserId};
use domain_credit::{BusinessProfile, ExposureSnapshot};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::store::{ExposureScope, UnitOfWork};

pub(crate) async fn snapshot_in(
    uow: &mut dyn UnitOfWork,
    business: &BusinessProfile,
) -> Result<ExposureSnapshot, EngineError> {
    Ok(ExposureSnapshot {
        user: uow.exposure(&ExposureScope::User(business.user_id)).await?,
        gst: uow.exposure(&ExposureScope::Gst(business.gst_number.clone())).await?,
        portfolio: uow.exposure(&ExposureScope::Portfolio).await?,
    })
}

/// Read-only exposure queries, each in a short unit of work that is rolled back
#[derive(Clone)]
pub struct ExposureCalculator {
    ctx: EngineContext,
}

impl ExposureCalculator {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub async fn user_exposure(&self, user_id: UserId) -> Result<Money, EngineError> {
        self.scoped(ExposureScope::User(user_id)).await
    }

    pub async fn gst_exposure(&self, gst_number: &str) -> Result<Money, EngineError> {
        self.scoped(ExposureScope::Gst(gst_number.to_string())).await
    }

    pub async fn portfolio_exposure(&self) -> Result<Money, EngineError> {
        self.scoped(ExposureScope::Portfolio).await
    }

    /// All three exposures relevant to a business
    pub async fn snapshot(&self, business_id: BusinessId) -> Result<ExposureSnapshot, EngineError> {
        let mut tx = self.ctx.begin().await?;
        let result = match tx.uow.lock_business(business_id).await {
            Ok(Some(business)) => snapshot_in(tx.uow.as_mut(), &business).await,
            Ok(None) => Err(EngineError::not_found("Business", business_id)),
            Err(e) => Err(e.into()),
        };
        tx.rollback().await;
        result
    }

    async fn scoped(&self, scope: ExposureScope) -> Result<Money, EngineError> {
        let mut tx = self.ctx.begin().await?;
        let result = tx.uow.exposure(&scope).await.map_err(EngineError::from);
        tx.rollback().await;
        result
    }
}

