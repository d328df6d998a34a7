//! Scoring service
//!
//! Provider calls happen before the unit of work opens; the provider never
//! holds up a row lock. Provider failures are absorbed: a missing external
//! score falls back to the configured value and missing returns count as
//! zero filed.

use rust_decimal::Decimal;
use serde_json::json;
use tracing::instrument;

use core_kernel::{AuditAction, AuditRecord, BusinessId, EntityType, UserId};
use domain_credit::{
    BusinessProfile, CreditEvaluationRequest, CreditScore, ExternalScoreSource, GstReturnsSummary,
    ScoringSignals,
};

use crate::context::{EngineContext, Transaction};
use crate::error::EngineError;
use crate::services::{require, SweepReport};

/// Provider answers used by one score computation
#[derive(Debug, Clone, Default)]
pub(crate) struct ProviderInputs {
    pub external: Option<Decimal>,
    pub returns: GstReturnsSummary,
}

pub(crate) async fn fetch_inputs(
    ctx: &EngineContext,
    business: &BusinessProfile,
) -> ProviderInputs {
    let request = CreditEvaluationRequest {
        gst_number: business.gst_number.clone(),
        pan_number: business.pan_number.clone(),
        aadhaar_number: business.aadhaar_number.clone(),
    };
    let external = match ctx.bureau.credit_evaluate(&request).await {
        Ok(Some(score)) => Some(score),
        Ok(None) => {
            tracing::warn!(business_id = %business.id, "scoring.external_score_missing");
            None
        }
        Err(e) => {
            tracing::warn!(
                business_id = %business.id,
                error = %e,
                "scoring.external_score_fallback"
            );
            None
        }
    };
    let returns = match ctx.bureau.gst_returns(&business.gst_number).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::warn!(
                business_id = %business.id,
                error = %e,
                "scoring.gst_returns_unavailable"
            );
            GstReturnsSummary::default()
        }
    };
    ProviderInputs { external, returns }
}

/// Computes and appends a score inside an open unit of work
pub(crate) async fn record_score(
    ctx: &EngineContext,
    tx: &mut Transaction,
    business: &BusinessProfile,
    inputs: ProviderInputs,
    actor: Option<UserId>,
) -> Result<CreditScore, EngineError> {
    let stats = tx.uow.invoice_stats(business.id).await?;
    let signals = ScoringSignals {
        gst_returns: inputs.returns,
        invoice_count: stats.invoice_count,
        average_delay_days: stats.average_delay_days,
        repaid_invoice_count: stats.repaid_count,
    };
    let now = ctx.now();
    let (score, source) =
        CreditScore::compute(business.id, inputs.external, &signals, &ctx.config.scoring, now);
    tx.uow.insert_score(&score).await?;

    tx.record(
        AuditRecord::new(
            actor,
            AuditAction::CreditScoreCalculated,
            EntityType::Business,
            business.id,
            now,
        )
        .with_new(json!({
            "credit_score_id": score.id.to_string(),
            "external_score": score.external_score,
            "internal_score": score.internal_score,
            "final_score": score.final_score,
            "risk_grade": score.risk_grade,
            "fallback": source == ExternalScoreSource::Fallback,
        })),
    );
    tracing::info!(
        business_id = %business.id,
        final_score = %score.final_score,
        risk_grade = %score.risk_grade,
        "scoring.computed"
    );
    Ok(score)
}

/// Computes, stores and reads credit scores
#[derive(Clone)]
pub struct ScoringService {
    ctx: EngineContext,
}

impl ScoringService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Computes a fresh score for a business and appends it
    ///
    /// # Errors
    ///
    /// `NotFound` if the business does not exist. Provider failures never
    /// surface here.
    #[instrument(skip(self), fields(business_id = %business_id))]
    pub async fn compute_score(
        &self,
        business_id: BusinessId,
        actor: Option<UserId>,
    ) -> Result<CreditScore, EngineError> {
        let business =
            require(self.ctx.store.business(business_id).await?, "Business", business_id)?;
        let inputs = fetch_inputs(&self.ctx, &business).await;

        let mut tx = self.ctx.begin().await?;
        let result = record_score(&self.ctx, &mut tx, &business, inputs, actor).await;
        tx.finish(&self.ctx, result).await
    }

    pub async fn latest_score(
        &self,
        business_id: BusinessId,
    ) -> Result<Option<CreditScore>, EngineError> {
        Ok(self.ctx.store.latest_score(business_id).await?)
    }

    /// Recomputes the score of every business
    #[instrument(skip(self))]
    pub async fn recalculate_all(&self) -> Result<SweepReport, EngineError> {
        let ids = self.ctx.store.business_ids().await?;
        let mut report = SweepReport {
            examined: ids.len(),
            ..SweepReport::default()
        };
        for id in ids {
            match self.compute_score(id, None).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    tracing::warn!(business_id = %id, error = %e, "job.score_recalculation_failed");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            examined = report.examined,
            processed = report.processed,
            failed = report.failed,
            "job.score_recalculation"
        );
        Ok(report)
    }
}
