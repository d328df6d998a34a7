//! Offer Generator and the offer expiry sweep

use serde_json::json;
use tracing::instrument;

use core_kernel::{AuditAction, AuditRecord, EntityType, InvoiceId, OfferId, UserId};
use domain_credit::{decide, InvoiceStatus, Offer, OfferStatus};

use crate::context::{EngineContext, Transaction};
use crate::error::EngineError;
use crate::services::exposure::snapshot_in;
use crate::services::scoring::{fetch_inputs, record_score, ProviderInputs};
use crate::services::{ensure_owner, require, SweepReport};

/// Generates and expires loan offers
#[derive(Clone)]
pub struct OfferService {
    ctx: EngineContext,
}

impl OfferService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Creates the UNSECURED and SECURED offers for an UNPAID invoice
    ///
    /// The invoice and its business stay locked from the status check through
    /// the exposure check to the offer inserts; a concurrent caller for the
    /// same invoice waits and then observes a Conflict.
    ///
    /// # Errors
    ///
    /// * `NotFound` - unknown invoice
    /// * `Conflict` - the invoice is not UNPAID
    /// * `Forbidden` - `actor` does not own the invoice
    /// * `CapExceeded` - the financed amount would breach an exposure cap
    #[instrument(skip(self), fields(invoice_id = %invoice_id, actor = %actor))]
    pub async fn generate_offers(
        &self,
        invoice_id: InvoiceId,
        actor: UserId,
    ) -> Result<[Offer; 2], EngineError> {
        let prefetched = self.prefetch_score_inputs(invoice_id).await?;

        let mut tx = self.ctx.begin().await?;
        let result = self.generate_in(&mut tx, invoice_id, actor, prefetched).await;
        tx.finish(&self.ctx, result).await
    }

    /// Provider inputs for businesses that have never been scored
    async fn prefetch_score_inputs(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<ProviderInputs>, EngineError> {
        let Some(invoice) = self.ctx.store.invoice(invoice_id).await? else {
            return Ok(None);
        };
        let Some(business) = self.ctx.store.business(invoice.business_id).await? else {
            return Ok(None);
        };
        if self.ctx.store.latest_score(business.id).await?.is_some() {
            return Ok(None);
        }
        Ok(Some(fetch_inputs(&self.ctx, &business).await))
    }

    async fn generate_in(
        &self,
        tx: &mut Transaction,
        invoice_id: InvoiceId,
        actor: UserId,
        prefetched: Option<ProviderInputs>,
    ) -> Result<[Offer; 2], EngineError> {
        let config = &self.ctx.config;
        let mut invoice = require(tx.uow.lock_invoice(invoice_id).await?, "Invoice", invoice_id)?;
        if invoice.status != InvoiceStatus::Unpaid {
            return Err(EngineError::conflict(format!(
                "invoice {} is {}; offers can only be generated for UNPAID invoices",
                invoice.id, invoice.status
            )));
        }
        let business = require(
            tx.uow.lock_business(invoice.business_id).await?,
            "Business",
            invoice.business_id,
        )?;
        ensure_owner(&business, actor)?;

        let score = match tx.uow.latest_score(business.id).await? {
            Some(score) => score,
            None => {
                let inputs = match prefetched {
                    Some(inputs) => inputs,
                    None => fetch_inputs(&self.ctx, &business).await,
                };
                record_score(&self.ctx, tx, &business, inputs, Some(actor)).await?
            }
        };

        let requested = invoice.amount.multiply(config.financing_ratio).round_to_currency();
        let exposure = snapshot_in(tx.uow.as_mut(), &business).await?;
        let outcome = decide(score.risk_grade, requested, &exposure, &config.caps)?;
        if outcome.is_rejected() {
            return Err(match outcome.breach {
                Some(breach) => {
                    tracing::warn!(
                        invoice_id = %invoice.id,
                        cap = %breach.cap,
                        current = %breach.current,
                        requested = %breach.requested,
                        "offer.rejected"
                    );
                    breach.into()
                }
                None => EngineError::Internal("rejected decision without a breached cap".into()),
            });
        }

        let now = self.ctx.now();
        let offers = Offer::generate_pair(invoice.id, score.risk_grade, &config.pricing, now);
        tx.uow.insert_offers(&offers).await?;

        let old_status = invoice.status;
        invoice.transition_to(InvoiceStatus::OfferGenerated, now)?;
        tx.uow.update_invoice(&invoice).await?;

        tx.record(
            AuditRecord::new(
                Some(actor),
                AuditAction::OfferGenerated,
                EntityType::Invoice,
                invoice.id,
                now,
            )
            .with_old(json!({ "status": old_status }))
            .with_new(json!({
                "status": invoice.status,
                "decision": outcome.decision,
                "risk_grade": score.risk_grade,
                "offer_ids": offers.iter().map(|o| o.id.to_string()).collect::<Vec<_>>(),
            })),
        );
        tracing::info!(
            invoice_id = %invoice.id,
            risk_grade = %score.risk_grade,
            decision = %outcome.decision,
            "offer.generated"
        );
        Ok(offers)
    }

    pub async fn offer(&self, offer_id: OfferId) -> Result<Offer, EngineError> {
        require(self.ctx.store.offer(offer_id).await?, "Offer", offer_id)
    }

    /// Offers of an invoice, newest first
    pub async fn offers_for_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<Offer>, EngineError> {
        let mut offers = self.ctx.store.offers_for_invoice(invoice_id).await?;
        offers.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.loan_type.as_str().cmp(b.loan_type.as_str()))
        });
        Ok(offers)
    }

    /// Expires GENERATED offers past their expiry
    ///
    /// An invoice goes back to UNPAID once none of its offers is GENERATED.
    #[instrument(skip(self))]
    pub async fn expire_stale_offers(&self) -> Result<SweepReport, EngineError> {
        let now = self.ctx.now();
        let candidates = self.ctx.store.expired_offer_ids(now).await?;
        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        for offer_id in candidates {
            match self.expire_one(offer_id).await {
                Ok(true) => report.processed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(offer_id = %offer_id, error = %e, "job.offer_expiry_failed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            expired = report.processed,
            failed = report.failed,
            "job.offer_expiry"
        );
        Ok(report)
    }

    /// Expires one candidate in its own unit of work
    ///
    /// The offer is read without a lock to find its invoice; the invoice is
    /// then locked before the offers, the same order sanction uses.
    async fn expire_one(&self, offer_id: OfferId) -> Result<bool, EngineError> {
        let Some(candidate) = self.ctx.store.offer(offer_id).await? else {
            return Ok(false);
        };
        let mut tx = self.ctx.begin().await?;
        let result = self.expire_in(&mut tx, candidate.invoice_id, offer_id).await;
        tx.finish(&self.ctx, result).await
    }

    /// Returns false if the candidate no longer qualifies
    async fn expire_in(
        &self,
        tx: &mut Transaction,
        invoice_id: InvoiceId,
        offer_id: OfferId,
    ) -> Result<bool, EngineError> {
        let now = self.ctx.now();
        let mut invoice = require(tx.uow.lock_invoice(invoice_id).await?, "Invoice", invoice_id)?;
        let offers = tx.uow.lock_offers_for_invoice(invoice.id).await?;
        let Some(mut offer) = offers.iter().find(|o| o.id == offer_id).cloned() else {
            return Ok(false);
        };
        if offer.status != OfferStatus::Generated || !offer.is_expired(now) {
            return Ok(false);
        }

        offer.transition_to(OfferStatus::Expired)?;
        tx.uow.update_offer(&offer).await?;
        tx.record(
            AuditRecord::new(None, AuditAction::OfferExpired, EntityType::Offer, offer.id, now)
                .with_old(json!({ "status": OfferStatus::Generated }))
                .with_new(json!({ "status": offer.status })),
        );

        let still_open = offers
            .iter()
            .any(|o| o.id != offer.id && o.status == OfferStatus::Generated);
        if !still_open && invoice.status == InvoiceStatus::OfferGenerated {
            let old_status = invoice.status;
            invoice.transition_to(InvoiceStatus::Unpaid, now)?;
            tx.uow.update_invoice(&invoice).await?;
            tx.record(
                AuditRecord::new(
                    None,
                    AuditAction::InvoiceReverted,
                    EntityType::Invoice,
                    invoice.id,
                    now,
                )
                .with_old(json!({ "status": old_status }))
                .with_new(json!({
                    "status": invoice.status,
                    "last_offer_id": offer.id.to_string(),
                })),
            );
            tracing::info!(invoice_id = %invoice.id, "invoice.reverted_to_unpaid");
        }
        Ok(true)
    }
}
