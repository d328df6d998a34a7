//! Invoice sync and manual invoice entry
//!
//! Provider invoices arrive already normalized (see
//! [`domain_credit::normalize_invoices`]) and are upserted by
//! `(business, invoice_number)`. Existing invoices are refreshed only while
//! UNPAID; financed history is never rewritten by the provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use core_kernel::{AuditAction, AuditRecord, BusinessId, EntityType, Money, UserId};
use domain_credit::{BusinessProfile, Invoice, NormalizedInvoices};

use crate::context::{EngineContext, Transaction};
use crate::error::EngineError;
use crate::services::{ensure_owner, require};

/// Counts from one sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Provider records that could not be used
    pub skipped: usize,
}

/// An invoice keyed in by the business owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualInvoice {
    pub invoice_number: String,
    pub amount: Money,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub delay_days: i32,
}

/// Upserts provider records inside an open unit of work
pub(crate) async fn upsert_invoices(
    ctx: &EngineContext,
    tx: &mut Transaction,
    business: &BusinessProfile,
    normalized: NormalizedInvoices,
) -> Result<SyncReport, EngineError> {
    let now = ctx.now();
    let mut report = SyncReport {
        skipped: normalized.skipped.len(),
        ..SyncReport::default()
    };

    for record in normalized.invoices {
        match tx.uow.lock_invoice_by_number(business.id, &record.invoice_number).await? {
            Some(mut existing) => {
                let changed = existing.refresh_from_provider(
                    record.amount,
                    record.due_date,
                    record.delay_days,
                    now,
                );
                if changed {
                    tx.uow.update_invoice(&existing).await?;
                    tracing::debug!(
                        invoice_number = %existing.invoice_number,
                        "invoice_sync.updated"
                    );
                    report.updated += 1;
                } else {
                    report.unchanged += 1;
                }
            }
            None => match Invoice::new(
                business.id,
                record.invoice_number.clone(),
                record.amount,
                record.due_date,
                record.delay_days,
                now,
            ) {
                Ok(invoice) => {
                    tx.uow.insert_invoice(&invoice).await?;
                    tracing::debug!(
                        invoice_number = %invoice.invoice_number,
                        "invoice_sync.created"
                    );
                    report.created += 1;
                }
                Err(e) => {
                    tracing::debug!(
                        invoice_number = %record.invoice_number,
                        error = %e,
                        "invoice_sync.record_skipped"
                    );
                    report.skipped += 1;
                }
            },
        }
    }
    Ok(report)
}

/// Pulls invoices from the provider and accepts manual entries
#[derive(Clone)]
pub struct InvoiceSyncService {
    ctx: EngineContext,
}

impl InvoiceSyncService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Fetches the unpaid invoices of a business and upserts them
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown business, `ExternalProvider` if the provider
    /// call fails; nothing is written in that case.
    #[instrument(skip(self), fields(business_id = %business_id))]
    pub async fn sync(
        &self,
        business_id: BusinessId,
        actor: Option<UserId>,
    ) -> Result<SyncReport, EngineError> {
        let business =
            require(self.ctx.store.business(business_id).await?, "Business", business_id)?;
        let normalized = self
            .ctx
            .bureau
            .unpaid_invoices(&business.gst_number)
            .await
            .map_err(|e| {
                tracing::warn!(gst = %business.gst_number, error = %e, "invoice_sync.failed");
                EngineError::provider(e)
            })?;

        let mut tx = self.ctx.begin().await?;
        let result = async {
            let report = upsert_invoices(&self.ctx, &mut tx, &business, normalized).await?;
            tx.record(
                AuditRecord::new(
                    actor,
                    AuditAction::InvoicesSynced,
                    EntityType::Business,
                    business.id,
                    self.ctx.now(),
                )
                .with_new(json!(report)),
            );
            Ok::<SyncReport, EngineError>(report)
        }
        .await;
        let report = tx.finish(&self.ctx, result).await?;

        tracing::info!(
            gst = %business.gst_number,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            "invoice_sync.complete"
        );
        Ok(report)
    }

    /// Registers an invoice by hand
    ///
    /// # Errors
    ///
    /// `Forbidden` if `actor` does not own the business, `Conflict` if the
    /// number is already registered, `Validation` for a bad amount or number.
    #[instrument(skip(self, invoice), fields(business_id = %business_id))]
    pub async fn register_invoice(
        &self,
        business_id: BusinessId,
        actor: UserId,
        invoice: ManualInvoice,
    ) -> Result<Invoice, EngineError> {
        let mut tx = self.ctx.begin().await?;
        let result = async {
            let business =
                require(tx.uow.lock_business(business_id).await?, "Business", business_id)?;
            ensure_owner(&business, actor)?;
            if tx
                .uow
                .lock_invoice_by_number(business.id, &invoice.invoice_number)
                .await?
                .is_some()
            {
                return Err(EngineError::conflict(format!(
                    "invoice {} is already registered",
                    invoice.invoice_number
                )));
            }
            let created = Invoice::new(
                business.id,
                invoice.invoice_number,
                invoice.amount,
                invoice.due_date,
                invoice.delay_days,
                self.ctx.now(),
            )?;
            tx.uow.insert_invoice(&created).await?;
            tracing::info!(
                invoice_id = %created.id,
                invoice_number = %created.invoice_number,
                "invoice.registered"
            );
            Ok::<Invoice, EngineError>(created)
        }
        .await;
        tx.finish(&self.ctx, result).await
    }

    pub async fn invoice(
        &self,
        invoice_id: core_kernel::InvoiceId,
    ) -> Result<Invoice, EngineError> {
        require(self.ctx.store.invoice(invoice_id).await?, "Invoice", invoice_id)
    }

    pub async fn invoices(&self, business_id: BusinessId) -> Result<Vec<Invoice>, EngineError> {
        Ok(self.ctx.store.invoices_for_business(business_id).await?)
    }
}
