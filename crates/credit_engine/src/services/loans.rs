//! Loan Lifecycle Manager: sanction and disbursement, plus loan read models

use serde_json::json;
use tracing::instrument;

use core_kernel::{AuditAction, AuditRecord, EntityType, InvoiceId, LoanId, OfferId, UserId};
use domain_credit::{InvoiceStatus, LoanType, OfferStatus};
use domain_ledger::{LendingJournals, LoanLedger};
use domain_lending::{build_schedule, Collateral, CollateralInput, Emi, Loan};

use crate::context::{EngineContext, Transaction};
use crate::error::EngineError;
use crate::services::{ensure_owner, require};

enum SanctionOutcome {
    Disbursed(Loan),
    /// The offer was found expired and has been marked EXPIRED
    Expired(OfferId),
}

/// Sanctions and disburses loans
#[derive(Clone)]
pub struct LoanService {
    ctx: EngineContext,
}

impl LoanService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Accepts an offer and disburses the resulting loan in one unit of work
    ///
    /// On success the loan is ACTIVE, the disbursement pair is posted, the
    /// EMI schedule exists, the offer is ACCEPTED, its sibling offer EXPIRED
    /// and the invoice FINANCED.
    ///
    /// # Errors
    ///
    /// * `NotFound` - unknown offer
    /// * `Conflict` - the offer is not GENERATED or the invoice is not OFFER_GENERATED
    /// * `Expired` - the offer passed its expiry; it is marked EXPIRED before returning
    /// * `Forbidden` - `actor` does not own the invoice
    /// * `Validation` - SECURED offer without valid collateral
    #[instrument(skip(self, collateral), fields(offer_id = %offer_id, actor = %actor))]
    pub async fn sanction(
        &self,
        offer_id: OfferId,
        actor: UserId,
        collateral: Option<CollateralInput>,
    ) -> Result<Loan, EngineError> {
        let invoice_id =
            require(self.ctx.store.offer(offer_id).await?, "Offer", offer_id)?.invoice_id;
        let mut tx = self.ctx.begin().await?;
        let result = self.sanction_in(&mut tx, invoice_id, offer_id, actor, collateral).await;
        match tx.finish(&self.ctx, result).await? {
            SanctionOutcome::Disbursed(loan) => Ok(loan),
            SanctionOutcome::Expired(id) => {
                Err(EngineError::Expired(format!("offer {} has expired", id)))
            }
        }
    }

    /// Locks the invoice, then all of its offers, then the business
    async fn sanction_in(
        &self,
        tx: &mut Transaction,
        invoice_id: InvoiceId,
        offer_id: OfferId,
        actor: UserId,
        collateral: Option<CollateralInput>,
    ) -> Result<SanctionOutcome, EngineError> {
        let now = self.ctx.now();
        let mut invoice = require(tx.uow.lock_invoice(invoice_id).await?, "Invoice", invoice_id)?;
        let offers = tx.uow.lock_offers_for_invoice(invoice.id).await?;
        let mut offer =
            require(offers.iter().find(|o| o.id == offer_id).cloned(), "Offer", offer_id)?;
        if offer.status != OfferStatus::Generated {
            return Err(EngineError::conflict(format!(
                "offer {} is {}; only GENERATED offers can be accepted",
                offer.id, offer.status
            )));
        }
        if offer.is_expired(now) {
            offer.transition_to(OfferStatus::Expired)?;
            tx.uow.update_offer(&offer).await?;
            tx.record(
                AuditRecord::new(
                    Some(actor),
                    AuditAction::OfferExpired,
                    EntityType::Offer,
                    offer.id,
                    now,
                )
                .with_old(json!({ "status": OfferStatus::Generated }))
                .with_new(json!({ "status": offer.status })),
            );
            tracing::info!(offer_id = %offer.id, "offer.expired_on_accept");
            return Ok(SanctionOutcome::Expired(offer.id));
        }

        let business = require(
            tx.uow.lock_business(invoice.business_id).await?,
            "Business",
            invoice.business_id,
        )?;
        ensure_owner(&business, actor)?;
        if invoice.status != InvoiceStatus::OfferGenerated {
            return Err(EngineError::conflict(format!(
                "invoice {} is {}; it cannot be financed",
                invoice.id, invoice.status
            )));
        }

        let pledge = match (offer.loan_type, collateral) {
            (LoanType::Secured, Some(input)) => {
                input.validate()?;
                Some(input)
            }
            (LoanType::Secured, None) => {
                return Err(EngineError::Validation(
                    "collateral description and value are required for SECURED loans".into(),
                ))
            }
            (LoanType::Unsecured, _) => None,
        };

        let mut loan = Loan::sanction(&offer, &invoice, now)?;
        tx.uow.insert_loan(&loan).await?;

        offer.transition_to(OfferStatus::Accepted)?;
        tx.uow.update_offer(&offer).await?;
        for mut sibling in offers {
            if sibling.id != offer.id && sibling.status == OfferStatus::Generated {
                sibling.transition_to(OfferStatus::Expired)?;
                tx.uow.update_offer(&sibling).await?;
                tx.record(
                    AuditRecord::new(
                        Some(actor),
                        AuditAction::OfferExpired,
                        EntityType::Offer,
                        sibling.id,
                        now,
                    )
                    .with_old(json!({ "status": OfferStatus::Generated }))
                    .with_new(json!({
                        "status": sibling.status,
                        "accepted_offer_id": offer.id.to_string(),
                    })),
                );
            }
        }

        invoice.transition_to(InvoiceStatus::Financed, now)?;
        tx.uow.update_invoice(&invoice).await?;

        if let Some(input) = pledge {
            let collateral = Collateral::pledge(loan.id, input, now)?;
            tx.uow.insert_collateral(&collateral).await?;
        }

        let disbursed = loan.disburse(now)?;
        let entries = LendingJournals::disbursement(loan.id, disbursed).seal(now)?;
        tx.uow.append_ledger(&entries).await?;

        let schedule = build_schedule(
            loan.id,
            loan.principal,
            offer.interest_rate,
            offer.tenure_months,
            self.ctx.config.emi_interval_days,
            now,
        )?;
        tx.uow.insert_emis(&schedule).await?;
        tx.uow.update_loan(&loan).await?;

        tx.record(
            AuditRecord::new(
                Some(actor),
                AuditAction::LoanSanctionedAndDisbursed,
                EntityType::Loan,
                loan.id,
                now,
            )
            .with_new(json!({
                "status": loan.status,
                "principal": loan.principal.amount(),
                "loan_type": loan.loan_type,
                "offer_id": offer.id.to_string(),
                "emi_count": schedule.len(),
            })),
        );
        tracing::info!(
            loan_id = %loan.id,
            principal = %loan.principal,
            loan_type = %loan.loan_type,
            emis = schedule.len(),
            "loan.disbursed"
        );
        Ok(SanctionOutcome::Disbursed(loan))
    }

    pub async fn loan(&self, loan_id: LoanId) -> Result<Loan, EngineError> {
        require(self.ctx.store.loan(loan_id).await?, "Loan", loan_id)
    }

    /// EMIs of a loan in installment order
    pub async fn emi_schedule(&self, loan_id: LoanId) -> Result<Vec<Emi>, EngineError> {
        self.loan(loan_id).await?;
        Ok(self.ctx.store.emis_for_loan(loan_id).await?)
    }

    pub async fn collaterals(&self, loan_id: LoanId) -> Result<Vec<Collateral>, EngineError> {
        self.loan(loan_id).await?;
        Ok(self.ctx.store.collaterals_for_loan(loan_id).await?)
    }

    /// Ledger entries of a loan with per-account balances
    pub async fn ledger(&self, loan_id: LoanId) -> Result<LoanLedger, EngineError> {
        let loan = self.loan(loan_id).await?;
        let entries = self.ctx.store.ledger_for_loan(loan_id).await?;
        Ok(LoanLedger::from_entries(loan_id, entries, loan.principal.currency())?)
    }
}
