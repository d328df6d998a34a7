//! Repayment & Default Engine
//!
//! Explicit bounces and the overdue sweep drive the same EMI state machine
//! and converge on one default path, [`default_in`]. A loan defaults only
//! while ACTIVE, so later bounces never post a second provision.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use core_kernel::{AuditAction, AuditRecord, EmiId, EntityType, LoanId, Money, UserId};
use domain_credit::InvoiceStatus;
use domain_ledger::LendingJournals;
use domain_lending::{Emi, EmiStatus, Loan, LoanStatus};

use crate::context::{EngineContext, Transaction};
use crate::error::EngineError;
use crate::services::{require, SweepReport};

/// A PENDING EMI due inside the reminder window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmiReminder {
    pub emi_id: EmiId,
    pub loan_id: LoanId,
    pub installment_number: u32,
    pub amount: Money,
    pub due_date: chrono::DateTime<chrono::Utc>,
}

/// Moves a loan into DEFAULT with all of its side effects
///
/// Marks the invoice DEFAULTED, seizes every PLEDGED collateral, posts the
/// provisioning debit and, if anything was seized, one recovery credit for
/// the seized total. The loan must be locked and ACTIVE.
pub(crate) async fn default_in(
    ctx: &EngineContext,
    tx: &mut Transaction,
    loan: &mut Loan,
    actor: Option<UserId>,
    reason: &str,
) -> Result<(), EngineError> {
    let now = ctx.now();
    let old_status = loan.status;
    loan.mark_default(now)?;
    tx.uow.update_loan(loan).await?;

    if let Some(mut invoice) = tx.uow.lock_invoice(loan.invoice_id).await? {
        if invoice.status == InvoiceStatus::Financed {
            invoice.transition_to(InvoiceStatus::Defaulted, now)?;
            tx.uow.update_invoice(&invoice).await?;
        }
    }

    let currency = loan.principal.currency();
    let mut seized = Money::zero(currency);
    for mut collateral in tx.uow.lock_collaterals_for_loan(loan.id).await? {
        if collateral.is_pledged() {
            let value = collateral.seize(now)?;
            seized = seized.checked_add(&value).map_err(|e| EngineError::Internal(e.to_string()))?;
            tx.uow.update_collateral(&collateral).await?;
        }
    }

    let mut entries = LendingJournals::provisioning(loan.id, loan.disbursed_amount).seal(now)?;
    if seized.is_positive() {
        entries.extend(LendingJournals::collateral_seizure(loan.id, seized).seal(now)?);
    }
    tx.uow.append_ledger(&entries).await?;

    tx.record(
        AuditRecord::new(actor, AuditAction::LoanDefaulted, EntityType::Loan, loan.id, now)
            .with_old(json!({ "status": old_status }))
            .with_new(json!({
                "status": loan.status,
                "reason": reason,
                "recovery_value": seized.amount(),
            })),
    );
    tracing::warn!(loan_id = %loan.id, recovery_value = %seized, reason, "loan.defaulted");
    Ok(())
}

/// EMI payments, bounces and default handling
#[derive(Clone)]
pub struct RepaymentService {
    ctx: EngineContext,
}

impl RepaymentService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Records payment of one EMI
    ///
    /// Closes the loan and marks the invoice REPAID when this was the last
    /// unpaid installment of an ACTIVE loan.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown EMI, `Conflict` if it is already PAID.
    #[instrument(skip(self), fields(emi_id = %emi_id))]
    pub async fn pay_emi(&self, emi_id: EmiId, actor: Option<UserId>) -> Result<Emi, EngineError> {
        let mut tx = self.ctx.begin().await?;
        let result = self.pay_in(&mut tx, emi_id, actor).await;
        tx.finish(&self.ctx, result).await
    }

    async fn pay_in(
        &self,
        tx: &mut Transaction,
        emi_id: EmiId,
        actor: Option<UserId>,
    ) -> Result<Emi, EngineError> {
        let now = self.ctx.now();
        let mut emi = require(tx.uow.lock_emi(emi_id).await?, "EMI", emi_id)?;
        if emi.is_paid() {
            return Err(EngineError::conflict(format!("EMI {} is already PAID", emi.id)));
        }
        let mut loan = require(tx.uow.lock_loan(emi.loan_id).await?, "Loan", emi.loan_id)?;

        let old_status = emi.status;
        emi.pay(now)?;
        tx.uow.update_emi(&emi).await?;

        let entries = LendingJournals::emi_repayment(loan.id, emi.amount).seal(now)?;
        tx.uow.append_ledger(&entries).await?;

        tx.record(
            AuditRecord::new(actor, AuditAction::EmiPaid, EntityType::Emi, emi.id, now)
                .with_old(json!({ "status": old_status }))
                .with_new(json!({ "status": emi.status, "amount": emi.amount.amount() })),
        );
        tracing::info!(emi_id = %emi.id, loan_id = %loan.id, amount = %emi.amount, "emi.paid");

        if loan.status == LoanStatus::Active {
            let schedule = tx.uow.emis_for_loan(loan.id).await?;
            if schedule.iter().all(Emi::is_paid) {
                self.close_in(tx, &mut loan, actor).await?;
            }
        }
        Ok(emi)
    }

    async fn close_in(
        &self,
        tx: &mut Transaction,
        loan: &mut Loan,
        actor: Option<UserId>,
    ) -> Result<(), EngineError> {
        let now = self.ctx.now();
        loan.close(now)?;
        tx.uow.update_loan(loan).await?;
        if let Some(mut invoice) = tx.uow.lock_invoice(loan.invoice_id).await? {
            if invoice.status == InvoiceStatus::Financed {
                invoice.transition_to(InvoiceStatus::Repaid, now)?;
                tx.uow.update_invoice(&invoice).await?;
            }
        }
        tx.record(
            AuditRecord::new(actor, AuditAction::LoanClosed, EntityType::Loan, loan.id, now)
                .with_old(json!({ "status": LoanStatus::Active }))
                .with_new(json!({ "status": loan.status })),
        );
        tracing::info!(loan_id = %loan.id, "loan.closed");
        Ok(())
    }

    /// Records a failed collection attempt for one EMI
    ///
    /// Reaching the configured retry limit defaults an ACTIVE loan in the same
    /// unit of work.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown EMI, `Conflict` if it is already PAID.
    #[instrument(skip(self), fields(emi_id = %emi_id))]
    pub async fn bounce_emi(
        &self,
        emi_id: EmiId,
        actor: Option<UserId>,
    ) -> Result<Emi, EngineError> {
        let mut tx = self.ctx.begin().await?;
        let result = self.bounce_in(&mut tx, emi_id, actor, "emi_bounced").await;
        tx.finish(&self.ctx, result).await
    }

    async fn bounce_in(
        &self,
        tx: &mut Transaction,
        emi_id: EmiId,
        actor: Option<UserId>,
        reason: &str,
    ) -> Result<Emi, EngineError> {
        let now = self.ctx.now();
        let mut emi = require(tx.uow.lock_emi(emi_id).await?, "EMI", emi_id)?;
        if emi.is_paid() {
            return Err(EngineError::conflict(format!("EMI {} is already PAID", emi.id)));
        }
        let mut loan = require(tx.uow.lock_loan(emi.loan_id).await?, "Loan", emi.loan_id)?;

        let old_status = emi.status;
        let retries = emi.bounce(now)?;
        tx.uow.update_emi(&emi).await?;
        tx.record(
            AuditRecord::new(actor, AuditAction::EmiBounced, EntityType::Emi, emi.id, now)
                .with_old(json!({ "status": old_status }))
                .with_new(json!({ "status": emi.status, "retry_count": retries })),
        );
        tracing::warn!(
            emi_id = %emi.id,
            loan_id = %loan.id,
            retry_count = retries,
            reason,
            "emi.bounced"
        );

        if emi.exhausted(self.ctx.config.max_emi_retries) && loan.status == LoanStatus::Active {
            default_in(&self.ctx, tx, &mut loan, actor, reason).await?;
        }
        Ok(emi)
    }

    /// Defaults an ACTIVE loan directly
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown loan, `Conflict` unless the loan is ACTIVE.
    #[instrument(skip(self), fields(loan_id = %loan_id))]
    pub async fn trigger_default(
        &self,
        loan_id: LoanId,
        actor: Option<UserId>,
    ) -> Result<Loan, EngineError> {
        let mut tx = self.ctx.begin().await?;
        let result = async {
            let mut loan = require(tx.uow.lock_loan(loan_id).await?, "Loan", loan_id)?;
            if loan.status != LoanStatus::Active {
                return Err(EngineError::conflict(format!(
                    "loan {} is {}; only ACTIVE loans can default",
                    loan.id, loan.status
                )));
            }
            default_in(&self.ctx, &mut tx, &mut loan, actor, "manual").await?;
            Ok::<Loan, EngineError>(loan)
        }
        .await;
        tx.finish(&self.ctx, result).await
    }

    /// Bounces every PENDING EMI of an ACTIVE loan that is past due
    #[instrument(skip(self))]
    pub async fn classify_overdue_emis(&self) -> Result<SweepReport, EngineError> {
        let now = self.ctx.now();
        let candidates = self.ctx.store.overdue_emi_ids(now).await?;
        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        for emi_id in candidates {
            let mut tx = self.ctx.begin().await?;
            let result = async {
                let Some(emi) = tx.uow.lock_emi(emi_id).await? else {
                    return Ok(false);
                };
                if !emi.is_overdue(now) {
                    return Ok(false);
                }
                let loan_active = tx
                    .uow
                    .lock_loan(emi.loan_id)
                    .await?
                    .is_some_and(|loan| loan.status == LoanStatus::Active);
                if !loan_active {
                    return Ok(false);
                }
                self.bounce_in(&mut tx, emi_id, None, "overdue").await?;
                Ok::<bool, EngineError>(true)
            }
            .await;
            match tx.finish(&self.ctx, result).await {
                Ok(true) => report.processed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(emi_id = %emi_id, error = %e, "job.npa_classification_failed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            bounced = report.processed,
            failed = report.failed,
            "job.npa_classification"
        );
        Ok(report)
    }

    /// PENDING EMIs due within the reminder window, one log event each
    #[instrument(skip(self))]
    pub async fn upcoming_emi_reminders(&self) -> Result<Vec<EmiReminder>, EngineError> {
        let now = self.ctx.now();
        let until = now + Duration::days(i64::from(self.ctx.config.reminder_window_days));
        let due = self.ctx.store.pending_emis_due_between(now, until).await?;

        let reminders: Vec<EmiReminder> = due
            .into_iter()
            .filter(|emi| emi.status == EmiStatus::Pending)
            .map(|emi| EmiReminder {
                emi_id: emi.id,
                loan_id: emi.loan_id,
                installment_number: emi.installment_number,
                amount: emi.amount,
                due_date: emi.due_date,
            })
            .collect();
        for reminder in &reminders {
            tracing::info!(
                emi_id = %reminder.emi_id,
                loan_id = %reminder.loan_id,
                amount = %reminder.amount,
                due_date = %reminder.due_date,
                "emi.reminder_due"
            );
        }
        tracing::info!(count = reminders.len(), "job.emi_reminders");
        Ok(reminders)
    }

    /// Outstanding (unpaid) EMI total of a loan
    pub async fn outstanding(&self, loan_id: LoanId) -> Result<Money, EngineError> {
        let loan = require(self.ctx.store.loan(loan_id).await?, "Loan", loan_id)?;
        let unpaid: Vec<Money> = self
            .ctx
            .store
            .emis_for_loan(loan_id)
            .await?
            .into_iter()
            .filter(|e| !e.is_paid())
            .map(|e| e.amount)
            .collect();
        Money::try_sum(unpaid.iter(), loan.principal.currency())
            .map_err(|e| EngineError::Internal(e.to_string()))
    }
}
