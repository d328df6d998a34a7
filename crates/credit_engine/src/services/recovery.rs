//! Recovery Tracker
//!
//! Recovery actions open only against DEFAULT loans. Completing one posts a
//! recovery credit; the loan itself stays DEFAULT.

use serde_json::json;
use tracing::instrument;

use core_kernel::{AuditAction, AuditRecord, EntityType, LoanId, Money, RecoveryId, UserId};
use domain_ledger::LendingJournals;
use domain_lending::{RecoveryAction, RecoveryActionType};

use crate::context::{EngineContext, Transaction};
use crate::error::EngineError;
use crate::services::require;

#[derive(Clone)]
pub struct RecoveryService {
    ctx: EngineContext,
}

impl RecoveryService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Opens a recovery action against a defaulted loan
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown loan, `Validation` unless it is DEFAULT.
    #[instrument(skip(self, notes), fields(loan_id = %loan_id, action_type = %action_type))]
    pub async fn initiate(
        &self,
        loan_id: LoanId,
        action_type: RecoveryActionType,
        notes: Option<String>,
        actor: UserId,
    ) -> Result<RecoveryAction, EngineError> {
        let mut tx = self.ctx.begin().await?;
        let result = async {
            let now = self.ctx.now();
            let loan = require(tx.uow.lock_loan(loan_id).await?, "Loan", loan_id)?;
            let action = RecoveryAction::initiate(&loan, action_type, notes, now)?;
            tx.uow.insert_recovery(&action).await?;
            tx.record(
                AuditRecord::new(
                    Some(actor),
                    AuditAction::RecoveryInitiated,
                    EntityType::Loan,
                    loan.id,
                    now,
                )
                .with_new(json!({
                    "action_type": action.action_type,
                    "recovery_id": action.id.to_string(),
                })),
            );
            tracing::info!(loan_id = %loan.id, recovery_id = %action.id, "recovery.initiated");
            Ok::<RecoveryAction, EngineError>(action)
        }
        .await;
        tx.finish(&self.ctx, result).await
    }

    /// Moves an INITIATED action to IN_PROGRESS
    #[instrument(skip(self), fields(recovery_id = %recovery_id))]
    pub async fn mark_in_progress(
        &self,
        recovery_id: RecoveryId,
        actor: UserId,
    ) -> Result<RecoveryAction, EngineError> {
        let mut tx = self.ctx.begin().await?;
        let result = async {
            let now = self.ctx.now();
            let mut action = self.lock(&mut tx, recovery_id).await?;
            let old_status = action.status;
            action.start(now)?;
            tx.uow.update_recovery(&action).await?;
            tx.record(
                AuditRecord::new(
                    Some(actor),
                    AuditAction::RecoveryStarted,
                    EntityType::Recovery,
                    action.id,
                    now,
                )
                .with_old(json!({ "status": old_status }))
                .with_new(json!({ "status": action.status })),
            );
            Ok::<RecoveryAction, EngineError>(action)
        }
        .await;
        tx.finish(&self.ctx, result).await
    }

    /// Completes an action and posts the recovered amount to the ledger
    ///
    /// # Errors
    ///
    /// `Conflict` if the action is already COMPLETED or FAILED, `Validation`
    /// if the amount is not positive.
    #[instrument(skip(self), fields(recovery_id = %recovery_id, amount = %amount))]
    pub async fn complete(
        &self,
        recovery_id: RecoveryId,
        amount: Money,
        actor: UserId,
    ) -> Result<RecoveryAction, EngineError> {
        let mut tx = self.ctx.begin().await?;
        let result = async {
            let now = self.ctx.now();
            let mut action = self.lock(&mut tx, recovery_id).await?;
            if action.status.is_terminal() {
                return Err(EngineError::conflict(format!(
                    "recovery action {} is already {}",
                    action.id, action.status
                )));
            }
            action.complete(amount, now)?;
            tx.uow.update_recovery(&action).await?;

            let entries = LendingJournals::recovery_settlement(
                action.loan_id,
                action.amount_recovered,
                action.action_type.as_str(),
            )
            .seal(now)?;
            tx.uow.append_ledger(&entries).await?;

            tx.record(
                AuditRecord::new(
                    Some(actor),
                    AuditAction::RecoveryCompleted,
                    EntityType::Recovery,
                    action.id,
                    now,
                )
                .with_new(json!({
                    "status": action.status,
                    "amount_recovered": action.amount_recovered.amount(),
                })),
            );
            tracing::info!(
                recovery_id = %action.id,
                loan_id = %action.loan_id,
                amount = %action.amount_recovered,
                "recovery.completed"
            );
            Ok::<RecoveryAction, EngineError>(action)
        }
        .await;
        tx.finish(&self.ctx, result).await
    }

    /// Marks an open action FAILED, keeping the reason in its notes
    #[instrument(skip(self, reason), fields(recovery_id = %recovery_id))]
    pub async fn fail(
        &self,
        recovery_id: RecoveryId,
        reason: Option<String>,
        actor: UserId,
    ) -> Result<RecoveryAction, EngineError> {
        let mut tx = self.ctx.begin().await?;
        let result = async {
            let now = self.ctx.now();
            let mut action = self.lock(&mut tx, recovery_id).await?;
            let old_status = action.status;
            action.fail(reason, now)?;
            tx.uow.update_recovery(&action).await?;
            tx.record(
                AuditRecord::new(
                    Some(actor),
                    AuditAction::RecoveryFailed,
                    EntityType::Recovery,
                    action.id,
                    now,
                )
                .with_old(json!({ "status": old_status }))
                .with_new(json!({ "status": action.status, "notes": action.notes })),
            );
            tracing::warn!(recovery_id = %action.id, loan_id = %action.loan_id, "recovery.failed");
            Ok::<RecoveryAction, EngineError>(action)
        }
        .await;
        tx.finish(&self.ctx, result).await
    }

    /// Recovery actions, newest first
    pub async fn list(&self, loan_id: Option<LoanId>) -> Result<Vec<RecoveryAction>, EngineError> {
        Ok(self.ctx.store.recoveries(loan_id).await?)
    }

    /// Locks the action and then its loan
    async fn lock(
        &self,
        tx: &mut Transaction,
        recovery_id: RecoveryId,
    ) -> Result<RecoveryAction, EngineError> {
        let action =
            require(tx.uow.lock_recovery(recovery_id).await?, "RecoveryAction", recovery_id)?;
        require(tx.uow.lock_loan(action.loan_id).await?, "Loan", action.loan_id)?;
        Ok(action)
    }
}

