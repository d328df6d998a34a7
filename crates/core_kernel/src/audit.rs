//! Audit records for lifecycle transitions
//!
//! Each state transition produces exactly one [`AuditRecord`]. Services buffer
//! records inside their unit of work and hand them to an [`AuditSink`] only
//! after the transaction commits; a rolled back operation leaves no trail.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::identifiers::{AuditEventId, UserId};
use crate::ports::{DomainPort, PortError};

crate::code_enum! {
    /// The transition being recorded
    pub enum AuditAction {
        InvoicesSynced => "INVOICES_SYNCED",
        BusinessOnboarded => "BUSINESS_ONBOARDED",
        CreditScoreCalculated => "CREDIT_SCORE_CALCULATED",
        OfferGenerated => "OFFER_GENERATED",
        OfferExpired => "OFFER_EXPIRED",
        InvoiceReverted => "INVOICE_REVERTED",
        LoanSanctionedAndDisbursed => "LOAN_SANCTIONED_AND_DISBURSED",
        EmiPaid => "EMI_PAID",
        EmiBounced => "EMI_BOUNCED",
        LoanClosed => "LOAN_CLOSED",
        LoanDefaulted => "LOAN_DEFAULTED",
        RecoveryInitiated => "RECOVERY_INITIATED",
        RecoveryStarted => "RECOVERY_STARTED",
        RecoveryCompleted => "RECOVERY_COMPLETED",
        RecoveryFailed => "RECOVERY_FAILED",
    }
}

crate::code_enum! {
    /// Kind of entity an audit record refers to
    pub enum EntityType {
        Business => "business",
        Invoice => "invoice",
        CreditScore => "credit_score",
        Offer => "offer",
        Loan => "loan",
        Emi => "emi",
        Recovery => "recovery",
    }
}

/// One audited state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditEventId,
    /// Acting user; `None` for system-driven transitions (sweeps)
    pub actor: Option<UserId>,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: uuid::Uuid,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        actor: Option<UserId>,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: impl Into<uuid::Uuid>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEventId::new_v7(),
            actor,
            action,
            entity_type,
            entity_id: entity_id.into(),
            old_value: None,
            new_value: None,
            recorded_at,
        }
    }

    pub fn with_old(mut self, value: serde_json::Value) -> Self {
        self.old_value = Some(value);
        self
    }

    pub fn with_new(mut self, value: serde_json::Value) -> Self {
        self.new_value = Some(value);
        self
    }
}

/// Destination for committed audit records
#[async_trait]
pub trait AuditSink: DomainPort {
    /// Persists or forwards a batch of records from one committed transaction
    async fn record(&self, records: &[AuditRecord]) -> Result<(), PortError>;
}

/// Emits each record as a structured `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl DomainPort for TracingAuditSink {}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, records: &[AuditRecord]) -> Result<(), PortError> {
        for record in records {
            tracing::info!(
                target: "audit",
                action = record.action.as_str(),
                entity_type = record.entity_type.as_str(),
                entity_id = %record.entity_id,
                actor = ?record.actor,
                old_value = ?record.old_value,
                new_value = ?record.new_value,
                "audit"
            );
        }
        Ok(())
    }
}

/// Keeps records in memory; handy for assertions
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }

    /// Records for one action, in emission order
    pub async fn with_action(&self, action: AuditAction) -> Vec<AuditRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.action == action)
            .cloned()
            .collect()
    }
}

impl DomainPort for InMemoryAuditSink {}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, records: &[AuditRecord]) -> Result<(), PortError> {
        self.records.write().await.extend_from_slice(records);
        Ok(())
    }
}
