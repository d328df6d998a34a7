//! Shared collaborators and the transaction wrapper used by every service

use std::sync::Arc;

use chrono::{DateTime, Utc};

use core_kernel::{AuditRecord, AuditSink, Clock};
use domain_credit::CreditBureauPort;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::store::{LendingStore, UnitOfWork};

/// Ports, clock and configuration shared by the services
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn LendingStore>,
    pub bureau: Arc<dyn CreditBureauPort>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<EngineConfig>,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn LendingStore>,
        bureau: Arc<dyn CreditBureauPort>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            bureau,
            audit,
            clock,
            config: Arc::new(config),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) async fn begin(&self) -> Result<Transaction, EngineError> {
        Ok(Transaction {
            uow: self.store.begin().await?,
            trail: Vec::new(),
        })
    }

    /// Hands committed records to the sink; sink failures never undo a commit
    async fn publish(&self, records: &[AuditRecord]) {
        if records.is_empty() {
            return;
        }
        if let Err(e) = self.audit.record(records).await {
            tracing::warn!(error = %e, count = records.len(), "audit.sink_failed");
        }
    }
}

/// A unit of work plus the audit records it will publish on commit
pub(crate) struct Transaction {
    pub uow: Box<dyn UnitOfWork>,
    trail: Vec<AuditRecord>,
}

impl Transaction {
    pub fn record(&mut self, record: AuditRecord) {
        self.trail.push(record);
    }

    pub async fn commit(self, ctx: &EngineContext) -> Result<(), EngineError> {
        self.uow.commit().await?;
        ctx.publish(&self.trail).await;
        Ok(())
    }

    pub async fn rollback(self) {
        if let Err(e) = self.uow.rollback().await {
            tracing::warn!(error = %e, "store.rollback_failed");
        }
    }

    /// Commits on success, rolls back on error
    pub async fn finish<T>(
        self,
        ctx: &EngineContext,
        result: Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        match result {
            Ok(value) => {
                self.commit(ctx).await?;
                Ok(value)
            }
            Err(e) => {
                self.rollback().await;
                Err(e)
            }
        }
    }
}
