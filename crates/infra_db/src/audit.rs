//! Audit trail table

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{AuditRecord, AuditSink, DomainPort, PortError};

use crate::error::DatabaseError;

/// Writes committed audit records to `audit_logs`
///
/// A batch is written in its own transaction; records are idempotent on
/// their id so a retried batch does not duplicate rows.
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgAuditSink {}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, records: &[AuditRecord]) -> Result<(), PortError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO audit_logs
                    (id, actor_id, action, entity_type, entity_id, old_value, new_value,
                     recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(Uuid::from(record.id))
            .bind(record.actor.map(Uuid::from))
            .bind(record.action.as_str())
            .bind(record.entity_type.as_str())
            .bind(record.entity_id)
            .bind(&record.old_value)
            .bind(&record.new_value)
            .bind(record.recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from)?;
        }
        tx.commit().await.map_err(DatabaseError::from)?;
        Ok(())
    }
}
