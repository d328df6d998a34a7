//! PostgreSQL lending store
//!
//! [`PgLendingStore`] serves lock-free reads from the pool. Each
//! [`PgUnitOfWork`] owns one database transaction; `lock_*` reads use
//! `SELECT ... FOR UPDATE`, so two units of work touching the same row
//! serialize on the row lock and the second one re-reads committed state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};

use core_kernel::{
    AdapterHealth, BusinessId, DomainPort, EmiId, HealthCheckResult, HealthCheckable, InvoiceId,
    LoanId, Money, OfferId, PortError, RecoveryId,
};
use credit_engine::{BorrowerExposure, ExposureScope, InvoiceStats, LendingStore, UnitOfWork};
use domain_credit::{BusinessProfile, CreditScore, Invoice, Offer, RiskGrade};
use domain_ledger::{EntryType, LedgerAccount, LedgerEntry};
use domain_lending::{Collateral, CollateralStatus, Emi, Loan, LoanStatus, RecoveryAction};

use crate::error::DatabaseError;
use crate::queries::{self, Lock};

const ADAPTER_ID: &str = "postgres-lending-store";

#[derive(Debug, Clone)]
pub struct PgLendingStore {
    pool: PgPool,
}

impl PgLendingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn conn(&self) -> Result<PoolConnection<Postgres>, PortError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| PortError::from(DatabaseError::from(e)))
    }
}

impl DomainPort for PgLendingStore {}

#[async_trait]
impl HealthCheckable for PgLendingStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
        };
        HealthCheckResult {
            adapter_id: ADAPTER_ID.to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LendingStore for PgLendingStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, PortError> {
        let tx = self.pool.begin().await.map_err(DatabaseError::from)?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn business(&self, id: BusinessId) -> Result<Option<BusinessProfile>, PortError> {
        Ok(queries::business(&mut *self.conn().await?, id, Lock::None).await?)
    }

    async fn business_by_gst(
        &self,
        gst_number: &str,
    ) -> Result<Option<BusinessProfile>, PortError> {
        Ok(queries::business_by_gst(&mut *self.conn().await?, gst_number).await?)
    }

    async fn business_ids(&self) -> Result<Vec<BusinessId>, PortError> {
        Ok(queries::business_ids(&mut *self.conn().await?).await?)
    }

    async fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        Ok(queries::invoice(&mut *self.conn().await?, id, Lock::None).await?)
    }

    async fn invoices_for_business(&self, id: BusinessId) -> Result<Vec<Invoice>, PortError> {
        Ok(queries::invoices_for_business(&mut *self.conn().await?, id).await?)
    }

    async fn invoice_stats(&self, id: BusinessId) -> Result<InvoiceStats, PortError> {
        Ok(queries::invoice_stats(&mut *self.conn().await?, id).await?)
    }

    async fn latest_score(&self, id: BusinessId) -> Result<Option<CreditScore>, PortError> {
        Ok(queries::latest_score(&mut *self.conn().await?, id).await?)
    }

    async fn score_grade_counts(&self) -> Result<Vec<(RiskGrade, u64)>, PortError> {
        Ok(queries::score_grade_counts(&mut *self.conn().await?).await?)
    }

    async fn offer(&self, id: OfferId) -> Result<Option<Offer>, PortError> {
        Ok(queries::offer(&mut *self.conn().await?, id, Lock::None).await?)
    }

    async fn offers_for_invoice(&self, id: InvoiceId) -> Result<Vec<Offer>, PortError> {
        Ok(queries::offers_for_invoice(&mut *self.conn().await?, id, Lock::None).await?)
    }

    async fn loan(&self, id: LoanId) -> Result<Option<Loan>, PortError> {
        Ok(queries::loan(&mut *self.conn().await?, id, Lock::None).await?)
    }

    async fn loans_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>, PortError> {
        Ok(queries::loans_by_status(&mut *self.conn().await?, status).await?)
    }

    async fn emi(&self, id: EmiId) -> Result<Option<Emi>, PortError> {
        Ok(queries::emi(&mut *self.conn().await?, id, Lock::None).await?)
    }

    async fn emis_for_loan(&self, id: LoanId) -> Result<Vec<Emi>, PortError> {
        Ok(queries::emis_for_loan(&mut *self.conn().await?, id).await?)
    }

    async fn collaterals_for_loan(&self, id: LoanId) -> Result<Vec<Collateral>, PortError> {
        Ok(queries::collaterals_for_loan(&mut *self.conn().await?, id, Lock::None).await?)
    }

    async fn collaterals_by_status(
        &self,
        status: CollateralStatus,
    ) -> Result<Vec<Collateral>, PortError> {
        Ok(queries::collaterals_by_status(&mut *self.conn().await?, status).await?)
    }

    async fn ledger_for_loan(&self, id: LoanId) -> Result<Vec<LedgerEntry>, PortError> {
        Ok(queries::ledger_for_loan(&mut *self.conn().await?, id).await?)
    }

    async fn ledger_sums(&self) -> Result<Vec<(LedgerAccount, EntryType, Money)>, PortError> {
        Ok(queries::ledger_sums(&mut *self.conn().await?).await?)
    }

    async fn borrower_exposures(&self) -> Result<Vec<BorrowerExposure>, PortError> {
        Ok(queries::borrower_exposures(&mut *self.conn().await?).await?)
    }

    async fn recovery(&self, id: RecoveryId) -> Result<Option<RecoveryAction>, PortError> {
        Ok(queries::recovery(&mut *self.conn().await?, id, Lock::None).await?)
    }

    async fn recoveries(&self, loan_id: Option<LoanId>) -> Result<Vec<RecoveryAction>, PortError> {
        Ok(queries::recoveries(&mut *self.conn().await?, loan_id).await?)
    }

    async fn expired_offer_ids(&self, now: DateTime<Utc>) -> Result<Vec<OfferId>, PortError> {
        Ok(queries::expired_offer_ids(&mut *self.conn().await?, now).await?)
    }

    async fn overdue_emi_ids(&self, now: DateTime<Utc>) -> Result<Vec<EmiId>, PortError> {
        Ok(queries::overdue_emi_ids(&mut *self.conn().await?, now).await?)
    }

    async fn pending_emis_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Emi>, PortError> {
        Ok(queries::pending_emis_due_between(&mut *self.conn().await?, from, to).await?)
    }
}

/// One PostgreSQL transaction
///
/// Dropping it without `commit` rolls back when the connection returns to
/// the pool.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_business(
        &mut self,
        id: BusinessId,
    ) -> Result<Option<BusinessProfile>, PortError> {
        Ok(queries::business(&mut self.tx, id, Lock::ForUpdate).await?)
    }

    async fn lock_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        Ok(queries::invoice(&mut self.tx, id, Lock::ForUpdate).await?)
    }

    async fn lock_invoice_by_number(
        &mut self,
        business_id: BusinessId,
        invoice_number: &str,
    ) -> Result<Option<Invoice>, PortError> {
        let lock = Lock::ForUpdate;
        Ok(queries::invoice_by_number(&mut self.tx, business_id, invoice_number, lock).await?)
    }

    async fn lock_loan(&mut self, id: LoanId) -> Result<Option<Loan>, PortError> {
        Ok(queries::loan(&mut self.tx, id, Lock::ForUpdate).await?)
    }

    async fn lock_emi(&mut self, id: EmiId) -> Result<Option<Emi>, PortError> {
        Ok(queries::emi(&mut self.tx, id, Lock::ForUpdate).await?)
    }

    async fn lock_recovery(&mut self, id: RecoveryId) -> Result<Option<RecoveryAction>, PortError> {
        Ok(queries::recovery(&mut self.tx, id, Lock::ForUpdate).await?)
    }

    async fn insert_business(&mut self, business: &BusinessProfile) -> Result<(), PortError> {
        Ok(queries::insert_business(&mut self.tx, business).await?)
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), PortError> {
        Ok(queries::insert_invoice(&mut self.tx, invoice).await?)
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), PortError> {
        Ok(queries::update_invoice(&mut self.tx, invoice).await?)
    }

    async fn latest_score(
        &mut self,
        business_id: BusinessId,
    ) -> Result<Option<CreditScore>, PortError> {
        Ok(queries::latest_score(&mut self.tx, business_id).await?)
    }

    async fn insert_score(&mut self, score: &CreditScore) -> Result<(), PortError> {
        Ok(queries::insert_score(&mut self.tx, score).await?)
    }

    async fn invoice_stats(&mut self, business_id: BusinessId) -> Result<InvoiceStats, PortError> {
        Ok(queries::invoice_stats(&mut self.tx, business_id).await?)
    }

    async fn insert_offers(&mut self, offers: &[Offer]) -> Result<(), PortError> {
        for offer in offers {
            queries::insert_offer(&mut self.tx, offer).await?;
        }
        Ok(())
    }

    async fn update_offer(&mut self, offer: &Offer) -> Result<(), PortError> {
        Ok(queries::update_offer(&mut self.tx, offer).await?)
    }

    async fn lock_offers_for_invoice(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<Offer>, PortError> {
        Ok(queries::offers_for_invoice(&mut self.tx, invoice_id, Lock::ForUpdate).await?)
    }

    async fn insert_loan(&mut self, loan: &Loan) -> Result<(), PortError> {
        Ok(queries::insert_loan(&mut self.tx, loan).await?)
    }

    async fn update_loan(&mut self, loan: &Loan) -> Result<(), PortError> {
        Ok(queries::update_loan(&mut self.tx, loan).await?)
    }

    async fn insert_emis(&mut self, emis: &[Emi]) -> Result<(), PortError> {
        for emi in emis {
            queries::insert_emi(&mut self.tx, emi).await?;
        }
        Ok(())
    }

    async fn update_emi(&mut self, emi: &Emi) -> Result<(), PortError> {
        Ok(queries::update_emi(&mut self.tx, emi).await?)
    }

    async fn emis_for_loan(&mut self, loan_id: LoanId) -> Result<Vec<Emi>, PortError> {
        Ok(queries::emis_for_loan(&mut self.tx, loan_id).await?)
    }

    async fn insert_collateral(&mut self, collateral: &Collateral) -> Result<(), PortError> {
        Ok(queries::insert_collateral(&mut self.tx, collateral).await?)
    }

    async fn update_collateral(&mut self, collateral: &Collateral) -> Result<(), PortError> {
        Ok(queries::update_collateral(&mut self.tx, collateral).await?)
    }

    async fn lock_collaterals_for_loan(
        &mut self,
        loan_id: LoanId,
    ) -> Result<Vec<Collateral>, PortError> {
        Ok(queries::collaterals_for_loan(&mut self.tx, loan_id, Lock::ForUpdate).await?)
    }

    async fn insert_recovery(&mut self, recovery: &RecoveryAction) -> Result<(), PortError> {
        Ok(queries::insert_recovery(&mut self.tx, recovery).await?)
    }

    async fn update_recovery(&mut self, recovery: &RecoveryAction) -> Result<(), PortError> {
        Ok(queries::update_recovery(&mut self.tx, recovery).await?)
    }

    async fn append_ledger(&mut self, entries: &[LedgerEntry]) -> Result<(), PortError> {
        for entry in entries {
            queries::append_ledger_entry(&mut self.tx, entry).await?;
        }
        debug!(entries = entries.len(), "db.ledger_appended");
        Ok(())
    }

    async fn exposure(&mut self, scope: &ExposureScope) -> Result<Money, PortError> {
        Ok(queries::exposure(&mut self.tx, scope).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        self.tx.commit().await.map_err(DatabaseError::from)?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortError> {
        if let Err(e) = self.tx.rollback().await {
            warn!(error = %e, "db.rollback_failed");
            return Err(DatabaseError::from(e).into());
        }
        Ok(())
    }
}
