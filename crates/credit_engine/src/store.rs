//! Lending Store Port
//!
//! The engine's only view of persistence. A [`UnitOfWork`] is one
//! transaction: `lock_*` methods take exclusive row locks held until
//! [`UnitOfWork::commit`] or [`UnitOfWork::rollback`]; dropping a unit of work
//! without committing rolls it back.
//!
//! Lock order used by the services, outermost first:
//!
//! ```text
//! invoice ─► business                     (offer generation)
//! invoice ─► offers ─► business           (sanction)
//! invoice ─► offers                       (offer expiry)
//! emi ─► loan ─► invoice ─► collateral    (repayment, default)
//! recovery ─► loan                        (recovery)
//! ```
//!
//! Offer operations find the invoice with a lock-free read of the offer and
//! then lock every offer of that invoice at once, so two offers of one
//! invoice are never locked in different orders.
//!
//! Lock-free reads on [`LendingStore`] serve read models and sweep candidate
//! selection. Sweeps re-lock and re-validate every candidate in its own unit
//! of work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{
    BusinessId, DomainPort, EmiId, InvoiceId, LoanId, Money, OfferId, PortError, RecoveryId, UserId,
};
use domain_credit::{BusinessProfile, CreditScore, Invoice, Offer, RiskGrade};
use domain_ledger::{EntryType, LedgerAccount, LedgerEntry};
use domain_lending::{Collateral, CollateralStatus, Emi, Loan, LoanStatus, RecoveryAction};

/// Which outstanding principal to aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExposureScope {
    /// All businesses owned by a user
    User(UserId),
    /// One GST registration
    Gst(String),
    Portfolio,
}

/// Locally observable invoice history of a business
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceStats {
    pub invoice_count: u32,
    pub average_delay_days: Decimal,
    pub repaid_count: u32,
}

/// Open exposure of one user across all of their businesses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorrowerExposure {
    pub user_id: UserId,
    /// Disbursed amount of SANCTIONED and ACTIVE loans
    pub exposure: Money,
    pub open_loans: u64,
}

/// Transactional store
#[async_trait]
pub trait LendingStore: DomainPort {
    /// Starts a unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, PortError>;

    async fn business(&self, id: BusinessId) -> Result<Option<BusinessProfile>, PortError>;

    async fn business_by_gst(&self, gst_number: &str) -> Result<Option<BusinessProfile>, PortError>;

    async fn business_ids(&self) -> Result<Vec<BusinessId>, PortError>;

    async fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError>;

    async fn invoices_for_business(&self, id: BusinessId) -> Result<Vec<Invoice>, PortError>;

    async fn invoice_stats(&self, id: BusinessId) -> Result<InvoiceStats, PortError>;

    async fn latest_score(&self, id: BusinessId) -> Result<Option<CreditScore>, PortError>;

    /// Number of score records per grade, over all records
    async fn score_grade_counts(&self) -> Result<Vec<(RiskGrade, u64)>, PortError>;

    async fn offer(&self, id: OfferId) -> Result<Option<Offer>, PortError>;

    async fn offers_for_invoice(&self, id: InvoiceId) -> Result<Vec<Offer>, PortError>;

    async fn loan(&self, id: LoanId) -> Result<Option<Loan>, PortError>;

    async fn loans_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>, PortError>;

    async fn emi(&self, id: EmiId) -> Result<Option<Emi>, PortError>;

    /// EMIs of a loan in installment order
    async fn emis_for_loan(&self, id: LoanId) -> Result<Vec<Emi>, PortError>;

    async fn collaterals_for_loan(&self, id: LoanId) -> Result<Vec<Collateral>, PortError>;

    async fn collaterals_by_status(
        &self,
        status: CollateralStatus,
    ) -> Result<Vec<Collateral>, PortError>;

    async fn ledger_for_loan(&self, id: LoanId) -> Result<Vec<LedgerEntry>, PortError>;

    /// Ledger amounts summed per account and side over every loan
    async fn ledger_sums(&self) -> Result<Vec<(LedgerAccount, EntryType, Money)>, PortError>;

    /// Users with open exposure, largest first
    async fn borrower_exposures(&self) -> Result<Vec<BorrowerExposure>, PortError>;

    async fn recovery(&self, id: RecoveryId) -> Result<Option<RecoveryAction>, PortError>;

    /// Recovery actions, newest first, optionally for one loan
    async fn recoveries(&self, loan_id: Option<LoanId>) -> Result<Vec<RecoveryAction>, PortError>;

    /// GENERATED offers whose expiry is at or before `now`
    async fn expired_offer_ids(&self, now: DateTime<Utc>) -> Result<Vec<OfferId>, PortError>;

    /// PENDING EMIs due strictly before `now`
    async fn overdue_emi_ids(&self, now: DateTime<Utc>) -> Result<Vec<EmiId>, PortError>;

    /// PENDING EMIs due in `[from, to]`
    async fn pending_emis_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Emi>, PortError>;
}

/// One transaction against the lending store
#[async_trait]
pub trait UnitOfWork: Send {
    async fn lock_business(&mut self, id: BusinessId) -> Result<Option<BusinessProfile>, PortError>;

    async fn lock_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError>;

    /// Locks the invoice with this number under a business, if any
    async fn lock_invoice_by_number(
        &mut self,
        business_id: BusinessId,
        invoice_number: &str,
    ) -> Result<Option<Invoice>, PortError>;

    async fn lock_loan(&mut self, id: LoanId) -> Result<Option<Loan>, PortError>;

    async fn lock_emi(&mut self, id: EmiId) -> Result<Option<Emi>, PortError>;

    async fn lock_recovery(&mut self, id: RecoveryId) -> Result<Option<RecoveryAction>, PortError>;

    async fn insert_business(&mut self, business: &BusinessProfile) -> Result<(), PortError>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), PortError>;

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), PortError>;

    async fn latest_score(
        &mut self,
        business_id: BusinessId,
    ) -> Result<Option<CreditScore>, PortError>;

    async fn insert_score(&mut self, score: &CreditScore) -> Result<(), PortError>;

    async fn invoice_stats(&mut self, business_id: BusinessId) -> Result<InvoiceStats, PortError>;

    async fn insert_offers(&mut self, offers: &[Offer]) -> Result<(), PortError>;

    async fn update_offer(&mut self, offer: &Offer) -> Result<(), PortError>;

    /// Offers of an invoice, locked
    async fn lock_offers_for_invoice(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<Offer>, PortError>;

    async fn insert_loan(&mut self, loan: &Loan) -> Result<(), PortError>;

    async fn update_loan(&mut self, loan: &Loan) -> Result<(), PortError>;

    async fn insert_emis(&mut self, emis: &[Emi]) -> Result<(), PortError>;

    async fn update_emi(&mut self, emi: &Emi) -> Result<(), PortError>;

    /// EMIs of a loan as seen inside this transaction
    async fn emis_for_loan(&mut self, loan_id: LoanId) -> Result<Vec<Emi>, PortError>;

    async fn insert_collateral(&mut self, collateral: &Collateral) -> Result<(), PortError>;

    async fn update_collateral(&mut self, collateral: &Collateral) -> Result<(), PortError>;

    /// Collaterals of a loan, locked
    async fn lock_collaterals_for_loan(
        &mut self,
        loan_id: LoanId,
    ) -> Result<Vec<Collateral>, PortError>;

    async fn insert_recovery(&mut self, recovery: &RecoveryAction) -> Result<(), PortError>;

    async fn update_recovery(&mut self, recovery: &RecoveryAction) -> Result<(), PortError>;

    /// Appends sealed entries; never updates or deletes
    async fn append_ledger(&mut self, entries: &[LedgerEntry]) -> Result<(), PortError>;

    /// Sum of disbursed amounts of SANCTIONED and ACTIVE loans in scope
    async fn exposure(&mut self, scope: &ExposureScope) -> Result<Money, PortError>;

    async fn commit(self: Box<Self>) -> Result<(), PortError>;

    async fn rollback(self: Box<Self>) -> Result<(), PortError>;
}
