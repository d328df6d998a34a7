//! In-memory lending store
//!
//! Whole transactions are serialized on one async mutex. A unit of work edits
//! a copy of the committed state and swaps it in on commit, so a dropped or
//! rolled back unit of work leaves no trace. Used by tests and local runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use core_kernel::{
    BusinessId, CollateralId, Currency, DomainPort, EmiId, InvoiceId, LoanId, Money, OfferId,
    PortError, RecoveryId, UserId,
};
use domain_credit::{
    BusinessProfile, CreditScore, Invoice, InvoiceStatus, Offer, OfferStatus, RiskGrade,
};
use domain_ledger::{EntryType, LedgerAccount, LedgerEntry};
use domain_lending::{
    Collateral, CollateralStatus, Emi, EmiStatus, Loan, LoanStatus, RecoveryAction,
};

use crate::store::{BorrowerExposure, ExposureScope, InvoiceStats, LendingStore, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct State {
    businesses: BTreeMap<BusinessId, BusinessProfile>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    scores: Vec<CreditScore>,
    offers: BTreeMap<OfferId, Offer>,
    loans: BTreeMap<LoanId, Loan>,
    emis: BTreeMap<EmiId, Emi>,
    collaterals: BTreeMap<CollateralId, Collateral>,
    recoveries: BTreeMap<RecoveryId, RecoveryAction>,
    ledger: Vec<LedgerEntry>,
}

impl State {
    fn invoice_stats(&self, business_id: BusinessId) -> InvoiceStats {
        let invoices: Vec<&Invoice> = self
            .invoices
            .values()
            .filter(|i| i.business_id == business_id)
            .collect();
        let count = invoices.len() as u32;
        let average_delay_days = if count == 0 {
            Decimal::ZERO
        } else {
            let total: i64 = invoices.iter().map(|i| i64::from(i.delay_days)).sum();
            Decimal::from(total) / Decimal::from(count)
        };
        InvoiceStats {
            invoice_count: count,
            average_delay_days,
            repaid_count: invoices
                .iter()
                .filter(|i| i.status == InvoiceStatus::Repaid)
                .count() as u32,
        }
    }

    fn latest_score(&self, business_id: BusinessId) -> Option<CreditScore> {
        self.scores
            .iter()
            .filter(|s| s.business_id == business_id)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned()
    }

    fn exposure(&self, scope: &ExposureScope) -> Result<Money, PortError> {
        let in_scope = |loan: &&Loan| match scope {
            ExposureScope::Portfolio => true,
            ExposureScope::User(user_id) => self
                .businesses
                .get(&loan.business_id)
                .is_some_and(|b| b.user_id == *user_id),
            ExposureScope::Gst(gst) => self
                .businesses
                .get(&loan.business_id)
                .is_some_and(|b| &b.gst_number == gst),
        };
        let amounts: Vec<Money> = self
            .loans
            .values()
            .filter(|l| l.status.counts_toward_exposure())
            .filter(in_scope)
            .map(|l| l.disbursed_amount)
            .collect();
        Money::try_sum(amounts.iter(), Currency::INR)
            .map_err(|e| PortError::internal(e.to_string()))
    }

    fn emis_for_loan(&self, loan_id: LoanId) -> Vec<Emi> {
        let mut emis: Vec<Emi> =
            self.emis.values().filter(|e| e.loan_id == loan_id).cloned().collect();
        emis.sort_by_key(|e| e.installment_number);
        emis
    }
}

fn replace<K: Ord + Copy + std::fmt::Display, V: Clone>(
    map: &mut BTreeMap<K, V>,
    id: K,
    value: &V,
    entity: &str,
) -> Result<(), PortError> {
    match map.get_mut(&id) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(PortError::not_found(entity, id)),
    }
}

fn insert_new<K: Ord + Copy + std::fmt::Display, V: Clone>(
    map: &mut BTreeMap<K, V>,
    id: K,
    value: &V,
    entity: &str,
) -> Result<(), PortError> {
    if map.contains_key(&id) {
        return Err(PortError::conflict(format!("{} {} already exists", entity, id)));
    }
    map.insert(id, value.clone());
    Ok(())
}

/// Lending store kept in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLendingStore {
    state: Arc<Mutex<State>>,
    fail_ledger_appends: Arc<AtomicBool>,
}

impl InMemoryLendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every ledger append fail, to exercise rollback paths
    pub fn fail_ledger_appends(&self, fail: bool) {
        self.fail_ledger_appends.store(fail, Ordering::SeqCst);
    }

    /// All ledger entries in posting order
    pub async fn all_ledger_entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.ledger.clone()
    }
}

impl DomainPort for InMemoryLendingStore {}

#[async_trait]
impl LendingStore for InMemoryLendingStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, PortError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork {
            guard,
            working,
            fail_ledger_appends: self.fail_ledger_appends.load(Ordering::SeqCst),
        }))
    }

    async fn business(&self, id: BusinessId) -> Result<Option<BusinessProfile>, PortError> {
        Ok(self.state.lock().await.businesses.get(&id).cloned())
    }

    async fn business_by_gst(
        &self,
        gst_number: &str,
    ) -> Result<Option<BusinessProfile>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .businesses
            .values()
            .find(|b| b.gst_number == gst_number)
            .cloned())
    }

    async fn business_ids(&self) -> Result<Vec<BusinessId>, PortError> {
        Ok(self.state.lock().await.businesses.keys().copied().collect())
    }

    async fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        Ok(self.state.lock().await.invoices.get(&id).cloned())
    }

    async fn invoices_for_business(&self, id: BusinessId) -> Result<Vec<Invoice>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .invoices
            .values()
            .filter(|i| i.business_id == id)
            .cloned()
            .collect())
    }

    async fn invoice_stats(&self, id: BusinessId) -> Result<InvoiceStats, PortError> {
        Ok(self.state.lock().await.invoice_stats(id))
    }

    async fn latest_score(&self, id: BusinessId) -> Result<Option<CreditScore>, PortError> {
        Ok(self.state.lock().await.latest_score(id))
    }

    async fn score_grade_counts(&self) -> Result<Vec<(RiskGrade, u64)>, PortError> {
        let state = self.state.lock().await;
        Ok(RiskGrade::ALL
            .iter()
            .map(|grade| {
                let n = state.scores.iter().filter(|s| s.risk_grade == *grade).count() as u64;
                (*grade, n)
            })
            .filter(|(_, n)| *n > 0)
            .collect())
    }

    async fn offer(&self, id: OfferId) -> Result<Option<Offer>, PortError> {
        Ok(self.state.lock().await.offers.get(&id).cloned())
    }

    async fn offers_for_invoice(&self, id: InvoiceId) -> Result<Vec<Offer>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .offers
            .values()
            .filter(|o| o.invoice_id == id)
            .cloned()
            .collect())
    }

    async fn loan(&self, id: LoanId) -> Result<Option<Loan>, PortError> {
        Ok(self.state.lock().await.loans.get(&id).cloned())
    }

    async fn loans_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .loans
            .values()
            .filter(|l| l.status == status)
            .cloned()
            .collect())
    }

    async fn emi(&self, id: EmiId) -> Result<Option<Emi>, PortError> {
        Ok(self.state.lock().await.emis.get(&id).cloned())
    }

    async fn emis_for_loan(&self, id: LoanId) -> Result<Vec<Emi>, PortError> {
        Ok(self.state.lock().await.emis_for_loan(id))
    }

    async fn collaterals_for_loan(&self, id: LoanId) -> Result<Vec<Collateral>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .collaterals
            .values()
            .filter(|c| c.loan_id == id)
            .cloned()
            .collect())
    }

    async fn collaterals_by_status(
        &self,
        status: CollateralStatus,
    ) -> Result<Vec<Collateral>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .collaterals
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect())
    }

    async fn ledger_for_loan(&self, id: LoanId) -> Result<Vec<LedgerEntry>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .ledger
            .iter()
            .filter(|e| e.loan_id == id)
            .cloned()
            .collect())
    }

    async fn ledger_sums(&self) -> Result<Vec<(LedgerAccount, EntryType, Money)>, PortError> {
        let state = self.state.lock().await;
        let mut sums: BTreeMap<(LedgerAccount, &'static str), (EntryType, Money)> = BTreeMap::new();
        for entry in &state.ledger {
            let key = (entry.account, entry.entry_type.as_str());
            let (_, total) = sums
                .entry(key)
                .or_insert((entry.entry_type, Money::zero(entry.amount.currency())));
            *total = total
                .checked_add(&entry.amount)
                .map_err(|e| PortError::internal(e.to_string()))?;
        }
        Ok(sums
            .into_iter()
            .map(|((account, _), (side, total))| (account, side, total))
            .collect())
    }

    async fn borrower_exposures(&self) -> Result<Vec<BorrowerExposure>, PortError> {
        let state = self.state.lock().await;
        let mut by_user: BTreeMap<UserId, BorrowerExposure> = BTreeMap::new();
        for loan in state.loans.values().filter(|l| l.status.counts_toward_exposure()) {
            let Some(business) = state.businesses.get(&loan.business_id) else {
                continue;
            };
            let row = by_user.entry(business.user_id).or_insert_with(|| BorrowerExposure {
                user_id: business.user_id,
                exposure: Money::zero(Currency::INR),
                open_loans: 0,
            });
            row.exposure = row
                .exposure
                .checked_add(&loan.disbursed_amount)
                .map_err(|e| PortError::internal(e.to_string()))?;
            row.open_loans += 1;
        }
        let mut rows: Vec<BorrowerExposure> = by_user.into_values().collect();
        rows.sort_by(|a, b| {
            b.exposure
                .amount()
                .cmp(&a.exposure.amount())
                .then(a.user_id.cmp(&b.user_id))
        });
        Ok(rows)
    }

    async fn recovery(&self, id: RecoveryId) -> Result<Option<RecoveryAction>, PortError> {
        Ok(self.state.lock().await.recoveries.get(&id).cloned())
    }

    async fn recoveries(&self, loan_id: Option<LoanId>) -> Result<Vec<RecoveryAction>, PortError> {
        let state = self.state.lock().await;
        let mut actions: Vec<RecoveryAction> = state
            .recoveries
            .values()
            .filter(|r| loan_id.map_or(true, |id| r.loan_id == id))
            .cloned()
            .collect();
        actions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(actions)
    }

    async fn expired_offer_ids(&self, now: DateTime<Utc>) -> Result<Vec<OfferId>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .offers
            .values()
            .filter(|o| o.status == OfferStatus::Generated && o.is_expired(now))
            .map(|o| o.id)
            .collect())
    }

    async fn overdue_emi_ids(&self, now: DateTime<Utc>) -> Result<Vec<EmiId>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .emis
            .values()
            .filter(|e| e.is_overdue(now))
            .map(|e| e.id)
            .collect())
    }

    async fn pending_emis_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Emi>, PortError> {
        let mut emis: Vec<Emi> = self
            .state
            .lock()
            .await
            .emis
            .values()
            .filter(|e| e.status == EmiStatus::Pending && e.due_date >= from && e.due_date <= to)
            .cloned()
            .collect();
        emis.sort_by_key(|e| e.due_date);
        Ok(emis)
    }
}

/// Unit of work over a private copy of the state
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    working: State,
    fail_ledger_appends: bool,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_business(
        &mut self,
        id: BusinessId,
    ) -> Result<Option<BusinessProfile>, PortError> {
        Ok(self.working.businesses.get(&id).cloned())
    }

    async fn lock_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        Ok(self.working.invoices.get(&id).cloned())
    }

    async fn lock_invoice_by_number(
        &mut self,
        business_id: BusinessId,
        invoice_number: &str,
    ) -> Result<Option<Invoice>, PortError> {
        Ok(self
            .working
            .invoices
            .values()
            .find(|i| i.business_id == business_id && i.invoice_number == invoice_number)
            .cloned())
    }

    async fn lock_loan(&mut self, id: LoanId) -> Result<Option<Loan>, PortError> {
        Ok(self.working.loans.get(&id).cloned())
    }

    async fn lock_emi(&mut self, id: EmiId) -> Result<Option<Emi>, PortError> {
        Ok(self.working.emis.get(&id).cloned())
    }

    async fn lock_recovery(&mut self, id: RecoveryId) -> Result<Option<RecoveryAction>, PortError> {
        Ok(self.working.recoveries.get(&id).cloned())
    }

    async fn insert_business(&mut self, business: &BusinessProfile) -> Result<(), PortError> {
        if self.working.businesses.values().any(|b| b.gst_number == business.gst_number) {
            return Err(PortError::conflict(format!(
                "business with GST {} already exists",
                business.gst_number
            )));
        }
        insert_new(&mut self.working.businesses, business.id, business, "business")
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), PortError> {
        let duplicate = self
            .working
            .invoices
            .values()
            .any(|i| {
                i.business_id == invoice.business_id && i.invoice_number == invoice.invoice_number
            });
        if duplicate {
            return Err(PortError::conflict(format!(
                "invoice {} already exists for business {}",
                invoice.invoice_number, invoice.business_id
            )));
        }
        insert_new(&mut self.working.invoices, invoice.id, invoice, "invoice")
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), PortError> {
        replace(&mut self.working.invoices, invoice.id, invoice, "invoice")
    }

    async fn latest_score(
        &mut self,
        business_id: BusinessId,
    ) -> Result<Option<CreditScore>, PortError> {
        Ok(self.working.latest_score(business_id))
    }

    async fn insert_score(&mut self, score: &CreditScore) -> Result<(), PortError> {
        self.working.scores.push(score.clone());
        Ok(())
    }

    async fn invoice_stats(&mut self, business_id: BusinessId) -> Result<InvoiceStats, PortError> {
        Ok(self.working.invoice_stats(business_id))
    }

    async fn insert_offers(&mut self, offers: &[Offer]) -> Result<(), PortError> {
        for offer in offers {
            insert_new(&mut self.working.offers, offer.id, offer, "offer")?;
        }
        Ok(())
    }

    async fn update_offer(&mut self, offer: &Offer) -> Result<(), PortError> {
        replace(&mut self.working.offers, offer.id, offer, "offer")
    }

    async fn lock_offers_for_invoice(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<Offer>, PortError> {
        Ok(self
            .working
            .offers
            .values()
            .filter(|o| o.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn insert_loan(&mut self, loan: &Loan) -> Result<(), PortError> {
        if self.working.loans.values().any(|l| l.offer_id == loan.offer_id) {
            return Err(PortError::conflict(format!("offer {} already has a loan", loan.offer_id)));
        }
        insert_new(&mut self.working.loans, loan.id, loan, "loan")
    }

    async fn update_loan(&mut self, loan: &Loan) -> Result<(), PortError> {
        replace(&mut self.working.loans, loan.id, loan, "loan")
    }

    async fn insert_emis(&mut self, emis: &[Emi]) -> Result<(), PortError> {
        for emi in emis {
            insert_new(&mut self.working.emis, emi.id, emi, "emi")?;
        }
        Ok(())
    }

    async fn update_emi(&mut self, emi: &Emi) -> Result<(), PortError> {
        replace(&mut self.working.emis, emi.id, emi, "emi")
    }

    async fn emis_for_loan(&mut self, loan_id: LoanId) -> Result<Vec<Emi>, PortError> {
        Ok(self.working.emis_for_loan(loan_id))
    }

    async fn insert_collateral(&mut self, collateral: &Collateral) -> Result<(), PortError> {
        insert_new(&mut self.working.collaterals, collateral.id, collateral, "collateral")
    }

    async fn update_collateral(&mut self, collateral: &Collateral) -> Result<(), PortError> {
        replace(&mut self.working.collaterals, collateral.id, collateral, "collateral")
    }

    async fn lock_collaterals_for_loan(
        &mut self,
        loan_id: LoanId,
    ) -> Result<Vec<Collateral>, PortError> {
        Ok(self
            .working
            .collaterals
            .values()
            .filter(|c| c.loan_id == loan_id)
            .cloned()
            .collect())
    }

    async fn insert_recovery(&mut self, recovery: &RecoveryAction) -> Result<(), PortError> {
        insert_new(&mut self.working.recoveries, recovery.id, recovery, "recovery")
    }

    async fn update_recovery(&mut self, recovery: &RecoveryAction) -> Result<(), PortError> {
        replace(&mut self.working.recoveries, recovery.id, recovery, "recovery")
    }

    async fn append_ledger(&mut self, entries: &[LedgerEntry]) -> Result<(), PortError> {
        if self.fail_ledger_appends {
            return Err(PortError::connection("ledger append failed"));
        }
        self.working.ledger.extend_from_slice(entries);
        Ok(())
    }

    async fn exposure(&mut self, scope: &ExposureScope) -> Result<Money, PortError> {
        self.working.exposure(scope)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let InMemoryUnitOfWork { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortError> {
        Ok(())
    }
}
