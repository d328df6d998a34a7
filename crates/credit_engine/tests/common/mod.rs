//! Shared harness for engine integration tests
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use core_kernel::{
    AuditAction, Clock, InMemoryAuditSink, InvoiceId, ManualClock, Money, OfferId, UserId,
};
use credit_engine::{CreditEngine, EngineConfig, InMemoryLendingStore, LendingStore};
use domain_credit::{
    BusinessProfile, Invoice, InvoiceStatus, MockCreditBureau, Offer, OfferStatus, RiskGrade,
};
use domain_lending::Loan;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

pub struct Harness {
    pub engine: CreditEngine,
    pub store: InMemoryLendingStore,
    pub bureau: MockCreditBureau,
    pub audit: InMemoryAuditSink,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = InMemoryLendingStore::new();
        let bureau = MockCreditBureau::new();
        let audit = InMemoryAuditSink::new();
        let clock = ManualClock::new(start());
        let engine = CreditEngine::new(
            Arc::new(store.clone()),
            Arc::new(bureau.clone()),
            Arc::new(audit.clone()),
            Arc::new(clock.clone()),
            config,
        )
        .unwrap();
        Self {
            engine,
            store,
            bureau,
            audit,
            clock,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn business(&self, user: UserId, gst: &str) -> BusinessProfile {
        let business =
            BusinessProfile::new(user, gst, start()).with_identity("123412341234", "ABCDE1234F");
        let mut uow = self.store.begin().await.unwrap();
        uow.insert_business(&business).await.unwrap();
        uow.commit().await.unwrap();
        business
    }

    pub async fn invoice(
        &self,
        business: &BusinessProfile,
        number: &str,
        amount: Decimal,
    ) -> Invoice {
        let invoice = Invoice::new(
            business.id,
            number,
            Money::inr(amount),
            start() + Duration::days(60),
            0,
            start(),
        )
        .unwrap();
        let mut uow = self.store.begin().await.unwrap();
        uow.insert_invoice(&invoice).await.unwrap();
        uow.commit().await.unwrap();
        invoice
    }

    /// Seeds an ACTIVE loan worth `amount` for the business, outside the engine
    pub async fn active_loan(&self, business: &BusinessProfile, amount: Decimal) -> Loan {
        let mut invoice = Invoice::new(
            business.id,
            format!("SEED-{}", uuid::Uuid::new_v4()),
            Money::inr(amount),
            start(),
            0,
            start(),
        )
        .unwrap();
        invoice.status = InvoiceStatus::Financed;
        let [offer, _] =
            Offer::generate_pair(invoice.id, RiskGrade::A, &Default::default(), start());
        let mut loan = Loan::sanction(&offer, &invoice, start()).unwrap();
        loan.disburse(start()).unwrap();

        let mut uow = self.store.begin().await.unwrap();
        uow.insert_invoice(&invoice).await.unwrap();
        uow.insert_loan(&loan).await.unwrap();
        uow.commit().await.unwrap();
        loan
    }

    /// Generates the unsecured/secured pair through the engine
    pub async fn offers(&self, invoice_id: InvoiceId, user: UserId) -> [Offer; 2] {
        self.engine.offers().generate_offers(invoice_id, user).await.unwrap()
    }

    pub async fn offer_status(&self, offer_id: OfferId) -> OfferStatus {
        self.engine.offers().offer(offer_id).await.unwrap().status
    }

    pub async fn invoice_status(&self, invoice: &Invoice) -> InvoiceStatus {
        self.store.invoice(invoice.id).await.unwrap().unwrap().status
    }

    pub async fn audited(&self, action: AuditAction) -> usize {
        self.audit.with_action(action).await.len()
    }
}
