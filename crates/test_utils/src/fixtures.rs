//! Test Fixtures
//!
//! Canonical lifecycle objects anchored at [`START`]. Everything here is
//! plain data; persist it through a unit of work when a test needs rows.

use chrono::{DateTime, Duration, TimeZone, Utc};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{BusinessId, Money, PortError, UserId};
use credit_engine::LendingStore;
use domain_credit::{
    BusinessProfile, CreditScore, GstReturnsSummary, Invoice, InvoiceStatus, Offer, OfferPricing,
    RiskGrade, ScoringConfig, ScoringSignals,
};
use domain_lending::{build_schedule, Emi, Loan};

/// The instant every fixture is created at
pub static START: Lazy<DateTime<Utc>> = Lazy::new(|| {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .expect("valid fixture instant")
});

pub fn start() -> DateTime<Utc> {
    *START
}

pub const SAMPLE_GST: &str = "27AAPFU0939F1ZV";
pub const SAMPLE_AADHAAR: &str = "123412341234";
pub const SAMPLE_PAN: &str = "ABCDE1234F";

pub fn business(user_id: UserId, gst_number: &str) -> BusinessProfile {
    BusinessProfile::new(user_id, gst_number, start()).with_identity(SAMPLE_AADHAAR, SAMPLE_PAN)
}

pub fn sample_business() -> BusinessProfile {
    business(UserId::new_v7(), SAMPLE_GST)
}

/// An UNPAID invoice due 60 days after [`START`]
pub fn invoice(business_id: BusinessId, number: &str, amount: Decimal) -> Invoice {
    Invoice::new(
        business_id,
        number,
        Money::inr(amount),
        start() + Duration::days(60),
        0,
        start(),
    )
    .expect("fixture invoice is valid")
}

/// A score record that lands in `grade` under the default scoring config
pub fn score(business_id: BusinessId, grade: RiskGrade) -> CreditScore {
    let external = match grade {
        RiskGrade::A => dec!(1000),
        RiskGrade::B => dec!(700),
        RiskGrade::C => dec!(300),
    };
    let signals = ScoringSignals {
        gst_returns: GstReturnsSummary { filed: 12, total: 12 },
        invoice_count: 5,
        average_delay_days: Decimal::ZERO,
        repaid_invoice_count: 2,
    };
    let config = ScoringConfig::default();
    let (record, _) = CreditScore::compute(business_id, Some(external), &signals, &config, start());
    record
}

/// Offers for an invoice at `grade` under default pricing, unsecured first
pub fn offer_pair(invoice: &Invoice, grade: RiskGrade) -> [Offer; 2] {
    Offer::generate_pair(invoice.id, grade, &OfferPricing::default(), start())
}

/// A loan already disbursed, with its financed invoice, accepted offer and
/// EMI schedule
#[derive(Debug, Clone)]
pub struct DisbursedLoan {
    pub invoice: Invoice,
    pub offer: Offer,
    pub loan: Loan,
    pub emis: Vec<Emi>,
}

impl DisbursedLoan {
    /// Writes every row in one unit of work
    pub async fn persist(&self, store: &dyn LendingStore) -> Result<(), PortError> {
        let mut uow = store.begin().await?;
        uow.insert_invoice(&self.invoice).await?;
        uow.insert_offers(std::slice::from_ref(&self.offer)).await?;
        uow.insert_loan(&self.loan).await?;
        uow.insert_emis(&self.emis).await?;
        uow.commit().await
    }

    pub fn principal(&self) -> Money {
        self.loan.principal
    }
}

/// Disburses an unsecured loan of `amount` against a fresh invoice
pub fn disbursed_loan(business_id: BusinessId, amount: Decimal) -> DisbursedLoan {
    let mut invoice = invoice(business_id, &format!("INV-{}", uuid::Uuid::new_v4()), amount);
    invoice.status = InvoiceStatus::Financed;
    let [mut offer, _] = offer_pair(&invoice, RiskGrade::A);
    offer.status = domain_credit::OfferStatus::Accepted;

    let mut loan = Loan::sanction(&offer, &invoice, start()).expect("fixture loan sanctions");
    loan.disburse(start()).expect("fixture loan disburses");
    let emis = build_schedule(
        loan.id,
        loan.principal,
        offer.interest_rate,
        offer.tenure_months,
        30,
        start(),
    )
    .expect("fixture schedule builds");

    DisbursedLoan { invoice, offer, loan, emis }
}
