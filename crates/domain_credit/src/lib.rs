//! Credit Domain
//!
//! Business profiles, GST invoices, credit scoring, credit decisions and
//! financing offers, plus the port to the external identity and
//! credit-bureau provider.
//!
//! # Invoice lifecycle
//!
//! ```text
//! UNPAID ──► OFFER_GENERATED ──► FINANCED ──► REPAID
//!   ▲              │                  │
//!   └──────────────┘                  └──────► DEFAULTED
//! ```
//!
//! An invoice drops back to UNPAID when all of its offers expire unaccepted.
//!
//! # Scoring
//!
//! The final score blends the provider's external score with an internal
//! score derived from GST return filing, invoice volume, payment delay and
//! repayment history:
//!
//! ```text
//! final = 0.6 × external + 0.4 × internal      (A ≥ 700, B ≥ 500, C otherwise)
//! ```
//!
//! # Offers
//!
//! Every financeable invoice yields an UNSECURED and a SECURED offer. Secured
//! pricing depends on the risk grade; both expire after 24 hours.

pub mod business;
pub mod invoice;
pub mod normalize;
pub mod scoring;
pub mod decision;
pub mod offer;
pub mod error;
pub mod ports;
pub mod adapters;

pub use business::BusinessProfile;
pub use invoice::{Invoice, InvoiceStatus};
pub use normalize::{normalize_invoices, ExternalInvoice, NormalizedInvoices, SkippedRecord};
pub use scoring::{
    blend, CreditScore, ExternalScoreSource, GstReturnsSummary, RiskGrade, ScoringConfig,
    ScoringSignals,
};
pub use decision::{
    decide, CapBreach, CapKind, CreditDecision, DecisionOutcome, ExposureCaps, ExposureSnapshot,
};
pub use offer::{LoanType, Offer, OfferPricing, OfferStatus, OfferTerms};
pub use error::CreditError;
pub use ports::{CreditBureauPort, CreditEvaluationRequest, FullCheckRequest};
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::MockCreditBureau;
pub use adapters::{GovernmentApiClient, GovernmentApiConfig};
