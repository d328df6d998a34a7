//! Credit Engine - the invoice-discounting credit lifecycle
//!
//! ```text
//! Invoice ─► Offer ─► Loan ─► EMI ─► Closed
//!                       │
//!                       └──► Default ─► Recovery
//! ```
//!
//! This crate drives every transition over a transactional [`LendingStore`]:
//!
//! - **Scoring** - hybrid external/internal score, appended per computation
//! - **Offers** - lock, score, cap check and offer pair in one unit of work
//! - **Loans** - sanction, disbursement ledger pair and EMI schedule
//! - **Repayments** - EMI payment, bounce, default with collateral seizure
//! - **Recovery** - recovery actions against defaulted loans
//! - **Sweeps** - offer expiry, overdue classification, reminders, rescoring
//!
//! Audit records are buffered per unit of work and published only after
//! commit. Sweeps are plain async methods; scheduling belongs to the caller.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod memory;
pub mod services;
pub mod store;

pub use config::EngineConfig;
pub use context::EngineContext;
pub use engine::CreditEngine;
pub use error::{EngineError, ErrorKind};
pub use memory::InMemoryLendingStore;
pub use services::{
    EmiReminder, ExposureCalculator, InvoiceSyncService, LoanService, ManualInvoice, OfferService,
    OnboardingRequest, OnboardingService, PortfolioService, PortfolioSummary, RecoveryService,
    RepaymentService, ScoringService, SweepReport, SyncReport,
};
pub use store::{BorrowerExposure, ExposureScope, InvoiceStats, LendingStore, UnitOfWork};
