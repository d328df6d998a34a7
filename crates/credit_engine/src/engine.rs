//! Engine facade bundling every service over one context

use std::sync::Arc;

use core_kernel::{AuditSink, Clock};
use domain_credit::CreditBureauPort;

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::services::{
    ExposureCalculator, InvoiceSyncService, LoanService, OfferService, OnboardingService,
    PortfolioService, RecoveryService, RepaymentService, ScoringService,
};
use crate::store::LendingStore;

/// Entry point for callers (HTTP layer, schedulers)
///
/// ```rust,ignore
/// let engine = CreditEngine::new(store, bureau, audit, clock, EngineConfig::default())?;
/// let [unsecured, secured] = engine.offers().generate_offers(invoice_id, user_id).await?;
/// let loan = engine.loans().sanction(unsecured.id, user_id, None).await?;
/// ```
#[derive(Clone)]
pub struct CreditEngine {
    context: EngineContext,
    scoring: ScoringService,
    exposure: ExposureCalculator,
    offers: OfferService,
    loans: LoanService,
    repayments: RepaymentService,
    recovery: RecoveryService,
    invoices: InvoiceSyncService,
    onboarding: OnboardingService,
    portfolio: PortfolioService,
}

impl CreditEngine {
    /// Builds the engine after validating the configuration
    pub fn new(
        store: Arc<dyn LendingStore>,
        bureau: Arc<dyn CreditBureauPort>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::from_context(EngineContext::new(store, bureau, audit, clock, config)))
    }

    pub fn from_context(context: EngineContext) -> Self {
        Self {
            scoring: ScoringService::new(context.clone()),
            exposure: ExposureCalculator::new(context.clone()),
            offers: OfferService::new(context.clone()),
            loans: LoanService::new(context.clone()),
            repayments: RepaymentService::new(context.clone()),
            recovery: RecoveryService::new(context.clone()),
            invoices: InvoiceSyncService::new(context.clone()),
            onboarding: OnboardingService::new(context.clone()),
            portfolio: PortfolioService::new(context.clone()),
            context,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    pub fn scoring(&self) -> &ScoringService {
        &self.scoring
    }

    pub fn exposure(&self) -> &ExposureCalculator {
        &self.exposure
    }

    pub fn offers(&self) -> &OfferService {
        &self.offers
    }

    pub fn loans(&self) -> &LoanService {
        &self.loans
    }

    pub fn repayments(&self) -> &RepaymentService {
        &self.repayments
    }

    pub fn recovery(&self) -> &RecoveryService {
        &self.recovery
    }

    pub fn invoices(&self) -> &InvoiceSyncService {
        &self.invoices
    }

    pub fn onboarding(&self) -> &OnboardingService {
        &self.onboarding
    }

    pub fn portfolio(&self) -> &PortfolioService {
        &self.portfolio
    }
}
