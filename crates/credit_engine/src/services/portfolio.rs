//! Portfolio monitoring read models

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{Currency, Money};
use domain_credit::RiskGrade;
use domain_ledger::LedgerTotals;
use domain_lending::{CollateralStatus, LoanStatus};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::store::BorrowerExposure;

/// Snapshot of the loan book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    /// Disbursed principal of ACTIVE loans
    pub assets_under_management: Money,
    pub performing_loans: u64,
    pub npa_loans: u64,
    /// NPA / (performing + NPA) in percent, 2 dp
    pub npa_ratio_pct: Decimal,
    /// Score records per grade
    pub risk_distribution: Vec<(RiskGrade, u64)>,
    pub seized_collateral_value: Money,
}

fn npa_ratio(performing: u64, npa: u64) -> Decimal {
    let total = performing + npa;
    if total == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(npa) / Decimal::from(total) * dec!(100))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Clone)]
pub struct PortfolioService {
    ctx: EngineContext,
}

impl PortfolioService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub async fn summary(&self) -> Result<PortfolioSummary, EngineError> {
        let store = &self.ctx.store;
        let active = store.loans_by_status(LoanStatus::Active).await?;
        let defaulted = store.loans_by_status(LoanStatus::Default).await?;
        let seized = store.collaterals_by_status(CollateralStatus::Seized).await?;

        let internal = |e: core_kernel::MoneyError| EngineError::Internal(e.to_string());
        let aum = Money::try_sum(active.iter().map(|l| &l.disbursed_amount), Currency::INR)
            .map_err(internal)?;
        let seized_value = Money::try_sum(seized.iter().map(|c| &c.asset_value), Currency::INR)
            .map_err(internal)?;

        let performing = active.len() as u64;
        let npa = defaulted.len() as u64;
        Ok(PortfolioSummary {
            assets_under_management: aum,
            performing_loans: performing,
            npa_loans: npa,
            npa_ratio_pct: npa_ratio(performing, npa),
            risk_distribution: store.score_grade_counts().await?,
            seized_collateral_value: seized_value,
        })
    }

    /// Open exposure per user, largest first
    pub async fn borrower_exposures(&self) -> Result<Vec<BorrowerExposure>, EngineError> {
        Ok(self.ctx.store.borrower_exposures().await?)
    }

    /// Debit and credit totals per ledger account over every loan
    pub async fn ledger_summary(&self) -> Result<LedgerTotals, EngineError> {
        let sums = self.ctx.store.ledger_sums().await?;
        Ok(LedgerTotals::from_sums(sums, Currency::INR)?)
    }
}
