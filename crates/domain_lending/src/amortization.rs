//! EMI sizing and schedule generation
//!
//! ```text
//! EMI = P · r · (1 + r)^n / ((1 + r)^n − 1)      r = annual% / 1200
//! EMI = P / n                                      when r = 0
//! ```
//!
//! The result is rounded to 2 decimals (half away from zero). Installments are
//! due at fixed day intervals after disbursement.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use core_kernel::{LoanId, Money, Rate};

use crate::emi::Emi;
use crate::error::LendingError;

/// Level installment for a fully amortizing loan
///
/// # Arguments
///
/// * `principal` - Amount disbursed
/// * `annual_rate` - Nominal annual rate
/// * `tenure_months` - Number of installments
///
/// # Errors
///
/// Returns `Validation` for a zero tenure or non-positive principal and
/// `Calculation` if the growth factor overflows.
pub fn monthly_installment(
    principal: Money,
    annual_rate: Rate,
    tenure_months: u32,
) -> Result<Money, LendingError> {
    if tenure_months == 0 {
        return Err(LendingError::validation("tenure must be at least one month"));
    }
    if !principal.is_positive() {
        return Err(LendingError::validation("principal must be positive"));
    }

    let p = principal.amount();
    let n = Decimal::from(tenure_months);
    let r = annual_rate.monthly();

    let emi = if r.is_zero() {
        p / n
    } else {
        let growth = compound(Decimal::ONE + r, tenure_months)?;
        let numerator = p
            .checked_mul(r)
            .and_then(|v| v.checked_mul(growth))
            .ok_or_else(|| LendingError::Calculation("EMI numerator overflow".into()))?;
        numerator
            .checked_div(growth - Decimal::ONE)
            .ok_or_else(|| LendingError::Calculation("EMI denominator is zero".into()))?
    };

    Ok(Money::new(
        emi.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        principal.currency(),
    ))
}

fn compound(base: Decimal, periods: u32) -> Result<Decimal, LendingError> {
    (0..periods).try_fold(Decimal::ONE, |acc, _| {
        acc.checked_mul(base)
            .ok_or_else(|| LendingError::Calculation("compound growth overflow".into()))
    })
}

/// Builds the full installment schedule for a disbursed loan
///
/// Installment `i` (1-based) is due `i × interval_days` after `disbursed_at`.
pub fn build_schedule(
    loan_id: LoanId,
    principal: Money,
    annual_rate: Rate,
    tenure_months: u32,
    interval_days: u32,
    disbursed_at: DateTime<Utc>,
) -> Result<Vec<Emi>, LendingError> {
    if interval_days == 0 {
        return Err(LendingError::validation("EMI interval must be positive"));
    }
    let amount = monthly_installment(principal, annual_rate, tenure_months)?;

    Ok((1..=tenure_months)
        .map(|i| {
            let due = disbursed_at + Duration::days(i64::from(interval_days) * i64::from(i));
            Emi::new(loan_id, i, due, amount, disbursed_at)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reference_installment() {
        let emi =
            monthly_installment(Money::inr(dec!(100000)), Rate::from_percentage(dec!(12)), 12)
                .unwrap();
        assert_eq!(emi.amount(), dec!(8884.88));
    }

    #[test]
    fn test_zero_rate_is_straight_division() {
        let emi =
            monthly_installment(Money::inr(dec!(120000)), Rate::new(Decimal::ZERO), 12).unwrap();
        assert_eq!(emi.amount(), dec!(10000));
    }

    #[test]
    fn test_zero_tenure_rejected() {
        let rate = Rate::from_percentage(dec!(12));
        assert!(monthly_installment(Money::inr(dec!(1000)), rate, 0).is_err());
    }

    #[test]
    fn test_schedule_dates_are_interval_multiples() {
        let start = Utc::now();
        let loan = LoanId::new_v7();
        let rate = Rate::from_percentage(dec!(14));
        let schedule = build_schedule(loan, Money::inr(dec!(400000)), rate, 4, 30, start).unwrap();

        assert_eq!(schedule.len(), 4);
        for (i, emi) in schedule.iter().enumerate() {
            assert_eq!(emi.installment_number as usize, i + 1);
            assert_eq!(emi.due_date, start + Duration::days(30 * (i as i64 + 1)));
            assert_eq!(emi.loan_id, loan);
        }
    }

    proptest! {
        #[test]
        fn prop_installments_cover_principal(
            principal in 1000u64..10000000,
            rate_bp in 0u32..3600,
            tenure in 1u32..36,
        ) {
            let p = Money::inr(Decimal::from(principal));
            let rate = Rate::from_percentage(Decimal::new(i64::from(rate_bp), 2));
            let emi = monthly_installment(p, rate, tenure).unwrap();
            let total = emi.amount() * Decimal::from(tenure);
            // rounding can shave at most half a paisa per installment
            let slack = dec!(0.005) * Decimal::from(tenure);
            prop_assert!(total + slack >= p.amount());
        }
    }
}
