//! Custom Test Assertions
//!
//! Assertion helpers for money, ledgers and EMI schedules that explain what
//! went wrong instead of printing two opaque structs.

use rust_decimal::Decimal;

use core_kernel::{Currency, Money};
use domain_ledger::{EntryType, LedgerEntry, LoanLedger};
use domain_lending::{Emi, EmiStatus};

/// Asserts two amounts differ by at most `tolerance`
///
/// # Panics
///
/// Panics on a currency mismatch or when the difference exceeds `tolerance`.
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );

    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: \
         actual={}, expected={}, diff={}, tolerance={}",
        actual.amount(),
        expected.amount(),
        diff,
        tolerance
    );
}

pub fn assert_money_zero(money: &Money) {
    assert!(
        money.is_zero(),
        "Expected zero money, got {} {}",
        money.currency().symbol(),
        money.amount()
    );
}

fn side_total(entries: &[LedgerEntry], side: EntryType) -> Decimal {
    entries
        .iter()
        .filter(|e| e.entry_type == side)
        .map(|e| e.amount.amount())
        .sum()
}

/// Asserts debits equal credits across `entries`
///
/// Use it on the entries of balanced events only; memo postings
/// (provisioning, recovery) are one-sided.
pub fn assert_entries_balanced(entries: &[LedgerEntry]) {
    let debits = side_total(entries, EntryType::Debit);
    let credits = side_total(entries, EntryType::Credit);
    assert_eq!(
        debits, credits,
        "Ledger out of balance: debits={}, credits={} over {} entries",
        debits,
        credits,
        entries.len()
    );
}

/// Asserts every disbursement and repayment on the loan was posted whole
pub fn assert_ledger_consistent(ledger: &LoanLedger) {
    assert!(
        ledger.capital_and_borrower_agree(),
        "BANK_CAPITAL and BORROWER disagree for loan {}: {:?}",
        ledger.loan_id,
        ledger.balances
    );
}

/// Asserts a schedule is numbered `1..=n`, strictly later each time and
/// made of equal installments
pub fn assert_schedule_well_formed(emis: &[Emi]) {
    assert!(!emis.is_empty(), "Expected a non-empty EMI schedule");
    for (i, emi) in emis.iter().enumerate() {
        assert_eq!(
            emi.installment_number as usize,
            i + 1,
            "Installment {} is numbered {}",
            i + 1,
            emi.installment_number
        );
        assert_eq!(emi.amount, emis[0].amount, "Installment {} differs in amount", i + 1);
    }
    for pair in emis.windows(2) {
        assert!(
            pair[0].due_date < pair[1].due_date,
            "Installment {} is not due after installment {}",
            pair[1].installment_number,
            pair[0].installment_number
        );
    }
}

/// Asserts the schedule repays at least the principal
pub fn assert_schedule_covers(emis: &[Emi], principal: &Money) {
    let total: Decimal = emis.iter().map(|e| e.amount.amount()).sum();
    assert!(
        total >= principal.amount(),
        "Schedule total {} is below principal {}",
        total,
        principal.amount()
    );
}

pub fn assert_all_emis(emis: &[Emi], status: EmiStatus) {
    let off: Vec<_> = emis
        .iter()
        .filter(|e| e.status != status)
        .map(|e| (e.installment_number, e.status))
        .collect();
    assert!(off.is_empty(), "Expected every EMI to be {}, found {:?}", status, off);
}

/// Sum of a set of rupee amounts
pub fn inr_total<'a>(amounts: impl IntoIterator<Item = &'a Money>) -> Money {
    let total: Decimal = amounts.into_iter().map(|m| m.amount()).sum();
    Money::new(total, Currency::INR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_kernel::LoanId;
    use domain_ledger::LendingJournals;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_approx_eq_within_tolerance() {
        assert_money_approx_eq(&Money::inr(dec!(100.004)), &Money::inr(dec!(100)), dec!(0.01));
    }

    #[test]
    #[should_panic(expected = "differ by more than tolerance")]
    fn test_money_approx_eq_outside_tolerance() {
        assert_money_approx_eq(&Money::inr(dec!(101)), &Money::inr(dec!(100)), dec!(0.01));
    }

    #[test]
    fn test_disbursement_entries_balance() {
        let entries = LendingJournals::disbursement(LoanId::new_v7(), Money::inr(dec!(50000)))
            .seal(Utc::now())
            .unwrap();
        assert_entries_balanced(&entries);
    }

    #[test]
    #[should_panic(expected = "Ledger out of balance")]
    fn test_provisioning_entries_are_one_sided() {
        let entries = LendingJournals::provisioning(LoanId::new_v7(), Money::inr(dec!(50000)))
            .seal(Utc::now())
            .unwrap();
        assert_entries_balanced(&entries);
    }

    #[test]
    fn test_inr_total() {
        let amounts = [Money::inr(dec!(10.5)), Money::inr(dec!(20))];
        assert_eq!(inr_total(amounts.iter()), Money::inr(dec!(30.5)));
    }
}
