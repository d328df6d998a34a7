//! Ledger read models: one loan, or the whole book

use serde::{Deserialize, Serialize};

use core_kernel::{Currency, LoanId, Money};

use crate::account::LedgerAccount;
use crate::entry::{EntryType, LedgerEntry};
use crate::error::LedgerError;

/// Debit and credit totals for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account: LedgerAccount,
    pub debits: Money,
    pub credits: Money,
}

impl AccountBalance {
    /// Credits minus debits
    pub fn net_credit(&self) -> Result<Money, LedgerError> {
        Ok(self.credits.checked_sub(&self.debits)?)
    }
}

/// Debit and credit totals per account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// One balance per account, in [`LedgerAccount::ALL`] order
    pub balances: Vec<AccountBalance>,
    pub total_debits: Money,
    pub total_credits: Money,
}

impl LedgerTotals {
    pub fn zero(currency: Currency) -> Self {
        Self {
            balances: LedgerAccount::ALL
                .into_iter()
                .map(|account| AccountBalance {
                    account,
                    debits: Money::zero(currency),
                    credits: Money::zero(currency),
                })
                .collect(),
            total_debits: Money::zero(currency),
            total_credits: Money::zero(currency),
        }
    }

    /// Builds totals from pre-aggregated `(account, side, sum)` rows
    pub fn from_sums<I>(sums: I, currency: Currency) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = (LedgerAccount, EntryType, Money)>,
    {
        let mut totals = Self::zero(currency);
        for (account, side, amount) in sums {
            totals.add(account, side, &amount)?;
        }
        Ok(totals)
    }

    pub fn add(
        &mut self,
        account: LedgerAccount,
        side: EntryType,
        amount: &Money,
    ) -> Result<(), LedgerError> {
        let Some(balance) = self.balances.iter_mut().find(|b| b.account == account) else {
            return Ok(());
        };
        match side {
            EntryType::Debit => {
                balance.debits = balance.debits.checked_add(amount)?;
                self.total_debits = self.total_debits.checked_add(amount)?;
            }
            EntryType::Credit => {
                balance.credits = balance.credits.checked_add(amount)?;
                self.total_credits = self.total_credits.checked_add(amount)?;
            }
        }
        Ok(())
    }

    pub fn balance(&self, account: LedgerAccount) -> Option<&AccountBalance> {
        self.balances.iter().find(|b| b.account == account)
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits == self.total_credits
    }
}

/// All postings of one loan, with per-account totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanLedger {
    pub loan_id: LoanId,
    pub entries: Vec<LedgerEntry>,
    pub balances: Vec<AccountBalance>,
    pub total_debits: Money,
    pub total_credits: Money,
}

impl LoanLedger {
    /// Builds the summary; entries are kept in posting order
    pub fn from_entries(
        loan_id: LoanId,
        mut entries: Vec<LedgerEntry>,
        currency: Currency,
    ) -> Result<Self, LedgerError> {
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut totals = LedgerTotals::zero(currency);
        for entry in &entries {
            totals.add(entry.account, entry.entry_type, &entry.amount)?;
        }

        Ok(Self {
            loan_id,
            entries,
            balances: totals.balances,
            total_debits: totals.total_debits,
            total_credits: totals.total_credits,
        })
    }

    pub fn balance(&self, account: LedgerAccount) -> Option<&AccountBalance> {
        self.balances.iter().find(|b| b.account == account)
    }

    /// Principal still owed: borrower credits (disbursed) minus borrower debits (repaid)
    pub fn borrower_outstanding(&self) -> Result<Money, LedgerError> {
        match self.balance(LedgerAccount::Borrower) {
            Some(b) => b.net_credit(),
            None => Ok(Money::zero(self.total_debits.currency())),
        }
    }

    /// True if BANK_CAPITAL and BORROWER postings net to the same magnitude,
    /// i.e. every balanced event was posted whole
    pub fn capital_and_borrower_agree(&self) -> bool {
        let (Some(capital), Some(borrower)) = (
            self.balance(LedgerAccount::BankCapital),
            self.balance(LedgerAccount::Borrower),
        ) else {
            return true;
        };
        capital.debits == borrower.credits && capital.credits == borrower.debits
    }

    /// Number of entries posted to `account` on `side`
    pub fn count(&self, account: LedgerAccount, side: EntryType) -> usize {
        self.entries
            .iter()
            .filter(|e| e.account == account && e.entry_type == side)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::LendingJournals;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_summary_after_disbursement_and_repayment() {
        let loan = LoanId::new_v7();
        let now = Utc::now();
        let mut entries = LendingJournals::disbursement(loan, Money::inr(dec!(100000)))
            .seal(now)
            .unwrap();
        entries.extend(
            LendingJournals::emi_repayment(loan, Money::inr(dec!(8884.88)))
                .seal(now)
                .unwrap(),
        );

        let ledger = LoanLedger::from_entries(loan, entries, Currency::INR).unwrap();
        assert_eq!(ledger.total_debits, ledger.total_credits);
        assert!(ledger.capital_and_borrower_agree());
        assert_eq!(ledger.borrower_outstanding().unwrap().amount(), dec!(91115.12));
        assert_eq!(ledger.count(LedgerAccount::Borrower, EntryType::Debit), 1);
    }

    #[test]
    fn test_summary_with_memo_postings() {
        let loan = LoanId::new_v7();
        let now = Utc::now();
        let mut entries = LendingJournals::disbursement(loan, Money::inr(dec!(50000)))
            .seal(now)
            .unwrap();
        entries.extend(
            LendingJournals::provisioning(loan, Money::inr(dec!(50000)))
                .seal(now)
                .unwrap(),
        );
        entries.extend(
            LendingJournals::collateral_seizure(loan, Money::inr(dec!(20000)))
                .seal(now)
                .unwrap(),
        );

        let ledger = LoanLedger::from_entries(loan, entries, Currency::INR).unwrap();
        let recovery = ledger.balance(LedgerAccount::Recovery).unwrap();
        assert_eq!(recovery.credits.amount(), dec!(20000));
        assert_eq!(
            ledger.balance(LedgerAccount::Provisioning).unwrap().debits.amount(),
            dec!(50000)
        );
        assert!(ledger.capital_and_borrower_agree());
    }

    #[test]
    fn test_totals_from_grouped_sums() {
        let inr = |v| Money::inr(v);
        let totals = LedgerTotals::from_sums(
            [
                (LedgerAccount::BankCapital, EntryType::Debit, inr(dec!(150000))),
                (LedgerAccount::Borrower, EntryType::Credit, inr(dec!(150000))),
                (LedgerAccount::Borrower, EntryType::Debit, inr(dec!(12500))),
                (LedgerAccount::BankCapital, EntryType::Credit, inr(dec!(12500))),
                (LedgerAccount::Provisioning, EntryType::Debit, inr(dec!(50000))),
            ],
            Currency::INR,
        )
        .unwrap();

        assert_eq!(totals.balances.len(), LedgerAccount::ALL.len());
        assert_eq!(totals.total_debits.amount(), dec!(212500));
        assert_eq!(totals.total_credits.amount(), dec!(162500));
        assert!(!totals.is_balanced());
        assert!(totals.balance(LedgerAccount::Recovery).unwrap().credits.is_zero());
        assert_eq!(
            totals.balance(LedgerAccount::Borrower).unwrap().net_credit().unwrap().amount(),
            dec!(137500)
        );
    }

    #[test]
    fn test_totals_reject_mixed_currencies() {
        let usd = Money::new(dec!(10), Currency::USD);
        let sums = [(LedgerAccount::Borrower, EntryType::Debit, usd)];
        assert!(LedgerTotals::from_sums(sums, Currency::INR).is_err());
    }
}
