//! Journal batches
//!
//! A [`JournalBatch`] collects the postings of one financial event and turns
//! them into ledger rows via [`JournalBatch::seal`], which is the only place
//! the balance rule is enforced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{LedgerEntryId, LoanId, Money};

use crate::account::LedgerAccount;
use crate::entry::{EntryType, LedgerEntry};
use crate::error::LedgerError;

/// Whether the batch must balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchKind {
    /// Debit total must equal credit total
    Balanced,
    /// Single-legged posting whose contra side lives outside the loan book
    Memo,
}

/// A single posting line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub entry_type: EntryType,
    pub account: LedgerAccount,
    pub amount: Money,
    pub description: String,
}

/// Postings for one loan event, not yet written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalBatch {
    pub loan_id: LoanId,
    pub kind: BatchKind,
    pub postings: Vec<Posting>,
}

impl JournalBatch {
    /// Starts a batch that must balance
    pub fn balanced(loan_id: LoanId) -> Self {
        Self {
            loan_id,
            kind: BatchKind::Balanced,
            postings: Vec::new(),
        }
    }

    /// Starts a single-legged memo batch
    pub fn memo(loan_id: LoanId) -> Self {
        Self {
            loan_id,
            kind: BatchKind::Memo,
            postings: Vec::new(),
        }
    }

    /// Adds a debit posting
    pub fn debit(
        mut self,
        account: LedgerAccount,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        self.postings.push(Posting {
            entry_type: EntryType::Debit,
            account,
            amount,
            description: description.into(),
        });
        self
    }

    /// Adds a credit posting
    pub fn credit(
        mut self,
        account: LedgerAccount,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        self.postings.push(Posting {
            entry_type: EntryType::Credit,
            account,
            amount,
            description: description.into(),
        });
        self
    }

    /// Returns (debit total, credit total)
    pub fn totals(&self) -> Result<(Money, Money), LedgerError> {
        let currency = self
            .postings
            .first()
            .map(|p| p.amount.currency())
            .unwrap_or_default();
        let mut debits = Money::zero(currency);
        let mut credits = Money::zero(currency);
        for posting in &self.postings {
            match posting.entry_type {
                EntryType::Debit => debits = debits.checked_add(&posting.amount)?,
                EntryType::Credit => credits = credits.checked_add(&posting.amount)?,
            }
        }
        Ok((debits, credits))
    }

    /// Checks if the batch satisfies its kind's shape rule
    pub fn is_balanced(&self) -> bool {
        matches!(self.totals(), Ok((d, c)) if d == c)
    }

    /// Validates the batch and converts it into ledger rows stamped `at`
    ///
    /// # Errors
    ///
    /// - `EmptyBatch` if there are no postings
    /// - `InvalidPosting` if any amount is zero or negative
    /// - `UnbalancedBatch` for a balanced batch whose totals differ
    /// - `MemoShape` for a memo batch with more than one posting
    pub fn seal(self, at: DateTime<Utc>) -> Result<Vec<LedgerEntry>, LedgerError> {
        if self.postings.is_empty() {
            return Err(LedgerError::EmptyBatch(self.loan_id.to_string()));
        }

        if let Some(bad) = self.postings.iter().find(|p| !p.amount.is_positive()) {
            return Err(LedgerError::InvalidPosting(format!(
                "{} {} of {} must be positive",
                bad.entry_type, bad.account, bad.amount
            )));
        }

        match self.kind {
            BatchKind::Balanced => {
                let (debits, credits) = self.totals()?;
                if debits != credits {
                    return Err(LedgerError::UnbalancedBatch {
                        debits: debits.amount(),
                        credits: credits.amount(),
                    });
                }
            }
            BatchKind::Memo => {
                if self.postings.len() != 1 {
                    return Err(LedgerError::MemoShape(self.postings.len()));
                }
            }
        }

        let loan_id = self.loan_id;
        Ok(self
            .postings
            .into_iter()
            .map(|p| LedgerEntry {
                id: LedgerEntryId::new_v7(),
                loan_id,
                entry_type: p.entry_type,
                account: p.account,
                amount: p.amount.round_to_currency(),
                description: p.description,
                created_at: at,
            })
            .collect())
    }
}

/// Batches for the lending events that touch the ledger
pub struct LendingJournals;

impl LendingJournals {
    /// Disbursement: DEBIT BANK_CAPITAL / CREDIT BORROWER for the principal
    pub fn disbursement(loan_id: LoanId, principal: Money) -> JournalBatch {
        JournalBatch::balanced(loan_id)
            .debit(LedgerAccount::BankCapital, principal, "Loan disbursement - bank capital debit")
            .credit(LedgerAccount::Borrower, principal, "Loan disbursement - borrower credit")
    }

    /// EMI repayment: DEBIT BORROWER / CREDIT BANK_CAPITAL for the EMI amount
    pub fn emi_repayment(loan_id: LoanId, amount: Money) -> JournalBatch {
        JournalBatch::balanced(loan_id)
            .debit(LedgerAccount::Borrower, amount, "EMI repayment - borrower debit")
            .credit(LedgerAccount::BankCapital, amount, "EMI repayment - bank capital credit")
    }

    /// NPA provision raised on default, equal to the disbursed amount
    pub fn provisioning(loan_id: LoanId, disbursed: Money) -> JournalBatch {
        JournalBatch::memo(loan_id)
            .debit(LedgerAccount::Provisioning, disbursed, "NPA provisioning - loan defaulted")
    }

    /// Recovery credit for the total value of collateral seized on default
    pub fn collateral_seizure(loan_id: LoanId, seized_value: Money) -> JournalBatch {
        JournalBatch::memo(loan_id)
            .credit(LedgerAccount::Recovery, seized_value, "Recovery action - collateral seized")
    }

    /// Recovery credit for a completed recovery action
    pub fn recovery_settlement(loan_id: LoanId, amount: Money, action: &str) -> JournalBatch {
        JournalBatch::memo(loan_id).credit(
            LedgerAccount::Recovery,
            amount,
            format!("Recovery action - {} completed", action.to_lowercase().replace('_', " ")),
        )
    }
}
