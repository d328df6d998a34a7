//! Ledger Domain - Loan-level double-entry postings
//!
//! Every financial event in a loan's life is written to an append-only ledger
//! keyed by loan. Events are assembled as a [`JournalBatch`] and sealed into
//! [`LedgerEntry`] rows in one step, so a batch is either posted whole or not
//! at all.
//!
//! # Accounts
//!
//! - **BANK_CAPITAL**: the lender's deployable funds
//! - **BORROWER**: amounts owed by the borrower
//! - **PROVISIONING**: NPA provisions raised on default
//! - **RECOVERY**: value recovered after default (seized collateral, settlements)
//!
//! # Batch kinds
//!
//! - Balanced batches (disbursement, EMI repayment) must have equal debit and
//!   credit totals or sealing fails with [`LedgerError::UnbalancedBatch`].
//! - Memo batches (provisioning, recovery) record exactly one leg against a
//!   contra account that is not tracked in this book.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::LendingJournals;
//!
//! let entries = LendingJournals::disbursement(loan_id, principal).seal(now)?;
//! store.append_ledger(&entries).await?;
//! ```

pub mod account;
pub mod entry;
pub mod journal;
pub mod summary;
pub mod error;

pub use account::LedgerAccount;
pub use entry::{EntryType, LedgerEntry};
pub use journal::{BatchKind, JournalBatch, LendingJournals, Posting};
pub use summary::{AccountBalance, LedgerTotals, LoanLedger};
pub use error::LedgerError;
