//! Lending Domain
//!
//! Loans sanctioned from accepted offers, their EMI schedules, pledged
//! collateral and post-default recovery actions. Every aggregate enforces its
//! own state machine; the lifecycle engine composes them inside one unit of
//! work and posts the matching ledger entries.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_lending::{build_schedule, Loan};
//!
//! let mut loan = Loan::sanction(&offer, &invoice, now)?;
//! let principal = loan.disburse(now)?;
//! let emis =
//!     build_schedule(loan.id, principal, offer.interest_rate, offer.tenure_months, 30, now)?;
//! ```

pub mod loan;
pub mod emi;
pub mod amortization;
pub mod collateral;
pub mod recovery;
pub mod error;

pub use loan::{Loan, LoanStatus};
pub use emi::{Emi, EmiStatus};
pub use amortization::{build_schedule, monthly_installment};
pub use collateral::{Collateral, CollateralInput, CollateralStatus};
pub use recovery::{RecoveryAction, RecoveryActionType, RecoveryStatus};
pub use error::LendingError;
