//! Test Utilities Crate
//!
//! Shared test infrastructure for the credit engine workspace.
//!
//! # Modules
//!
//! - `fixtures`: Ready-made businesses, invoices, offers and loans
//! - `builders`: Builders for invoices and disbursed loans
//! - `database`: Postgres test container with the schema applied
//! - `assertions`: Ledger and schedule assertions with readable failures
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
