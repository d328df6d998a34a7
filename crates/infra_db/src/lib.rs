//! Infrastructure Database Layer
//!
//! PostgreSQL implementation of the engine's lending store and audit sink,
//! built on SQLx with runtime-checked statements and embedded migrations.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PgAuditSink, PgLendingStore};
//!
//! let pool = create_pool(&DatabaseConfig::new("postgres://localhost/credit")).await?;
//! let store = PgLendingStore::new(pool.clone());
//! let audit = PgAuditSink::new(pool);
//! ```

pub mod audit;
pub mod error;
pub mod pool;
mod queries;
mod rows;
pub mod store;

pub use audit::PgAuditSink;
pub use error::DatabaseError;
pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use store::{PgLendingStore, PgUnitOfWork};
