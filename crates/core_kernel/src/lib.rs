//! Core Kernel - Foundational types for the credit lifecycle engine
//!
//! This crate provides the building blocks shared by every domain crate:
//! - Money and rate types with precise decimal arithmetic
//! - Strongly-typed identifiers for lending entities
//! - Clock abstraction and scheduling time helpers
//! - Port infrastructure (errors, retry policy) for adapters
//! - Audit records emitted by state transitions

pub mod codes;
pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;
pub mod audit;

pub use money::{Money, Currency, MoneyError, Rate};
pub use temporal::{Clock, SystemClock, ManualClock, Timezone, TemporalError};
pub use identifiers::{
    UserId, BusinessId, InvoiceId, CreditScoreId, OfferId, LoanId, EmiId,
    CollateralId, LedgerEntryId, RecoveryId, AuditEventId,
};
pub use ports::{
    PortError, DomainPort, AdapterConfig, RetryPolicy, HealthCheckable, HealthCheckResult,
    AdapterHealth,
};
pub use audit::{
    AuditRecord, AuditSink, AuditAction, EntityType, TracingAuditSink, InMemoryAuditSink,
};
