//! Database error types
//!
//! Driver errors are classified by PostgreSQL SQLSTATE on the way in and
//! mapped onto [`PortError`] on the way out, so the engine only ever sees
//! port errors.

use core_kernel::PortError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Unique constraint violation (23505)
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key violation (23503)
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation (23514)
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Serialization failure or deadlock (40001, 40P01)
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value that does not map onto the domain model
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::corrupt("loans", "status", "PAUSED");
    /// assert!(error.to_string().contains("loans.status"));
    /// ```
    pub fn corrupt(table: &str, column: &str, value: impl std::fmt::Display) -> Self {
        DatabaseError::CorruptRow(format!("{}.{} = '{}'", table, column, value))
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DatabaseError::ConnectionFailed(error.to_string())
            }
            sqlx::Error::Database(db_err) => {
                // https://www.postgresql.org/docs/current/errcodes-appendix.html
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(message),
                    Some("23503") => DatabaseError::ForeignKeyViolation(message),
                    Some("23514") => DatabaseError::ConstraintViolation(message),
                    Some("40001") | Some("40P01") => DatabaseError::TransactionAborted(message),
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseError::CorruptRow(error.to_string())
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound(message) => PortError::not_found("record", message),
            DatabaseError::DuplicateEntry(message) | DatabaseError::TransactionAborted(message) => {
                PortError::conflict(message)
            }
            DatabaseError::ForeignKeyViolation(message)
            | DatabaseError::ConstraintViolation(message) => PortError::validation(message),
            DatabaseError::ConnectionFailed(message) => PortError::connection(message),
            DatabaseError::PoolExhausted => PortError::connection("connection pool exhausted"),
            DatabaseError::CorruptRow(message) => PortError::transformation(message),
            other => PortError::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_maps_to_conflict() {
        let port: PortError =
            DatabaseError::DuplicateEntry("invoices_business_number_key".into()).into();
        assert!(matches!(port, PortError::Conflict { .. }));
    }

    #[test]
    fn test_aborted_transaction_maps_to_conflict() {
        let port: PortError = DatabaseError::TransactionAborted("deadlock detected".into()).into();
        assert!(matches!(port, PortError::Conflict { .. }));
    }

    #[test]
    fn test_pool_exhaustion_is_transient() {
        let port: PortError = DatabaseError::PoolExhausted.into();
        assert!(port.is_transient());
    }

    #[test]
    fn test_corrupt_row_is_not_retried() {
        let port: PortError = DatabaseError::corrupt("emis", "status", "LATE").into();
        assert!(!port.is_transient());
        assert!(matches!(port, PortError::Transformation { .. }));
    }

    #[test]
    fn test_row_not_found_classification() {
        let error = DatabaseError::from(sqlx::Error::RowNotFound);
        assert!(matches!(error, DatabaseError::NotFound(_)));
        assert!(!error.is_constraint_violation());
    }
}
