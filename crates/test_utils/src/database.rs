//! Database Test Utilities
//!
//! Starts a throwaway PostgreSQL container, applies the embedded migrations
//! and wires a [`CreditEngine`] over the Postgres store. Tests using it need
//! a Docker daemon and are marked `#[ignore]`.

use std::sync::Arc;

use sqlx::PgPool;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use core_kernel::{InMemoryAuditSink, ManualClock};
use credit_engine::{CreditEngine, EngineConfig, EngineError};
use domain_credit::MockCreditBureau;
use infra_db::{create_pool, DatabaseConfig, PgAuditSink, PgLendingStore};

const POSTGRES_TAG: &str = "16-alpine";

/// Tables in dependency order, children first
const TABLES: &[&str] = &[
    "audit_logs",
    "ledger_entries",
    "recovery_actions",
    "collaterals",
    "emis",
    "loans",
    "offers",
    "credit_scores",
    "invoices",
    "businesses",
];

pub type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDatabaseConfig {
    pub host: String,
    pub port: u16,
}

impl TestDatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!("postgres://postgres:postgres@{}:{}/postgres", self.host, self.port)
    }
}

/// A migrated PostgreSQL container
pub struct TestDatabase {
    _container: ContainerAsync<Postgres>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    pub async fn new() -> TestResult<Self> {
        let container = Postgres::default().with_tag(POSTGRES_TAG).start().await?;
        let config = TestDatabaseConfig {
            host: container.get_host().await?.to_string(),
            port: container.get_host_port_ipv4(5432).await?,
        };

        let pool = create_pool(
            &DatabaseConfig::new(config.connection_url())
                .max_connections(8)
                .min_connections(1),
        )
        .await?;

        Ok(Self {
            _container: container,
            config,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn store(&self) -> PgLendingStore {
        PgLendingStore::new(self.pool.clone())
    }

    /// Empties every table, keeping the schema
    pub async fn clear_data(&self) -> TestResult<()> {
        // The append-only trigger rejects DELETE but not TRUNCATE.
        sqlx::query(&format!("TRUNCATE TABLE {} CASCADE", TABLES.join(", ")))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// An engine over this database with test doubles for the bureau and clock
    pub fn engine(
        &self,
        bureau: &MockCreditBureau,
        clock: &ManualClock,
    ) -> Result<PgEngine, EngineError> {
        let audit = InMemoryAuditSink::new();
        let engine = CreditEngine::new(
            Arc::new(self.store()),
            Arc::new(bureau.clone()),
            Arc::new(audit.clone()),
            Arc::new(clock.clone()),
            EngineConfig::default(),
        )?;
        Ok(PgEngine { engine, audit })
    }

    /// Audit sink writing to this database's `audit_logs`
    pub fn audit_sink(&self) -> PgAuditSink {
        PgAuditSink::new(self.pool.clone())
    }

    pub async fn count_rows(&self, table: &str) -> TestResult<i64> {
        let n = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

/// Engine over Postgres with its audit records kept in memory
pub struct PgEngine {
    pub engine: CreditEngine,
    pub audit: InMemoryAuditSink,
}

static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// One container shared by every test in the binary
///
/// # Panics
///
/// Panics if the container cannot be started.
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to create shared test database"),
            )
        })
        .await
        .clone()
}

pub async fn create_isolated_test_database() -> TestResult<TestDatabase> {
    TestDatabase::new().await
}
