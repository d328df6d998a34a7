//! Credit Worker - process binary
//!
//! # Usage
//!
//! ```bash
//! WORKER_DATABASE__URL=postgres://localhost/credit \
//! WORKER_PROVIDER__BASE_URL=https://sandbox.example.in \
//! WORKER_PROVIDER__USERNAME=svc WORKER_PROVIDER__PASSWORD=... \
//! cargo run --bin credit-worker
//! ```
//!
//! Any key of [`WorkerConfig`] can be overridden the same way, e.g.
//! `WORKER_LOG__FORMAT=json` or `WORKER_SCHEDULE__TIMEZONE=Asia/Kolkata`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use core_kernel::{AuditSink, Clock, SystemClock};
use credit_engine::{CreditEngine, LendingStore};
use credit_worker::telemetry::init_tracing;
use credit_worker::{create_router, lifecycle_tasks, Scheduler, WorkerConfig};
use domain_credit::{CreditBureauPort, GovernmentApiClient};
use infra_db::{create_pool, PgAuditSink, PgLendingStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::load().context("loading worker configuration")?;
    init_tracing(&config.log);

    tracing::info!(
        addr = %config.server_addr(),
        provider = %config.provider.base_url,
        timezone = ?config.schedule.timezone,
        "worker.starting"
    );

    let pool = create_pool(&config.database)
        .await
        .context("connecting to the database")?;
    let store = Arc::new(PgLendingStore::new(pool.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(PgAuditSink::new(pool));
    let bureau: Arc<dyn CreditBureauPort> = Arc::new(
        GovernmentApiClient::new(config.provider.clone())
            .context("building the government API client")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let engine = CreditEngine::new(
        store.clone() as Arc<dyn LendingStore>,
        bureau,
        audit,
        clock.clone(),
        config.engine.clone(),
    )
    .context("building the credit engine")?;

    let scheduler = Scheduler::new(
        lifecycle_tasks(&engine, &config.schedule),
        config.schedule.timezone,
        clock,
    );
    let app = create_router(store, scheduler.task_names());
    let scheduler = scheduler.start()?;

    let addr: SocketAddr = config.server_addr().parse().context("parsing server address")?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "worker.listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    tracing::info!("worker.stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "ctrl_c", "worker.shutdown_requested"),
        _ = terminate => tracing::info!(signal = "sigterm", "worker.shutdown_requested"),
    }
}
