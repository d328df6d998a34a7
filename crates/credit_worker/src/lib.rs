//! Credit Worker
//!
//! The long-running process around the lifecycle engine. It loads
//! [`WorkerConfig`], initialises tracing, runs the periodic sweeps
//! (offer expiry, EMI reminders, NPA classification, score recalculation)
//! and serves `/health` and `/health/ready`.
//!
//! ```rust,ignore
//! let engine =
//!     CreditEngine::new(store.clone(), bureau, audit, clock.clone(), config.engine.clone())?;
//! let tasks = lifecycle_tasks(&engine, &config.schedule);
//! let scheduler = Scheduler::new(tasks, config.schedule.timezone, clock);
//! let app = create_router(store, scheduler.task_names());
//! let handle = scheduler.start()?;
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod jobs;
pub mod scheduler;
pub mod telemetry;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use core_kernel::HealthCheckable;

pub use config::WorkerConfig;
pub use error::WorkerError;
pub use jobs::lifecycle_tasks;
pub use scheduler::{Schedule, ScheduledTask, Scheduler, SchedulerHandle};

/// State shared by the health handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn HealthCheckable>,
    pub tasks: Arc<[&'static str]>,
}

pub fn create_router(store: Arc<dyn HealthCheckable>, tasks: Vec<&'static str>) -> Router {
    let state = AppState {
        store,
        tasks: tasks.into(),
    };

    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use core_kernel::{AdapterHealth, HealthCheckResult};
    use tower::ServiceExt;

    struct FixedHealth(AdapterHealth);

    #[async_trait::async_trait]
    impl HealthCheckable for FixedHealth {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "stub-store".to_string(),
                status: self.0,
                latency_ms: 1,
                message: None,
                checked_at: Utc::now(),
            }
        }
    }

    fn router(status: AdapterHealth) -> Router {
        create_router(Arc::new(FixedHealth(status)), vec!["offer_expiry", "emi_reminders"])
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_lists_tasks() {
        let (status, body) = get_json(router(AdapterHealth::Unhealthy), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tasks"], serde_json::json!(["offer_expiry", "emi_reminders"]));
    }

    #[tokio::test]
    async fn test_ready_when_store_healthy() {
        let (status, body) = get_json(router(AdapterHealth::Healthy), "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["adapter_id"], "stub-store");
    }

    #[tokio::test]
    async fn test_not_ready_when_store_unhealthy() {
        let (status, body) = get_json(router(AdapterHealth::Unhealthy), "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_responses_carry_a_request_id() {
        let response = router(AdapterHealth::Healthy)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }
}
