//! Government API client tests against a local stub provider

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use core_kernel::{AdapterHealth, HealthCheckable, PortError, RetryPolicy};
use domain_credit::{
    CreditBureauPort, CreditEvaluationRequest, FullCheckRequest, GovernmentApiClient,
    GovernmentApiConfig,
};

// ============================================================================
// Stub provider
// ============================================================================

#[derive(Clone, Default)]
struct Stub {
    hits: Arc<Mutex<HashMap<String, u32>>>,
}

impl Stub {
    fn hit(&self, key: &str) -> u32 {
        let mut hits = self.hits.lock().unwrap();
        let n = hits.entry(key.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    fn count(&self, key: &str) -> u32 {
        self.hits.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("Bearer tok-"))
        .unwrap_or(false)
}

async fn login(State(stub): State<Stub>) -> Json<Value> {
    let n = stub.hit("login");
    Json(json!({ "access_token": format!("tok-{}", n), "token_type": "bearer" }))
}

async fn aadhaar(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Path(number): Path<String>,
) -> impl IntoResponse {
    stub.hit("aadhaar");
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "missing token"})));
    }
    (StatusCode::OK, Json(json!({ "aadhaar_number": number, "name": "Asha Rao" })))
}

async fn pan(State(stub): State<Stub>, Path(number): Path<String>) -> impl IntoResponse {
    // first call for every PAN fails with a 503
    if stub.hit(&format!("pan:{}", number)) == 1 {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"detail": "warming up"})));
    }
    (StatusCode::OK, Json(json!({ "pan_number": number, "status": "VALID" })))
}

async fn company(State(stub): State<Stub>, Path(gst): Path<String>) -> impl IntoResponse {
    stub.hit("company");
    match gst.as_str() {
        "MISSING" => (StatusCode::NOT_FOUND, Json(json!({"detail": "no such company"}))),
        "REVOKED" => (StatusCode::UNAUTHORIZED, Json(json!({"detail": "token revoked"}))),
        "BAD" => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"detail": "bad gst"}))),
        _ => (StatusCode::OK, Json(json!({ "gst_number": gst, "status": "ACTIVE" }))),
    }
}

async fn unpaid_invoices(State(stub): State<Stub>, Path(gst): Path<String>) -> Json<Value> {
    stub.hit("invoices");
    Json(json!({
        "gst_number": gst,
        "invoices": [
            {
                "invoice_number": "INV-1",
                "grand_total": 150000,
                "due_date": "2026-12-31",
                "delay_days": 4
            },
            {"invoice_number": "INV-2", "amount": "82000.25", "date": "2026-11-15"},
            {"invoice_number": "INV-3", "grand_total": 0}
        ]
    }))
}

async fn returns(State(stub): State<Stub>) -> Json<Value> {
    stub.hit("returns");
    Json(json!({"returns": [
        {"period": "2026-01", "status": "FILED"},
        {"period": "2026-02", "status": "FILED"},
        {"period": "2026-03", "status": "FILED"},
        {"period": "2026-04", "status": "PENDING"}
    ]}))
}

async fn full_check(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.hit("full_check");
    Json(json!({ "echo": body, "verified": true }))
}

async fn credit_evaluate(State(stub): State<Stub>, Json(body): Json<Value>) -> impl IntoResponse {
    stub.hit("credit_eval");
    match body.get("gst_number").and_then(Value::as_str) {
        Some("THROTTLED") => (StatusCode::TOO_MANY_REQUESTS, Json(json!({"detail": "slow down"}))),
        Some("NOSCORE") => (StatusCode::OK, Json(json!({"rating": "unrated"}))),
        _ => (StatusCode::OK, Json(json!({"score": 742, "band": "GOOD"}))),
    }
}

async fn spawn_stub() -> (SocketAddr, Stub) {
    let stub = Stub::default();
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/identity/aadhaar/:number", get(aadhaar))
        .route("/identity/pan/:number", get(pan))
        .route("/business/company/:gst", get(company))
        .route("/business/company/:gst/unpaid-invoices", get(unpaid_invoices))
        .route("/business/company/:gst/returns", get(returns))
        .route("/verification/full-check", post(full_check))
        .route("/external/v1/credit-evaluate", post(credit_evaluate))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, stub)
}

fn client_for(addr: SocketAddr) -> GovernmentApiClient {
    let config = GovernmentApiConfig {
        base_url: format!("http://{}", addr),
        username: "lender".to_string(),
        password: "secret".to_string(),
        ..GovernmentApiConfig::default()
    };
    GovernmentApiClient::new(config).unwrap().with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    })
}

fn eval_request(gst: &str) -> CreditEvaluationRequest {
    CreditEvaluationRequest {
        gst_number: gst.to_string(),
        pan_number: Some("ABCDE1234F".to_string()),
        aadhaar_number: None,
    }
}

// ============================================================================
// Caching and tokens
// ============================================================================

mod caching_tests {
    use super::*;

    #[tokio::test]
    async fn test_identity_lookups_are_cached_and_token_reused() {
        let (addr, stub) = spawn_stub().await;
        let client = client_for(addr);

        let first = client.verify_aadhaar("123412341234").await.unwrap();
        let second = client.verify_aadhaar("123412341234").await.unwrap();
        client.verify_gst("29ABCDE1234F1Z5").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first["name"], "Asha Rao");
        assert_eq!(stub.count("aadhaar"), 1);
        assert_eq!(stub.count("login"), 1);
    }

    #[tokio::test]
    async fn test_unpaid_invoices_bypass_cache_and_are_normalized() {
        let (addr, stub) = spawn_stub().await;
        let client = client_for(addr);

        let first = client.unpaid_invoices("29ABCDE1234F1Z5").await.unwrap();
        let _ = client.unpaid_invoices("29ABCDE1234F1Z5").await.unwrap();

        assert_eq!(stub.count("invoices"), 2);
        assert_eq!(first.invoices.len(), 2);
        assert_eq!(first.skipped.len(), 1);
        assert_eq!(first.invoices[0].amount.amount(), dec!(150000));
        assert_eq!(first.invoices[0].delay_days, 4);
        assert_eq!(first.invoices[1].amount.amount(), dec!(82000.25));
    }

    #[tokio::test]
    async fn test_full_check_sends_invoice_id_and_caches() {
        let (addr, stub) = spawn_stub().await;
        let client = client_for(addr);
        let request = FullCheckRequest {
            aadhaar_number: "123412341234".into(),
            pan_number: "ABCDE1234F".into(),
            gst_number: "29ABCDE1234F1Z5".into(),
            invoice_number: Some("INV-1".into()),
        };

        let result = client.full_verification_check(&request).await.unwrap();
        client.full_verification_check(&request).await.unwrap();

        assert_eq!(result["echo"]["invoice_id"], "INV-1");
        assert_eq!(stub.count("full_check"), 1);
    }

    #[tokio::test]
    async fn test_rejected_token_is_dropped() {
        let (addr, stub) = spawn_stub().await;
        let client = client_for(addr);

        let err = client.verify_gst("REVOKED").await.unwrap_err();
        assert!(matches!(err, PortError::Unauthorized { .. }));

        client.verify_aadhaar("999988887777").await.unwrap();
        assert_eq!(stub.count("login"), 2);
    }
}

// ============================================================================
// Error mapping and retries
// ============================================================================

mod error_tests {
    use super::*;

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (addr, stub) = spawn_stub().await;
        let client = client_for(addr);

        let pan = client.verify_pan("ABCDE1234F").await.unwrap();

        assert_eq!(pan["status"], "VALID");
        assert_eq!(stub.count("pan:ABCDE1234F"), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let (addr, stub) = spawn_stub().await;
        let client = client_for(addr);

        let err = client.verify_gst("MISSING").await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(stub.count("company"), 1);
    }

    #[tokio::test]
    async fn test_client_error_maps_to_validation() {
        let (addr, _stub) = spawn_stub().await;
        let client = client_for(addr);

        let err = client.verify_gst("BAD").await.unwrap_err();
        assert!(matches!(err, PortError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_retry_budget() {
        let (addr, stub) = spawn_stub().await;
        let client = client_for(addr);

        let err = client.credit_evaluate(&eval_request("THROTTLED")).await.unwrap_err();

        assert!(matches!(err, PortError::RateLimited { .. }));
        assert_eq!(stub.count("credit_eval"), 3);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(addr);
        let err = client.verify_aadhaar("123412341234").await.unwrap_err();
        assert!(err.is_transient());
    }
}

// ============================================================================
// Bureau answers
// ============================================================================

mod bureau_tests {
    use super::*;

    #[tokio::test]
    async fn test_credit_evaluate_extracts_score() {
        let (addr, _stub) = spawn_stub().await;
        let client = client_for(addr);

        let score = client.credit_evaluate(&eval_request("29ABCDE1234F1Z5")).await.unwrap();
        assert_eq!(score, Some(dec!(742)));
        assert_eq!(client.credit_evaluate(&eval_request("NOSCORE")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_returns_are_summarized() {
        let (addr, _stub) = spawn_stub().await;
        let client = client_for(addr);

        let summary = client.gst_returns("29ABCDE1234F1Z5").await.unwrap();
        assert_eq!(summary.filed, 3);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.filing_ratio(), dec!(0.75));
    }

    #[tokio::test]
    async fn test_health_check_reports_healthy_when_login_works() {
        let (addr, _stub) = spawn_stub().await;
        let client = client_for(addr);

        let health = client.health_check().await;
        assert_eq!(health.status, AdapterHealth::Healthy);
        assert_eq!(health.adapter_id, "government-api");
    }
}
