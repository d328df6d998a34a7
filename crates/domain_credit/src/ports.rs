//! Credit Domain Ports
//!
//! The identity/credit provider is an external collaborator. The core only
//! interprets three of its answers (the external credit score, the GST return
//! filing summary and the list of unpaid invoices); identity and full-check
//! responses are passed through as opaque JSON.
//!
//! # Adapters
//!
//! - **Government API** ([`crate::adapters::GovernmentApiClient`]): REST client
//!   with token caching, bounded retries and a TTL response cache
//! - **Mock** (`feature = "mock"`): scripted in-memory provider for tests
//!
//! ```rust,ignore
//! let bureau: Arc<dyn CreditBureauPort> = Arc::new(GovernmentApiClient::new(config)?);
//! let score = bureau.credit_evaluate(&request).await.ok().flatten();
//! ```

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{DomainPort, PortError};

use crate::normalize::NormalizedInvoices;
use crate::scoring::GstReturnsSummary;

/// Identity bundle sent with a credit evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditEvaluationRequest {
    pub gst_number: String,
    pub pan_number: Option<String>,
    pub aadhaar_number: Option<String>,
}

/// Inputs for the provider's combined verification check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullCheckRequest {
    pub aadhaar_number: String,
    pub pan_number: String,
    pub gst_number: String,
    /// First known invoice number, if any
    #[serde(rename = "invoice_id", skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
}

/// External identity and credit-bureau provider
#[async_trait]
pub trait CreditBureauPort: DomainPort {
    async fn verify_aadhaar(&self, aadhaar_number: &str) -> Result<serde_json::Value, PortError>;

    async fn verify_pan(&self, pan_number: &str) -> Result<serde_json::Value, PortError>;

    async fn verify_gst(&self, gst_number: &str) -> Result<serde_json::Value, PortError>;

    /// Unpaid invoices for a GST number, already normalized
    async fn unpaid_invoices(&self, gst_number: &str) -> Result<NormalizedInvoices, PortError>;

    /// Filed vs total GST returns
    async fn gst_returns(&self, gst_number: &str) -> Result<GstReturnsSummary, PortError>;

    async fn full_verification_check(
        &self,
        request: &FullCheckRequest,
    ) -> Result<serde_json::Value, PortError>;

    /// External score on a 0–1000 scale; `None` if the provider omitted it
    async fn credit_evaluate(
        &self,
        request: &CreditEvaluationRequest,
    ) -> Result<Option<Decimal>, PortError>;
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use crate::normalize::ExternalInvoice;

    /// Scripted credit bureau
    ///
    /// Everything defaults to "no data"; tests set scores, returns and
    /// invoices per GST number, or make the whole provider fail.
    #[derive(Debug, Default, Clone)]
    pub struct MockCreditBureau {
        scores: Arc<RwLock<HashMap<String, Decimal>>>,
        returns: Arc<RwLock<HashMap<String, GstReturnsSummary>>>,
        invoices: Arc<RwLock<HashMap<String, Vec<ExternalInvoice>>>>,
        failing: Arc<RwLock<bool>>,
        evaluate_calls: Arc<AtomicU32>,
    }

    impl MockCreditBureau {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn set_score(&self, gst_number: &str, score: Decimal) {
            self.scores.write().await.insert(gst_number.to_string(), score);
        }

        pub async fn set_returns(&self, gst_number: &str, filed: u32, total: u32) {
            self.returns
                .write()
                .await
                .insert(gst_number.to_string(), GstReturnsSummary { filed, total });
        }

        pub async fn set_invoices(&self, gst_number: &str, invoices: Vec<ExternalInvoice>) {
            self.invoices.write().await.insert(gst_number.to_string(), invoices);
        }

        /// Makes every call fail with a timeout
        pub async fn fail_all(&self, failing: bool) {
            *self.failing.write().await = failing;
        }

        pub fn evaluate_calls(&self) -> u32 {
            self.evaluate_calls.load(Ordering::SeqCst)
        }

        async fn check_failing(&self, operation: &str) -> Result<(), PortError> {
            if *self.failing.read().await {
                return Err(PortError::timeout(operation, 10_000));
            }
            Ok(())
        }
    }

    impl DomainPort for MockCreditBureau {}

    #[async_trait]
    impl CreditBureauPort for MockCreditBureau {
        async fn verify_aadhaar(
            &self,
            aadhaar_number: &str,
        ) -> Result<serde_json::Value, PortError> {
            self.check_failing("verify_aadhaar").await?;
            Ok(serde_json::json!({ "aadhaar_number": aadhaar_number, "status": "VERIFIED" }))
        }

        async fn verify_pan(&self, pan_number: &str) -> Result<serde_json::Value, PortError> {
            self.check_failing("verify_pan").await?;
            Ok(serde_json::json!({ "pan_number": pan_number, "status": "VERIFIED" }))
        }

        async fn verify_gst(&self, gst_number: &str) -> Result<serde_json::Value, PortError> {
            self.check_failing("verify_gst").await?;
            Ok(serde_json::json!({ "gst_number": gst_number, "status": "ACTIVE" }))
        }

        async fn unpaid_invoices(&self, gst_number: &str) -> Result<NormalizedInvoices, PortError> {
            self.check_failing("unpaid_invoices").await?;
            Ok(NormalizedInvoices {
                invoices: self.invoices.read().await.get(gst_number).cloned().unwrap_or_default(),
                skipped: Vec::new(),
            })
        }

        async fn gst_returns(&self, gst_number: &str) -> Result<GstReturnsSummary, PortError> {
            self.check_failing("gst_returns").await?;
            Ok(self.returns.read().await.get(gst_number).copied().unwrap_or_default())
        }

        async fn full_verification_check(
            &self,
            request: &FullCheckRequest,
        ) -> Result<serde_json::Value, PortError> {
            self.check_failing("full_verification_check").await?;
            Ok(serde_json::json!({ "gst_number": request.gst_number, "verified": true }))
        }

        async fn credit_evaluate(
            &self,
            request: &CreditEvaluationRequest,
        ) -> Result<Option<Decimal>, PortError> {
            self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
            self.check_failing("credit_evaluate").await?;
            Ok(self.scores.read().await.get(&request.gst_number).copied())
        }
    }

}
