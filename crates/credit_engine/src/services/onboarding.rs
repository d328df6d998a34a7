//! KYC onboarding
//!
//! Verifies identity with the provider, stores the business profile with a
//! verification snapshot and persists the invoices fetched during the check.
//! Provider failures here propagate as `ExternalProvider`; unlike scoring
//! there is no fallback for identity.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::instrument;

use core_kernel::{AuditAction, AuditRecord, EntityType, UserId};
use domain_credit::{BusinessProfile, FullCheckRequest};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::services::invoice_sync::upsert_invoices;

/// Identity documents submitted for onboarding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingRequest {
    pub aadhaar_number: String,
    pub pan_number: String,
    pub gst_number: String,
}

/// Any response carrying an `error` key counts as a failed verification
fn is_verified(responses: &[&Value]) -> bool {
    responses
        .iter()
        .all(|response| response.get("error").is_none())
}

#[derive(Clone)]
pub struct OnboardingService {
    ctx: EngineContext,
}

impl OnboardingService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Runs KYC and creates the business profile
    ///
    /// Onboarding the same GST again for the same user returns the existing
    /// profile unchanged.
    ///
    /// # Errors
    ///
    /// * `Conflict` - the GST number belongs to another user
    /// * `ExternalProvider` - a verification call failed
    /// * `Validation` - the provider rejected one of the documents
    #[instrument(skip(self, request), fields(actor = %actor, gst = %request.gst_number))]
    pub async fn onboard(
        &self,
        actor: UserId,
        request: OnboardingRequest,
    ) -> Result<BusinessProfile, EngineError> {
        if let Some(existing) = self.ctx.store.business_by_gst(&request.gst_number).await? {
            if existing.is_owned_by(actor) {
                tracing::info!(business_id = %existing.id, "kyc.onboarding_skipped.already_exists");
                return Ok(existing);
            }
            return Err(EngineError::conflict(
                "business with this GST number is already registered to another user",
            ));
        }

        let bureau = &self.ctx.bureau;
        let aadhaar = bureau
            .verify_aadhaar(&request.aadhaar_number)
            .await
            .map_err(EngineError::provider)?;
        let pan = bureau.verify_pan(&request.pan_number).await.map_err(EngineError::provider)?;
        let gst = bureau.verify_gst(&request.gst_number).await.map_err(EngineError::provider)?;
        let invoices = bureau
            .unpaid_invoices(&request.gst_number)
            .await
            .map_err(EngineError::provider)?;
        let full_check = bureau
            .full_verification_check(&FullCheckRequest {
                aadhaar_number: request.aadhaar_number.clone(),
                pan_number: request.pan_number.clone(),
                gst_number: request.gst_number.clone(),
                invoice_number: invoices.invoices.first().map(|i| i.invoice_number.clone()),
            })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "kyc.gov_api_error");
                EngineError::provider(e)
            })?;

        if !is_verified(&[&aadhaar, &pan, &gst, &full_check]) {
            tracing::warn!(gst = %request.gst_number, "kyc.verification_failed");
            return Err(EngineError::Validation(
                "KYC verification failed. Please check your credentials.".into(),
            ));
        }

        let now = self.ctx.now();
        let profile = BusinessProfile::new(actor, request.gst_number.clone(), now)
            .with_identity(request.aadhaar_number, request.pan_number)
            .with_snapshot(json!({
                "aadhaar": aadhaar,
                "pan": pan,
                "gst": gst,
                "full_check": full_check,
            }));

        let mut tx = self.ctx.begin().await?;
        let result = async {
            tx.uow.insert_business(&profile).await?;
            let report = upsert_invoices(&self.ctx, &mut tx, &profile, invoices).await?;
            tx.record(
                AuditRecord::new(
                    Some(actor),
                    AuditAction::BusinessOnboarded,
                    EntityType::Business,
                    profile.id,
                    now,
                )
                .with_new(json!({
                    "gst_number": profile.gst_number,
                    "invoices": report,
                })),
            );
            Ok::<(), EngineError>(())
        }
        .await;
        tx.finish(&self.ctx, result).await?;

        tracing::info!(
            business_id = %profile.id,
            gst = %profile.gst_number,
            "kyc.onboarding_complete"
        );
        Ok(profile)
    }
}
