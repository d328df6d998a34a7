//! Business profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{BusinessId, UserId};

/// A GST-registered business owned by one user
///
/// The verification snapshot is the raw identity/KYC response captured at
/// onboarding. It is stored as opaque JSON and never interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub id: BusinessId,
    pub user_id: UserId,
    pub gst_number: String,
    pub aadhaar_number: Option<String>,
    pub pan_number: Option<String>,
    pub verification_snapshot: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl BusinessProfile {
    pub fn new(user_id: UserId, gst_number: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: BusinessId::new_v7(),
            user_id,
            gst_number: gst_number.into(),
            aadhaar_number: None,
            pan_number: None,
            verification_snapshot: None,
            created_at,
        }
    }

    pub fn with_identity(
        mut self,
        aadhaar_number: impl Into<String>,
        pan_number: impl Into<String>,
    ) -> Self {
        self.aadhaar_number = Some(aadhaar_number.into());
        self.pan_number = Some(pan_number.into());
        self
    }

    pub fn with_snapshot(mut self, snapshot: serde_json::Value) -> Self {
        self.verification_snapshot = Some(snapshot);
        self
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}
