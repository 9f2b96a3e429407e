//! Wire models for the front door.
//!
//! Submissions use [`crate::job::JobSubmission`]. Every `POST /jobs`
//! answers with an [`AcceptanceResponse`]:
//!
//! ```json
//! { "accepted": true, "jobId": "01929c1e-8f4a-7d3e-9b1a-3c5d7e9f1a2b" }
//! { "accepted": false, "jobId": null, "reason": "too_many_requests", "message": "..." }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::admission::Rejection;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceResponse {
    pub accepted: bool,
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AcceptanceResponse {
    pub fn accepted(job_id: impl Into<String>) -> Self {
        Self {
            accepted: true,
            job_id: Some(job_id.into()),
            reason: None,
            message: None,
        }
    }

    pub fn rejected(rejection: &Rejection) -> Self {
        Self {
            accepted: false,
            job_id: None,
            reason: Some(rejection.reason.as_str().to_string()),
            message: Some(rejection.message()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, String>,
    pub jobs_in_flight: usize,
    pub version: String,
}
