use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    models::{AcceptanceResponse, HealthResponse},
    state::AppState,
    utils,
};
use crate::admission::Rejection;
use crate::api::error::ApiError;
use crate::job::{Job, JobSubmission, validate_submission};

/// Job submission endpoint (POST /jobs)
///
/// ## Flow:
/// 1. Validate Content-Type and read the (already decompressed) body under the size cap
/// 2. Deserialize and validate the submission
/// 3. Ask the Admission Guard; a rejection answers 429 with `Retry-After`
/// 4. Generate a UUIDv7 `jobId` and run the pipeline in the background
/// 5. Return 202 Accepted
///
/// The admission permit travels with the background task, so the collection
/// stays marked in flight until its notice has been sent.
pub async fn submit_job(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    utils::parse_content_type(content_type)?;

    let limit = state.config.server.max_payload_bytes.as_u64();
    let body_bytes = read_body(body, limit).await?;

    let submission: JobSubmission = serde_json::from_slice(&body_bytes)?;
    validate_submission(&submission, state.config.server.max_entries_per_job)?;

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = utils::client_address(&parts.headers, peer);

    let permit = match state
        .guard
        .admit(&submission.notify_target, &submission.collection_id, &client)
    {
        Ok(permit) => permit,
        Err(rejection) => {
            state.metrics.job_rejected();
            return Ok(rejected(&rejection));
        }
    };

    let job_id = Uuid::now_v7().to_string();
    let job = Job::from_submission(job_id.clone(), submission);
    info!(
        job_id = %job.job_id,
        collection_id = %job.collection_id,
        files = job.entries.len(),
        client = %client,
        "Job accepted"
    );
    state.metrics.job_accepted();

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let outcome = orchestrator.run(job).await;
        permit.finish(outcome.is_success());
    });

    Ok((StatusCode::ACCEPTED, Json(AcceptanceResponse::accepted(job_id))).into_response())
}

fn rejected(rejection: &Rejection) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(AcceptanceResponse::rejected(rejection)),
    )
        .into_response();

    if let Some(wait) = rejection.retry_after {
        let secs = utils::retry_after_secs(wait);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }

    response
}

/// Reads the request body, refusing anything beyond `limit` bytes
///
/// Decompression is handled by `RequestDecompressionLayer`, so the limit
/// applies to the decompressed payload.
async fn read_body(body: axum::body::Body, limit: u64) -> Result<axum::body::Bytes, ApiError> {
    let max = usize::try_from(limit).unwrap_or(usize::MAX);
    let collected = Limited::new(body, max).collect().await.map_err(|err| {
        if err.downcast_ref::<LengthLimitError>().is_some() {
            ApiError::PayloadTooLarge(limit)
        } else {
            ApiError::InvalidPayload(format!("failed to read body: {err}"))
        }
    })?;

    let bytes = collected.to_bytes();
    debug!(bytes = bytes.len(), "Submission body read");
    Ok(bytes)
}

/// Health check endpoint (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();
    components.insert("api".to_string(), "healthy".to_string());
    components.insert("admission".to_string(), "healthy".to_string());
    components.insert(
        "storage".to_string(),
        format!("{:?}", state.config.storage.provider).to_lowercase(),
    );

    let response = HealthResponse {
        status: "healthy".to_string(),
        components,
        jobs_in_flight: state.guard.in_flight(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

/// Counter snapshot (GET /metrics)
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
