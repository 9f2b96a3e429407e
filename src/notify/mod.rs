//! Completion and failure notices
//!
//! Every job ends in exactly one [`JobNotice`]. Delivery problems are
//! reported back as [`NotifyError`] for logging; they never change the
//! job's outcome.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::NotifyConfig;
use crate::job::FileFailure;
use crate::sink::JobResult;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook answered HTTP {0}")]
    Status(u16),
}

pub type Result<T> = std::result::Result<T, NotifyError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeOutcome {
    /// Every file archived
    Complete,
    /// Archive stored, some files skipped
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobNotice {
    pub ok: bool,
    pub job_id: String,
    pub processed_count: u64,
    pub failed_count: usize,
    pub failures: Vec<FileFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub outcome: NoticeOutcome,
    pub summary: String,
}

impl JobNotice {
    pub fn completed(result: &JobResult) -> Self {
        let total = result.succeeded + result.failed as u64;
        let (outcome, summary) = if result.failed == 0 {
            (
                NoticeOutcome::Complete,
                format!("all {} files archived", result.succeeded),
            )
        } else {
            (
                NoticeOutcome::Partial,
                format!(
                    "{} of {} files archived; {} skipped",
                    result.succeeded, total, result.failed
                ),
            )
        };

        Self {
            ok: true,
            job_id: result.job_id.clone(),
            processed_count: result.succeeded,
            failed_count: result.failed,
            failures: result.failures.clone(),
            download_url: Some(result.download_url.clone()),
            error_message: None,
            outcome,
            summary,
        }
    }

    pub fn failed(
        job_id: impl Into<String>,
        processed_count: u64,
        failures: Vec<FileFailure>,
        error_message: impl Into<String>,
    ) -> Self {
        let error_message = error_message.into();
        Self {
            ok: false,
            job_id: job_id.into(),
            processed_count,
            failed_count: failures.len(),
            failures,
            download_url: None,
            summary: format!("archive not created: {error_message}"),
            error_message: Some(error_message),
            outcome: NoticeOutcome::Failed,
        }
    }
}

/// Delivers a notice to the job's notify target
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &str, notice: &JobNotice) -> Result<()>;
}

/// Writes notices to the log; used when no webhook is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, target: &str, notice: &JobNotice) -> Result<()> {
        info!(
            target_address = target,
            job_id = %notice.job_id,
            ok = notice.ok,
            processed = notice.processed_count,
            failed = notice.failed_count,
            summary = %notice.summary,
            "Job notice"
        );
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    notify_target: &'a str,
    #[serde(flatten)]
    notice: &'a JobNotice,
}

/// POSTs notices as JSON to a mailer/relay endpoint
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, target: &str, notice: &JobNotice) -> Result<()> {
        let payload = WebhookPayload {
            notify_target: target,
            notice,
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }

        info!(job_id = %notice.job_id, url = %self.url, "Notice delivered");
        Ok(())
    }
}

/// Webhook when configured, log otherwise
pub fn from_config(config: &NotifyConfig) -> Result<Arc<dyn Notifier>> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(
            url.clone(),
            Duration::from_millis(config.timeout_ms),
        )?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::Mutex;

    fn result(succeeded: u64, failures: Vec<FileFailure>) -> JobResult {
        JobResult {
            job_id: "job-1".to_string(),
            collection_id: "evt".to_string(),
            succeeded,
            failed: failures.len(),
            original_bytes: 10,
            archive_bytes: 100,
            storage_key: "archives/evt/x.zip".to_string(),
            download_url: "https://dl.example.com/archives/evt/x.zip".to_string(),
            elapsed_ms: 5,
            failures,
        }
    }

    #[test]
    fn test_complete_notice() {
        let notice = JobNotice::completed(&result(4, vec![]));

        assert!(notice.ok);
        assert_eq!(notice.outcome, NoticeOutcome::Complete);
        assert_eq!(notice.summary, "all 4 files archived");

        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["processedCount"], 4);
        assert_eq!(json["outcome"], "complete");
        assert!(json.get("errorMessage").is_none());
    }

    #[test]
    fn test_partial_notice_lists_failures() {
        let failures = vec![FileFailure::new("clip.mp4", "size_limit: exceeds size limit")];
        let notice = JobNotice::completed(&result(5, failures));

        assert!(notice.ok);
        assert_eq!(notice.outcome, NoticeOutcome::Partial);
        assert_eq!(notice.failed_count, 1);
        assert_eq!(notice.failures.len(), notice.failed_count);
        assert_eq!(notice.summary, "5 of 6 files archived; 1 skipped");
    }

    #[test]
    fn test_failed_notice() {
        let failures = vec![FileFailure::new("a.jpg", "http_status: HTTP 404: Not Found")];
        let notice = JobNotice::failed("job-2", 0, failures, "no files could be processed");

        assert!(!notice.ok);
        assert_eq!(notice.outcome, NoticeOutcome::Failed);
        assert_eq!(notice.error_message.as_deref(), Some("no files could be processed"));

        let json = serde_json::to_value(&notice).unwrap();
        assert!(json.get("downloadUrl").is_none());
        assert_eq!(json["failedCount"], 1);
    }

    #[tokio::test]
    async fn test_webhook_posts_notice() {
        let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();

        async fn hook(
            State(received): State<Arc<Mutex<Vec<serde_json::Value>>>>,
            Json(body): Json<serde_json::Value>,
        ) {
            received.lock().unwrap().push(body);
        }

        let app = Router::new()
            .route("/hook", post(hook))
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let notifier =
            WebhookNotifier::new(format!("http://{addr}/hook"), Duration::from_secs(5)).unwrap();
        let notice = JobNotice::completed(&result(2, vec![]));
        notifier.notify("host@example.com", &notice).await.unwrap();

        let bodies = received.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["notifyTarget"], "host@example.com");
        assert_eq!(bodies[0]["jobId"], "job-1");
        assert_eq!(bodies[0]["ok"], true);
    }

    #[tokio::test]
    async fn test_webhook_error_status_surfaces() {
        let app = Router::new().route(
            "/hook",
            post(|| async { axum::http::StatusCode::BAD_GATEWAY }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let notifier =
            WebhookNotifier::new(format!("http://{addr}/hook"), Duration::from_secs(5)).unwrap();
        let err = notifier
            .notify("x@example.com", &JobNotice::completed(&result(1, vec![])))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Status(502)));
    }
}
