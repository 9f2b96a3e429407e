//! HTTP fetcher with size-aware timeouts and bounded retries

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::LOCATION;
use reqwest::{Client, Response, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::{FailureCode, Fetch, FetchFailure, FetchOutcome, FetchPolicy};
use crate::config::FetchConfig;
use crate::job::SourceFile;

#[derive(Debug, Error)]
pub enum FetchSetupError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// What a single request produced
enum Step {
    Body(Bytes),
    Redirect(Url),
}

/// Fetches source files over HTTP(S)
///
/// Redirects are followed by hand so that every hop stays inside the same
/// per-attempt deadline and counts against `max_redirects`.
pub struct AdaptiveFetcher {
    client: Client,
    policy: FetchPolicy,
}

impl AdaptiveFetcher {
    pub fn new(config: &FetchConfig, policy: FetchPolicy) -> Result<Self, FetchSetupError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    async fn fetch_with_retry(&self, file: &SourceFile) -> FetchOutcome {
        let origin = match Url::parse(&file.origin) {
            Ok(url) => url,
            Err(e) => {
                return FetchOutcome::Failed(FetchFailure::new(
                    FailureCode::InvalidUrl,
                    format!("{}: {}", file.origin, e),
                ));
            }
        };

        let timeout = self.policy.timeout_for(file);
        let mut attempt = 1;

        loop {
            match self.attempt(&origin, file, timeout).await {
                Ok(bytes) => {
                    if attempt > 1 {
                        debug!(name = %file.name, attempt, "Fetch succeeded after retry");
                    }
                    return FetchOutcome::Succeeded(bytes);
                }
                Err(failure) => {
                    let failure = failure.with_attempts(attempt);

                    if !failure.code.is_retryable() || attempt >= self.policy.max_attempts {
                        warn!(
                            name = %file.name,
                            kind = %file.media_kind,
                            attempt,
                            error = %failure,
                            "Fetch failed"
                        );
                        return FetchOutcome::Failed(failure);
                    }

                    let backoff = self.policy.backoff_for(file.media_kind, attempt);
                    warn!(
                        name = %file.name,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %failure,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One attempt: the whole redirect chain and body under one deadline
    async fn attempt(
        &self,
        origin: &Url,
        file: &SourceFile,
        timeout: Duration,
    ) -> Result<Bytes, FetchFailure> {
        match tokio::time::timeout(timeout, self.follow(origin, file)).await {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::new(
                FailureCode::Timeout,
                format!("no complete response within {}ms", timeout.as_millis()),
            )),
        }
    }

    async fn follow(&self, origin: &Url, file: &SourceFile) -> Result<Bytes, FetchFailure> {
        let mut url = origin.clone();
        let mut redirects = 0;

        loop {
            match self.request(&url, file).await? {
                Step::Body(bytes) => return Ok(bytes),
                Step::Redirect(next) => {
                    redirects += 1;
                    if redirects > self.policy.max_redirects {
                        return Err(FetchFailure::new(
                            FailureCode::TooManyRedirects,
                            format!("more than {} redirects", self.policy.max_redirects),
                        ));
                    }
                    debug!(name = %file.name, from = %url, to = %next, "Following redirect");
                    url = next;
                }
            }
        }
    }

    async fn request(&self, url: &Url, file: &SourceFile) -> Result<Step, FetchFailure> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    FetchFailure::new(
                        FailureCode::HttpStatus(status.as_u16()),
                        format!("HTTP {} without Location", status.as_u16()),
                    )
                })?;
            let next = url
                .join(location)
                .map_err(|e| {
                    FetchFailure::new(FailureCode::InvalidUrl, format!("{location}: {e}"))
                })?;
            return Ok(Step::Redirect(next));
        }

        if !status.is_success() {
            return Err(FetchFailure::new(
                FailureCode::HttpStatus(status.as_u16()),
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        if let Some(length) = response.content_length() {
            if length > self.policy.max_entry_bytes {
                return Err(FetchFailure::size_limit(length, self.policy.max_entry_bytes));
            }
        }

        let body = self.read_body(&mut response, file).await?;
        debug!(name = %file.name, size = body.len(), "Fetch completed");

        Ok(Step::Body(body))
    }

    /// Streams the body, enforcing the ceiling on bytes actually received
    async fn read_body(
        &self,
        response: &mut Response,
        file: &SourceFile,
    ) -> Result<Bytes, FetchFailure> {
        let limit = self.policy.max_entry_bytes;
        let capacity = response.content_length().unwrap_or(0).min(limit);
        let mut body = BytesMut::with_capacity(usize::try_from(capacity).unwrap_or(0));
        let mut pending: Vec<Bytes> = Vec::new();
        let mut pending_len = 0usize;
        let mut received = 0u64;

        while let Some(chunk) = response.chunk().await.map_err(classify_error)? {
            received += chunk.len() as u64;
            if received > limit {
                return Err(FetchFailure::size_limit(received, limit));
            }

            pending_len += chunk.len();
            pending.push(chunk);

            if pending_len >= self.policy.coalesce_bytes {
                coalesce(&mut body, &mut pending);
                pending_len = 0;
                debug!(name = %file.name, received, "Body chunks coalesced");
            }
        }

        coalesce(&mut body, &mut pending);
        Ok(body.freeze())
    }
}

#[async_trait]
impl Fetch for AdaptiveFetcher {
    async fn fetch(&self, file: &SourceFile) -> FetchOutcome {
        self.fetch_with_retry(file).await
    }
}

fn coalesce(body: &mut BytesMut, pending: &mut Vec<Bytes>) {
    for chunk in pending.drain(..) {
        body.extend_from_slice(&chunk);
    }
}

fn classify_error(e: reqwest::Error) -> FetchFailure {
    if e.is_timeout() {
        FetchFailure::new(FailureCode::Timeout, e.to_string())
    } else if e.is_builder() {
        FetchFailure::new(FailureCode::InvalidUrl, e.to_string())
    } else if e.is_connect() {
        FetchFailure::new(FailureCode::Network, format!("connection failed: {e}"))
    } else {
        FetchFailure::new(FailureCode::Network, e.to_string())
    }
}
