//! Result Sink: persists a finished archive and reports the job result

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tokio::io::AsyncSeekExt;
use tracing::info;

use crate::archive::ArchiveSummary;
use crate::job::{FileFailure, Job};
use crate::storage::{StorageClient, StorageError};

pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Archive upload failed: {0}")]
    Upload(#[from] StorageError),

    #[error("Spool file unreadable: {0}")]
    Spool(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SinkError>;

/// A complete archive sitting in a spool file
#[derive(Debug)]
pub struct SpooledArchive {
    pub file: tokio::fs::File,
    pub summary: ArchiveSummary,
}

/// Aggregate outcome of a job whose archive was stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: String,
    pub collection_id: String,
    pub succeeded: u64,
    pub failed: usize,
    pub original_bytes: u64,
    pub archive_bytes: u64,
    pub storage_key: String,
    pub download_url: String,
    pub elapsed_ms: u64,
    pub failures: Vec<FileFailure>,
}

impl JobResult {
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }
}

/// Where finished archives go. Upload failures are not retried here.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    async fn deliver(
        &self,
        job: &Job,
        archive: SpooledArchive,
        failures: Vec<FileFailure>,
        started: Instant,
    ) -> Result<JobResult>;
}

/// Object-store backed sink
pub struct ResultSink {
    storage: StorageClient,
    key_prefix: String,
}

impl ResultSink {
    pub fn new(storage: StorageClient, key_prefix: impl Into<String>) -> Self {
        Self {
            storage,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn storage(&self) -> &StorageClient {
        &self.storage
    }

    /// `{prefix}/{collection}/{timestamp}_{job_id}.zip`
    pub fn archive_key(&self, collection_id: &str, job_id: &str, at: DateTime<Utc>) -> String {
        let file = format!(
            "{}_{}.zip",
            at.format("%Y%m%dT%H%M%SZ"),
            key_segment(job_id, "job")
        );
        let collection = key_segment(collection_id, "collection");

        match self.key_prefix.trim_matches('/') {
            "" => format!("{collection}/{file}"),
            prefix => format!("{prefix}/{collection}/{file}"),
        }
    }
}

#[async_trait]
impl ArchiveSink for ResultSink {
    async fn deliver(
        &self,
        job: &Job,
        archive: SpooledArchive,
        failures: Vec<FileFailure>,
        started: Instant,
    ) -> Result<JobResult> {
        let SpooledArchive { mut file, summary } = archive;
        file.rewind().await?;

        let key = self.archive_key(&job.collection_id, &job.job_id, Utc::now());
        let uploaded = self
            .storage
            .upload_stream(&key, file, ARCHIVE_CONTENT_TYPE)
            .await?;
        let download_url = self.storage.download_url(&key);

        info!(key, bytes = uploaded.size, "Archive stored");

        Ok(JobResult {
            job_id: job.job_id.clone(),
            collection_id: job.collection_id.clone(),
            succeeded: summary.entry_count,
            failed: failures.len(),
            original_bytes: summary.payload_bytes,
            archive_bytes: uploaded.size,
            storage_key: key,
            download_url,
            elapsed_ms: started.elapsed().as_millis() as u64,
            failures,
        })
    }
}

/// Reduce an identifier to characters safe in an object key segment
fn key_segment(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.trim_start_matches('.') {
        "" => fallback.to_string(),
        segment => segment.to_string(),
    }
}
