//! Fetching remote source files
//!
//! Every attempt at a [`SourceFile`] ends in a [`FetchOutcome`]; failures are
//! values, never errors that abort the job. [`AdaptiveFetcher`] is the HTTP
//! implementation, sizing its timeouts and backoff from [`FetchPolicy`].

mod http;
mod outcome;
mod policy;

pub use http::{AdaptiveFetcher, FetchSetupError};
pub use outcome::{FailureCode, FetchFailure, FetchOutcome};
pub use policy::{FetchPolicy, retry_delay};

use async_trait::async_trait;

use crate::job::SourceFile;

/// Retrieves the bytes of one source file
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, file: &SourceFile) -> FetchOutcome;
}
