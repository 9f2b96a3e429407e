use bytes::Bytes;
use serde::Serialize;
use std::fmt;

/// Machine-usable failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    HttpStatus(u16),
    Network,
    Timeout,
    SizeLimit,
    TooManyRedirects,
    InvalidUrl,
    Internal,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::HttpStatus(_) => "http_status",
            FailureCode::Network => "network",
            FailureCode::Timeout => "timeout",
            FailureCode::SizeLimit => "size_limit",
            FailureCode::TooManyRedirects => "too_many_redirects",
            FailureCode::InvalidUrl => "invalid_url",
            FailureCode::Internal => "internal",
        }
    }

    /// Transient conditions worth another attempt
    pub fn is_retryable(&self) -> bool {
        match *self {
            FailureCode::HttpStatus(status) => status >= 500 || status == 408 || status == 429,
            FailureCode::Network | FailureCode::Timeout => true,
            FailureCode::SizeLimit
            | FailureCode::TooManyRedirects
            | FailureCode::InvalidUrl
            | FailureCode::Internal => false,
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FailureCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub code: FailureCode,
    pub message: String,
    pub attempts: u32,
}

impl FetchFailure {
    pub fn new(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            attempts: 1,
        }
    }

    pub fn size_limit(actual: u64, limit: u64) -> Self {
        Self::new(
            FailureCode::SizeLimit,
            format!("exceeds size limit: {actual} bytes > {limit} bytes"),
        )
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// `code: human text`, as reported to the recipient
    pub fn reason(&self) -> String {
        format!("{}: {}", self.code, self.message)
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} attempt(s))", self.reason(), self.attempts)
    }
}

/// Result of attempting one source file; never aborts the job
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Succeeded(Bytes),
    Failed(FetchFailure),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Succeeded(_))
    }
}
