use super::models::{Config, StorageProvider};
use thiserror::Error;

const MAX_PAYLOAD_BYTES: u64 = 5 * 1024 * 1024;
const MAX_BATCH_SIZE: usize = 32;
const MAX_ATTEMPTS: u32 = 10;
const MIN_NAME_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("max_payload_bytes ({actual}) exceeds limit of 5MB ({limit})")]
    PayloadSizeExceedsLimit { actual: u64, limit: u64 },

    #[error("{field} must be between 1 and {max}, got {value}")]
    BatchSizeOutOfRange {
        field: &'static str,
        value: usize,
        max: usize,
    },

    #[error("video_batch_size ({video}) must not exceed photo_batch_size ({photo})")]
    VideoBatchLargerThanPhoto { video: usize, photo: usize },

    #[error("max_attempts must be between 1 and {max}, got {value}")]
    InvalidMaxAttempts { value: u32, max: u32 },

    #[error("{field} ({value}ms) exceeds max_timeout_ms ({max}ms)")]
    TimeoutBoundsInverted {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("max_entry_bytes must be positive and below 4GiB, got {0}")]
    InvalidEntryCeiling(u64),

    #[error("max_name_bytes must be at least {min}, got {value}")]
    NameLimitTooSmall { value: usize, min: usize },

    #[error("admission {field} must be positive")]
    InvalidAdmission { field: &'static str },

    #[error("Storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_payload_size(config)?;
    validate_batches(config)?;
    validate_fetch(config)?;
    validate_archive(config)?;
    validate_admission(config)?;
    validate_storage(config)?;
    Ok(())
}

fn validate_payload_size(config: &Config) -> Result<(), ValidationError> {
    let actual = config.server.max_payload_bytes.as_u64();
    if actual > MAX_PAYLOAD_BYTES {
        return Err(ValidationError::PayloadSizeExceedsLimit {
            actual,
            limit: MAX_PAYLOAD_BYTES,
        });
    }
    Ok(())
}

fn validate_batches(config: &Config) -> Result<(), ValidationError> {
    let batch = &config.batch;
    for (field, value) in [
        ("photo_batch_size", batch.photo_batch_size),
        ("video_batch_size", batch.video_batch_size),
    ] {
        if !(1..=MAX_BATCH_SIZE).contains(&value) {
            return Err(ValidationError::BatchSizeOutOfRange {
                field,
                value,
                max: MAX_BATCH_SIZE,
            });
        }
    }

    if batch.video_batch_size > batch.photo_batch_size {
        return Err(ValidationError::VideoBatchLargerThanPhoto {
            video: batch.video_batch_size,
            photo: batch.photo_batch_size,
        });
    }

    Ok(())
}

fn validate_fetch(config: &Config) -> Result<(), ValidationError> {
    let fetch = &config.fetch;
    if !(1..=MAX_ATTEMPTS).contains(&fetch.max_attempts) {
        return Err(ValidationError::InvalidMaxAttempts {
            value: fetch.max_attempts,
            max: MAX_ATTEMPTS,
        });
    }

    for (field, value) in [
        ("photo_min_timeout_ms", fetch.photo_min_timeout_ms),
        ("video_min_timeout_ms", fetch.video_min_timeout_ms),
    ] {
        if value > fetch.max_timeout_ms {
            return Err(ValidationError::TimeoutBoundsInverted {
                field,
                value,
                max: fetch.max_timeout_ms,
            });
        }
    }

    Ok(())
}

fn validate_archive(config: &Config) -> Result<(), ValidationError> {
    let ceiling = config.archive.max_entry_bytes.as_u64();
    // Entry sizes live in 32-bit header fields
    if ceiling == 0 || ceiling >= u64::from(u32::MAX) {
        return Err(ValidationError::InvalidEntryCeiling(ceiling));
    }

    if config.archive.max_name_bytes < MIN_NAME_BYTES {
        return Err(ValidationError::NameLimitTooSmall {
            value: config.archive.max_name_bytes,
            min: MIN_NAME_BYTES,
        });
    }

    Ok(())
}

fn validate_admission(config: &Config) -> Result<(), ValidationError> {
    let admission = &config.admission;
    if admission.window_secs == 0 {
        return Err(ValidationError::InvalidAdmission { field: "window_secs" });
    }
    if admission.max_requests == 0 {
        return Err(ValidationError::InvalidAdmission { field: "max_requests" });
    }
    if admission.breaker_failure_threshold == 0 {
        return Err(ValidationError::InvalidAdmission {
            field: "breaker_failure_threshold",
        });
    }
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider == StorageProvider::S3
        && (config.storage.access_key.is_none() || config.storage.secret_key.is_none())
    {
        return Err(ValidationError::MissingS3Credentials);
    }
    Ok(())
}
