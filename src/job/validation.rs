use thiserror::Error;

use super::JobSubmission;

#[derive(Debug, Error)]
pub enum JobValidationError {
    #[error("collectionId must not be empty")]
    MissingCollectionId,
    #[error("notifyTarget must not be empty")]
    MissingNotifyTarget,
    #[error("entries must contain between 1 and {max} files, got {actual}")]
    InvalidEntryCount { actual: usize, max: usize },
    #[error("entry {index} has an empty name")]
    EmptyName { index: usize },
    #[error("entry '{0}' must have an http/https origin")]
    InvalidOrigin(String),
}

pub fn validate_submission(
    submission: &JobSubmission,
    max_entries: usize,
) -> Result<(), JobValidationError> {
    if submission.collection_id.trim().is_empty() {
        return Err(JobValidationError::MissingCollectionId);
    }

    if submission.notify_target.trim().is_empty() {
        return Err(JobValidationError::MissingNotifyTarget);
    }

    let count = submission.entries.len();
    if !(1..=max_entries).contains(&count) {
        return Err(JobValidationError::InvalidEntryCount {
            actual: count,
            max: max_entries,
        });
    }

    for (index, entry) in submission.entries.iter().enumerate() {
        if entry.name.trim().is_empty() {
            return Err(JobValidationError::EmptyName { index });
        }

        let scheme_ok = reqwest::Url::parse(&entry.origin)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            .unwrap_or(false);
        if !scheme_ok {
            return Err(JobValidationError::InvalidOrigin(entry.name.clone()));
        }
    }

    Ok(())
}
