//! Archive jobs and the files they collect.
//!
//! A [`JobSubmission`] is what the front door receives:
//!
//! ```json
//! {
//!   "collectionId": "wedding-2024-06-01",
//!   "notifyTarget": "organizer@example.com",
//!   "entries": [
//!     {
//!       "name": "IMG_0001.jpg",
//!       "origin": "https://cdn.example.com/a.jpg",
//!       "declaredSize": 3145728
//!     },
//!     {
//!       "name": "first-dance.mp4",
//!       "origin": "https://cdn.example.com/b.mp4",
//!       "mediaKind": "video"
//!     }
//!   ]
//! }
//! ```
//!
//! Once validated it becomes an immutable [`Job`] with a generated `job_id`.

mod validation;

pub use validation::{JobValidationError, validate_submission};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::humanize::ByteSize;

const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "heic", "heif", "webp", "tif", "tiff", "bmp", "dng", "raw",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "m4v", "avi", "mkv", "webm", "3gp", "mts", "wmv",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Other,
}

impl MediaKind {
    /// Infer the kind from a file name's extension
    pub fn infer(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some(e) if PHOTO_EXTENSIONS.contains(&e) => MediaKind::Photo,
            Some(e) if VIDEO_EXTENSIONS.contains(&e) => MediaKind::Video,
            _ => MediaKind::Other,
        }
    }

    pub fn is_video(self) -> bool {
        self == MediaKind::Video
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Other => "other",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a submission as sent over the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedFile {
    pub name: String,
    pub origin: String,
    #[serde(default)]
    pub declared_size: Option<u64>,
    #[serde(default)]
    pub media_kind: Option<MediaKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub collection_id: String,
    pub notify_target: String,
    pub entries: Vec<SubmittedFile>,
}

/// One remote file to fetch and archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub name: String,
    pub origin: String,
    /// Hint only; never trusted for correctness
    pub declared_size: Option<ByteSize>,
    pub media_kind: MediaKind,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, origin: impl Into<String>) -> Self {
        let name = name.into();
        let media_kind = MediaKind::infer(&name);
        Self {
            name,
            origin: origin.into(),
            declared_size: None,
            media_kind,
        }
    }

    pub fn with_declared_size(mut self, bytes: u64) -> Self {
        self.declared_size = Some(ByteSize(bytes));
        self
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.media_kind = kind;
        self
    }
}

impl From<SubmittedFile> for SourceFile {
    fn from(file: SubmittedFile) -> Self {
        let media_kind = file
            .media_kind
            .unwrap_or_else(|| MediaKind::infer(&file.name));
        Self {
            name: file.name,
            origin: file.origin,
            declared_size: file.declared_size.map(ByteSize),
            media_kind,
        }
    }
}

/// An accepted archive request; immutable after creation
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: String,
    pub collection_id: String,
    pub notify_target: String,
    pub entries: Vec<SourceFile>,
}

impl Job {
    pub fn new(
        job_id: impl Into<String>,
        collection_id: impl Into<String>,
        notify_target: impl Into<String>,
        entries: Vec<SourceFile>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            collection_id: collection_id.into(),
            notify_target: notify_target.into(),
            entries,
        }
    }

    /// Build a job from an already-validated submission
    pub fn from_submission(job_id: impl Into<String>, submission: JobSubmission) -> Self {
        Self {
            job_id: job_id.into(),
            collection_id: submission.collection_id,
            notify_target: submission.notify_target,
            entries: submission.entries.into_iter().map(SourceFile::from).collect(),
        }
    }
}

/// A file that did not make it into the archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub name: String,
    pub reason: String,
}

impl FileFailure {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_inference() {
        assert_eq!(MediaKind::infer("IMG_0001.JPG"), MediaKind::Photo);
        assert_eq!(MediaKind::infer("party.heic"), MediaKind::Photo);
        assert_eq!(MediaKind::infer("first dance.MOV"), MediaKind::Video);
        assert_eq!(MediaKind::infer("clip.mp4"), MediaKind::Video);
        assert_eq!(MediaKind::infer("notes.txt"), MediaKind::Other);
        assert_eq!(MediaKind::infer("no_extension"), MediaKind::Other);
    }

    #[test]
    fn test_submission_deserialize_camel_case() {
        let json = r#"{
            "collectionId": "evt-1",
            "notifyTarget": "host@example.com",
            "entries": [
                {"name": "a.jpg", "origin": "https://cdn.example.com/a.jpg", "declaredSize": 2048},
                {"name": "b.bin", "origin": "https://cdn.example.com/b", "mediaKind": "video"}
            ]
        }"#;

        let submission: JobSubmission = serde_json::from_str(json).unwrap();
        let job = Job::from_submission("job-1", submission);

        assert_eq!(job.collection_id, "evt-1");
        assert_eq!(job.entries.len(), 2);
        assert_eq!(job.entries[0].declared_size, Some(ByteSize(2048)));
        assert_eq!(job.entries[0].media_kind, MediaKind::Photo);
        // explicit kind wins over the extension
        assert_eq!(job.entries[1].media_kind, MediaKind::Video);
    }
}
