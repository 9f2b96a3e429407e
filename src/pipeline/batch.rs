//! Collection analysis and batch planning

use serde::Serialize;
use std::fmt;

use crate::archive::EntryNamer;
use crate::humanize::{ByteSize, GIB, MIB};
use crate::job::SourceFile;

/// Diagnostic classification; changes log verbosity only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Moderate,
    High,
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Risk::Low => "low",
            Risk::Moderate => "moderate",
            Risk::High => "high",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionProfile {
    pub file_count: usize,
    pub video_count: usize,
    /// Sum of declared sizes; files without a declaration count as zero
    pub estimated_bytes: u64,
    pub undeclared_count: usize,
    pub risk: Risk,
}

impl CollectionProfile {
    pub fn analyze(entries: &[SourceFile]) -> Self {
        let video_count = entries.iter().filter(|f| f.media_kind.is_video()).count();
        let estimated_bytes = entries
            .iter()
            .filter_map(|f| f.declared_size)
            .fold(0u64, |acc, size| acc.saturating_add(size.as_u64()));
        let undeclared_count = entries.iter().filter(|f| f.declared_size.is_none()).count();

        let risk = if video_count > 10 || estimated_bytes > 2 * GIB || entries.len() > 500 {
            Risk::High
        } else if video_count > 0 || estimated_bytes > 500 * MIB || entries.len() > 100 {
            Risk::Moderate
        } else {
            Risk::Low
        };

        Self {
            file_count: entries.len(),
            video_count,
            estimated_bytes,
            undeclared_count,
            risk,
        }
    }

    pub fn estimated_size(&self) -> ByteSize {
        ByteSize(self.estimated_bytes)
    }
}

/// A source file paired with its final, unique entry name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub entry_name: String,
    pub source: SourceFile,
}

impl PlannedFile {
    pub fn is_video(&self) -> bool {
        self.source.media_kind.is_video()
    }
}

/// Sanitize and de-duplicate names in input order, so the same job always
/// yields the same names regardless of fetch completion order
pub fn assign_entry_names(entries: &[SourceFile], max_name_bytes: usize) -> Vec<PlannedFile> {
    let mut namer = EntryNamer::new(max_name_bytes);
    entries
        .iter()
        .map(|source| PlannedFile {
            entry_name: namer.assign(&source.name),
            source: source.clone(),
        })
        .collect()
}

/// Greedy partition in input order. A batch holding any video is capped at
/// `video_batch_size`, otherwise at `photo_batch_size`.
pub fn plan_batches(
    files: Vec<PlannedFile>,
    photo_batch_size: usize,
    video_batch_size: usize,
) -> Vec<Vec<PlannedFile>> {
    let photo_batch_size = photo_batch_size.max(1);
    let video_batch_size = video_batch_size.max(1);

    let mut batches = Vec::new();
    let mut current: Vec<PlannedFile> = Vec::new();

    for file in files {
        let has_video = file.is_video() || current.iter().any(PlannedFile::is_video);
        let limit = if has_video {
            video_batch_size
        } else {
            photo_batch_size
        };

        if !current.is_empty() && current.len() + 1 > limit {
            batches.push(std::mem::take(&mut current));
        }
        current.push(file);
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(name: &str) -> SourceFile {
        SourceFile::new(name, format!("https://cdn.example.com/{name}"))
    }

    fn sizes(batches: &[Vec<PlannedFile>]) -> Vec<usize> {
        batches.iter().map(Vec::len).collect()
    }

    #[test]
    fn test_profile_counts_and_risk() {
        let entries = vec![
            photo("a.jpg").with_declared_size(3 * MIB),
            photo("b.jpg"),
            photo("c.mp4").with_declared_size(300 * MIB),
        ];

        let profile = CollectionProfile::analyze(&entries);
        assert_eq!(profile.file_count, 3);
        assert_eq!(profile.video_count, 1);
        assert_eq!(profile.undeclared_count, 1);
        assert_eq!(profile.estimated_bytes, 303 * MIB);
        assert_eq!(profile.risk, Risk::Moderate);
    }

    #[test]
    fn test_profile_risk_levels() {
        let photos: Vec<SourceFile> = (0..5).map(|i| photo(&format!("{i}.jpg"))).collect();
        assert_eq!(CollectionProfile::analyze(&photos).risk, Risk::Low);

        let videos: Vec<SourceFile> = (0..11).map(|i| photo(&format!("{i}.mov"))).collect();
        assert_eq!(CollectionProfile::analyze(&videos).risk, Risk::High);

        let huge = vec![photo("x.jpg").with_declared_size(3 * GIB)];
        assert_eq!(CollectionProfile::analyze(&huge).risk, Risk::High);

        assert_eq!(CollectionProfile::analyze(&[]).risk, Risk::Low);
    }

    #[test]
    fn test_names_assigned_in_input_order() {
        let entries = vec![photo("IMG.jpg"), photo("other.png"), photo("IMG.jpg")];
        let planned = assign_entry_names(&entries, 200);

        let names: Vec<&str> = planned.iter().map(|p| p.entry_name.as_str()).collect();
        assert_eq!(names, vec!["IMG.jpg", "other.png", "IMG_1.jpg"]);
        assert_eq!(planned[2].source.name, "IMG.jpg");
    }

    #[test]
    fn test_photo_only_batches() {
        let entries: Vec<SourceFile> = (0..23).map(|i| photo(&format!("{i}.jpg"))).collect();
        let batches = plan_batches(assign_entry_names(&entries, 200), 10, 2);
        assert_eq!(sizes(&batches), vec![10, 10, 3]);
    }

    #[test]
    fn test_videos_shrink_batches() {
        let entries = vec![
            photo("1.jpg"),
            photo("2.jpg"),
            photo("3.jpg"),
            photo("4.mp4"),
            photo("5.jpg"),
            photo("6.jpg"),
            photo("7.mov"),
            photo("8.mov"),
        ];
        let batches = plan_batches(assign_entry_names(&entries, 200), 10, 2);

        assert_eq!(sizes(&batches), vec![3, 2, 2, 1]);
        assert!(batches.iter().all(|b| {
            !b.iter().any(PlannedFile::is_video) || b.len() <= 2
        }));

        let flattened: Vec<&str> = batches
            .iter()
            .flatten()
            .map(|p| p.entry_name.as_str())
            .collect();
        assert_eq!(
            flattened,
            vec!["1.jpg", "2.jpg", "3.jpg", "4.mp4", "5.jpg", "6.jpg", "7.mov", "8.mov"]
        );
    }

    #[test]
    fn test_empty_plan() {
        assert!(plan_batches(Vec::new(), 10, 2).is_empty());
    }
}
