//! Timeout and backoff tables for the adaptive fetcher

use std::time::Duration;

use crate::config::{ArchiveConfig, FetchConfig};
use crate::job::{MediaKind, SourceFile};

/// Per-file fetch tuning derived from configuration
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub base_timeout: Duration,
    pub per_mb_timeout: Duration,
    pub photo_min_timeout: Duration,
    pub video_min_timeout: Duration,
    pub max_timeout: Duration,
    pub max_attempts: u32,
    pub photo_backoff_base: Duration,
    pub video_backoff_base: Duration,
    pub max_redirects: u32,
    pub max_entry_bytes: u64,
    pub coalesce_bytes: usize,
}

impl FetchPolicy {
    pub fn from_config(fetch: &FetchConfig, archive: &ArchiveConfig) -> Self {
        Self {
            base_timeout: Duration::from_millis(fetch.base_timeout_ms),
            per_mb_timeout: Duration::from_millis(fetch.per_mb_timeout_ms),
            photo_min_timeout: Duration::from_millis(fetch.photo_min_timeout_ms),
            video_min_timeout: Duration::from_millis(fetch.video_min_timeout_ms),
            max_timeout: Duration::from_millis(fetch.max_timeout_ms),
            max_attempts: fetch.max_attempts.max(1),
            photo_backoff_base: Duration::from_millis(fetch.photo_backoff_base_ms),
            video_backoff_base: Duration::from_millis(fetch.video_backoff_base_ms),
            max_redirects: fetch.max_redirects,
            max_entry_bytes: archive.max_entry_bytes.as_u64(),
            coalesce_bytes: usize::try_from(fetch.coalesce_bytes.as_u64()).unwrap_or(usize::MAX),
        }
    }

    fn min_timeout(&self, kind: MediaKind) -> Duration {
        match kind {
            MediaKind::Video => self.video_min_timeout,
            MediaKind::Photo | MediaKind::Other => self.photo_min_timeout,
        }
    }

    /// `clamp(base + per_mb * declared_mb, min(kind), max)`
    pub fn timeout_for(&self, file: &SourceFile) -> Duration {
        let declared_mb = file
            .declared_size
            .map(|size| size.as_mib_f64())
            .unwrap_or(0.0);

        let scaled =
            self.base_timeout.as_secs_f64() + self.per_mb_timeout.as_secs_f64() * declared_mb;
        let capped = Duration::from_secs_f64(scaled.min(self.max_timeout.as_secs_f64()));

        capped.max(self.min_timeout(file.media_kind)).min(self.max_timeout)
    }

    /// Wait after failed attempt number `attempt` (1-based): `base(kind) * 2^attempt`
    pub fn backoff_for(&self, kind: MediaKind, attempt: u32) -> Duration {
        let base = match kind {
            MediaKind::Video => self.video_backoff_base,
            MediaKind::Photo | MediaKind::Other => self.photo_backoff_base,
        };
        retry_delay(attempt, base)
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default(), &ArchiveConfig::default())
    }
}

/// `base * 2^exponent`, saturating instead of overflowing
pub fn retry_delay(exponent: u32, base: Duration) -> Duration {
    base.saturating_mul(2u32.saturating_pow(exponent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::MIB;

    fn photo(mb: u64) -> SourceFile {
        SourceFile::new("IMG.jpg", "https://cdn.example.com/IMG.jpg").with_declared_size(mb * MIB)
    }

    fn video(mb: u64) -> SourceFile {
        SourceFile::new("clip.mp4", "https://cdn.example.com/clip.mp4").with_declared_size(mb * MIB)
    }

    #[test]
    fn test_timeout_scales_with_declared_size() {
        let policy = FetchPolicy::default();

        let small = policy.timeout_for(&photo(1));
        let large = policy.timeout_for(&photo(300));

        assert!(large > small);
        assert!(small >= policy.photo_min_timeout);
        assert!(large <= policy.max_timeout);
    }

    #[test]
    fn test_timeout_formula() {
        let policy = FetchPolicy::default();

        // 30s + 2s * 10MB
        assert_eq!(policy.timeout_for(&photo(10)), Duration::from_secs(50));
        // 30s + 2s * 100MB
        assert_eq!(policy.timeout_for(&video(100)), Duration::from_secs(230));
    }

    #[test]
    fn test_timeout_clamped_to_bounds() {
        let policy = FetchPolicy::default();

        // undeclared video is lifted to the video floor
        let undeclared = SourceFile::new("clip.mov", "https://cdn.example.com/clip.mov");
        assert_eq!(policy.timeout_for(&undeclared), policy.video_min_timeout);

        // huge declarations are capped
        assert_eq!(policy.timeout_for(&video(100_000)), policy.max_timeout);
        assert_eq!(
            policy.timeout_for(&photo(u64::MAX / MIB)),
            policy.max_timeout
        );
    }

    #[test]
    fn test_videos_get_larger_floor() {
        let policy = FetchPolicy::default();
        assert!(policy.timeout_for(&video(1)) > policy.timeout_for(&photo(1)));
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = FetchPolicy::default();

        assert_eq!(policy.backoff_for(MediaKind::Photo, 1), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(MediaKind::Photo, 2), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(MediaKind::Video, 1), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(MediaKind::Video, 2), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_delay_saturates() {
        let delay = retry_delay(64, Duration::from_secs(u64::MAX / 2));
        assert!(delay >= Duration::from_secs(u64::MAX / 2));
    }
}
