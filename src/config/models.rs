use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Front door configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
    #[serde(default = "default_max_entries_per_job")]
    pub max_entries_per_job: usize,
    /// Directory for archive spool files; system temp dir when unset
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_payload_bytes: default_max_payload_bytes(),
            max_entries_per_job: default_max_entries_per_job(),
            spool_dir: None,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize::mib(5)
}

fn default_max_entries_per_job() -> usize {
    5000
}

/// Storage provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Memory,
    #[default]
    Local,
    S3,
}

/// Archive storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Root directory for the local provider
    #[serde(default = "default_local_root")]
    pub root: PathBuf,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Base for download links; `{scheme}://{bucket}` when unset
    pub public_base_url: Option<String>,
    #[serde(default = "default_upload_part_bytes")]
    pub upload_part_bytes: ByteSize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            bucket: default_bucket(),
            root: default_local_root(),
            endpoint: None,
            region: None,
            access_key: None,
            secret_key: None,
            key_prefix: default_key_prefix(),
            public_base_url: None,
            upload_part_bytes: default_upload_part_bytes(),
        }
    }
}

fn default_bucket() -> String {
    "bundlebox-archives".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from("data/archives")
}

fn default_key_prefix() -> String {
    "archives".to_string()
}

fn default_upload_part_bytes() -> ByteSize {
    ByteSize::mib(8)
}

/// Adaptive fetcher tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_base_timeout_ms")]
    pub base_timeout_ms: u64,
    /// Added per declared megabyte
    #[serde(default = "default_per_mb_timeout_ms")]
    pub per_mb_timeout_ms: u64,
    #[serde(default = "default_photo_min_timeout_ms")]
    pub photo_min_timeout_ms: u64,
    #[serde(default = "default_video_min_timeout_ms")]
    pub video_min_timeout_ms: u64,
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_photo_backoff_base_ms")]
    pub photo_backoff_base_ms: u64,
    #[serde(default = "default_video_backoff_base_ms")]
    pub video_backoff_base_ms: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
    /// Pending chunk volume that triggers coalescing into the body buffer
    #[serde(default = "default_coalesce_bytes")]
    pub coalesce_bytes: ByteSize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            base_timeout_ms: default_base_timeout_ms(),
            per_mb_timeout_ms: default_per_mb_timeout_ms(),
            photo_min_timeout_ms: default_photo_min_timeout_ms(),
            video_min_timeout_ms: default_video_min_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            max_attempts: default_max_attempts(),
            photo_backoff_base_ms: default_photo_backoff_base_ms(),
            video_backoff_base_ms: default_video_backoff_base_ms(),
            max_redirects: default_max_redirects(),
            coalesce_bytes: default_coalesce_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_base_timeout_ms() -> u64 {
    30_000
}

fn default_per_mb_timeout_ms() -> u64 {
    2_000
}

fn default_photo_min_timeout_ms() -> u64 {
    30_000
}

fn default_video_min_timeout_ms() -> u64 {
    120_000
}

fn default_max_timeout_ms() -> u64 {
    600_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_photo_backoff_base_ms() -> u64 {
    1_000
}

fn default_video_backoff_base_ms() -> u64 {
    2_000
}

fn default_max_redirects() -> u32 {
    5
}

fn default_coalesce_bytes() -> ByteSize {
    ByteSize::mib(8)
}

fn default_user_agent() -> String {
    concat!("bundlebox/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Archive encoder limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: ByteSize,
    #[serde(default = "default_max_name_bytes")]
    pub max_name_bytes: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_entry_bytes: default_max_entry_bytes(),
            max_name_bytes: default_max_name_bytes(),
        }
    }
}

fn default_max_entry_bytes() -> ByteSize {
    ByteSize::mib(500)
}

fn default_max_name_bytes() -> usize {
    200
}

/// Batch sizing for the orchestrator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    #[serde(default = "default_photo_batch_size")]
    pub photo_batch_size: usize,
    #[serde(default = "default_video_batch_size")]
    pub video_batch_size: usize,
    /// Entries at least this large yield to the runtime after encoding
    #[serde(default = "default_yield_after_bytes")]
    pub yield_after_bytes: ByteSize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            photo_batch_size: default_photo_batch_size(),
            video_batch_size: default_video_batch_size(),
            yield_after_bytes: default_yield_after_bytes(),
        }
    }
}

fn default_photo_batch_size() -> usize {
    10
}

fn default_video_batch_size() -> usize {
    2
}

fn default_yield_after_bytes() -> ByteSize {
    ByteSize::mib(32)
}

/// Admission guard configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: u32,
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl AdmissionConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            breaker_failure_threshold: default_breaker_failure_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_requests() -> usize {
    3
}

fn default_breaker_failure_threshold() -> u32 {
    3
}

fn default_breaker_cooldown_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Completion notification delivery
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyConfig {
    /// Relay endpoint; notices are only logged when unset
    pub webhook_url: Option<String>,
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: default_notify_timeout_ms(),
        }
    }
}

fn default_notify_timeout_ms() -> u64 {
    10_000
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Fallback filter when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
