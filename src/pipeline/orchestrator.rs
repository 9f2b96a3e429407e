use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::BufWriter;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::batch::{CollectionProfile, PlannedFile, Risk, assign_entry_names, plan_batches};
use crate::archive::{ArchiveEncoder, ArchiveError};
use crate::config::Config;
use crate::fetch::{AdaptiveFetcher, FailureCode, Fetch, FetchOutcome, FetchPolicy, FetchSetupError};
use crate::job::{FileFailure, Job};
use crate::notify::{self, JobNotice, NotifyError, Notifier};
use crate::observability::Metrics;
use crate::sink::{ArchiveSink, JobResult, ResultSink, SpooledArchive};
use crate::storage::{StorageClient, StorageError};

pub const NO_FILES_PROCESSED: &str = "no files could be processed";

type SpoolEncoder = ArchiveEncoder<BufWriter<File>>;

#[derive(Debug, Error)]
pub enum PipelineSetupError {
    #[error(transparent)]
    Fetch(#[from] FetchSetupError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Analyzing,
    Fetching,
    Encoding,
    Uploading,
    Notifying,
    Done,
    Failed,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobPhase::Analyzing => "analyzing",
            JobPhase::Fetching => "fetching",
            JobPhase::Encoding => "encoding",
            JobPhase::Uploading => "uploading",
            JobPhase::Notifying => "notifying",
            JobPhase::Done => "done",
            JobPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

fn advance(phase: &mut JobPhase, next: JobPhase) {
    info!(from = %phase, to = %next, "Job phase");
    *phase = next;
}

/// Terminal outcome of one run
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed(JobResult),
    Failed {
        processed: u64,
        failures: Vec<FileFailure>,
        reason: String,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_entry_bytes: u64,
    pub max_name_bytes: usize,
    pub photo_batch_size: usize,
    pub video_batch_size: usize,
    pub yield_after_bytes: u64,
    pub spool_dir: Option<PathBuf>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_entry_bytes: config.archive.max_entry_bytes.as_u64(),
            max_name_bytes: config.archive.max_name_bytes,
            photo_batch_size: config.batch.photo_batch_size,
            video_batch_size: config.batch.video_batch_size,
            yield_after_bytes: config.batch.yield_after_bytes.as_u64(),
            spool_dir: config.server.spool_dir.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Drives one job from analysis to its single notice.
///
/// Fetches run concurrently within a batch; everything that touches the
/// encoder or the failure list happens on the task calling [`run`](Self::run).
pub struct Orchestrator {
    fetcher: Arc<dyn Fetch>,
    sink: Arc<dyn ArchiveSink>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        sink: Arc<dyn ArchiveSink>,
        notifier: Arc<dyn Notifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            fetcher,
            sink,
            notifier,
            metrics: Arc::new(Metrics::new()),
            settings,
        }
    }

    /// Wire the HTTP fetcher, configured storage and notifier
    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> Result<Self, PipelineSetupError> {
        let policy = FetchPolicy::from_config(&config.fetch, &config.archive);
        let fetcher = AdaptiveFetcher::new(&config.fetch, policy)?;
        let storage = StorageClient::from_config(&config.storage)?;
        let sink = ResultSink::new(storage, config.storage.key_prefix.clone());
        let notifier = notify::from_config(&config.notify)?;

        Ok(Self::new(
            Arc::new(fetcher),
            Arc::new(sink),
            notifier,
            PipelineSettings::from_config(config),
        )
        .with_metrics(metrics))
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub async fn run(&self, job: Job) -> JobOutcome {
        let span = info_span!("job", job_id = %job.job_id, collection_id = %job.collection_id);
        self.execute(job).instrument(span).await
    }

    async fn execute(&self, job: Job) -> JobOutcome {
        let started = Instant::now();
        let mut phase = JobPhase::Analyzing;

        let profile = CollectionProfile::analyze(&job.entries);
        info!(
            files = profile.file_count,
            videos = profile.video_count,
            estimated = %profile.estimated_size().to_human_readable(),
            undeclared = profile.undeclared_count,
            risk = %profile.risk,
            "Collection analyzed"
        );
        let verbose = profile.risk == Risk::High;

        let planned = assign_entry_names(&job.entries, self.settings.max_name_bytes);
        let batches = plan_batches(
            planned,
            self.settings.photo_batch_size,
            self.settings.video_batch_size,
        );
        debug!(batches = batches.len(), "Batches planned");

        let spool = match self.open_spool() {
            Ok(file) => file,
            Err(e) => {
                error!(error = %e, "Spool file unavailable");
                let reason = format!("spool file unavailable: {e}");
                return self.fail(&job, &mut phase, 0, Vec::new(), reason).await;
            }
        };
        let mut encoder = ArchiveEncoder::new(BufWriter::new(spool), self.settings.max_entry_bytes);
        let mut failures = Vec::new();

        advance(&mut phase, JobPhase::Fetching);
        let batch_count = batches.len();
        for (index, batch) in batches.into_iter().enumerate() {
            debug!(batch = index + 1, of = batch_count, files = batch.len(), "Fetching batch");

            if let Err(e) = self
                .run_batch(batch, &mut encoder, &mut failures, verbose)
                .await
            {
                error!(error = %e, "Archive write failed");
                let processed = encoder.entry_count() as u64;
                let reason = format!("archive write failed: {e}");
                return self.fail(&job, &mut phase, processed, failures, reason).await;
            }
        }

        if encoder.entry_count() == 0 {
            let reason = NO_FILES_PROCESSED.to_string();
            return self.fail(&job, &mut phase, 0, failures, reason).await;
        }

        advance(&mut phase, JobPhase::Encoding);
        let processed = encoder.entry_count() as u64;
        let (writer, summary) = match encoder.finish().await {
            Ok(finished) => finished,
            Err(e) => {
                error!(error = %e, "Archive write failed");
                let reason = format!("archive write failed: {e}");
                return self.fail(&job, &mut phase, processed, failures, reason).await;
            }
        };

        advance(&mut phase, JobPhase::Uploading);
        let archive = SpooledArchive {
            file: writer.into_inner(),
            summary,
        };
        let result = match self
            .sink
            .deliver(&job, archive, failures.clone(), started)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Archive upload failed");
                let reason = format!("archive upload failed: {e}");
                return self.fail(&job, &mut phase, processed, failures, reason).await;
            }
        };

        advance(&mut phase, JobPhase::Notifying);
        self.send_notice(&job, &JobNotice::completed(&result)).await;
        advance(&mut phase, JobPhase::Done);

        self.metrics.job_completed(result.archive_bytes);
        info!(
            succeeded = result.succeeded,
            failed = result.failed,
            archive_bytes = result.archive_bytes,
            elapsed_ms = result.elapsed_ms,
            url = %result.download_url,
            "Job complete"
        );

        JobOutcome::Completed(result)
    }

    /// Fetch one batch concurrently and encode results as they complete
    async fn run_batch(
        &self,
        batch: Vec<PlannedFile>,
        encoder: &mut SpoolEncoder,
        failures: &mut Vec<FileFailure>,
        verbose: bool,
    ) -> Result<(), ArchiveError> {
        let mut tasks = JoinSet::new();
        // entry name -> display name, for tasks that never report back
        let mut pending: HashMap<String, String> = HashMap::with_capacity(batch.len());

        for planned in batch {
            pending.insert(planned.entry_name.clone(), planned.source.name.clone());
            let fetcher = Arc::clone(&self.fetcher);
            tasks.spawn(
                async move {
                    let outcome = fetcher.fetch(&planned.source).await;
                    (planned, outcome)
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            let (planned, outcome) = match joined {
                Ok(completed) => completed,
                Err(e) => {
                    warn!(error = %e, "Fetch task aborted");
                    continue;
                }
            };
            pending.remove(&planned.entry_name);

            match outcome {
                FetchOutcome::Succeeded(bytes) => {
                    self.encode(encoder, &planned, &bytes, failures, verbose)
                        .await?;
                }
                FetchOutcome::Failed(failure) => {
                    self.record_failure(failures, &planned.source.name, failure.reason());
                }
            }
        }

        for (_, name) in pending {
            self.record_failure(
                failures,
                &name,
                format!("{}: fetch task aborted", FailureCode::Internal),
            );
        }

        Ok(())
    }

    async fn encode(
        &self,
        encoder: &mut SpoolEncoder,
        planned: &PlannedFile,
        bytes: &Bytes,
        failures: &mut Vec<FileFailure>,
        verbose: bool,
    ) -> Result<(), ArchiveError> {
        match encoder.add_entry(&planned.entry_name, bytes).await {
            Ok(_) => {}
            Err(e @ ArchiveError::EntryTooLarge { .. }) => {
                self.record_failure(
                    failures,
                    &planned.source.name,
                    format!("{}: {e}", FailureCode::SizeLimit),
                );
                return Ok(());
            }
            Err(
                e @ (ArchiveError::EmptyName
                | ArchiveError::NameTooLong(_)
                | ArchiveError::DuplicateName(_)),
            ) => {
                self.record_failure(
                    failures,
                    &planned.source.name,
                    format!("{}: {e}", FailureCode::Internal),
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        self.metrics.file_fetched();
        if verbose {
            info!(name = %planned.entry_name, size = bytes.len(), "File archived");
        } else {
            debug!(name = %planned.entry_name, size = bytes.len(), "File archived");
        }

        if planned.is_video() || bytes.len() as u64 >= self.settings.yield_after_bytes {
            tokio::task::yield_now().await;
        }

        Ok(())
    }

    fn record_failure(&self, failures: &mut Vec<FileFailure>, name: &str, reason: String) {
        warn!(name, reason = %reason, "File skipped");
        self.metrics.file_failed();
        failures.push(FileFailure::new(name, reason));
    }

    fn open_spool(&self) -> std::io::Result<File> {
        let file = match &self.settings.spool_dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        Ok(File::from_std(file))
    }

    async fn fail(
        &self,
        job: &Job,
        phase: &mut JobPhase,
        processed: u64,
        failures: Vec<FileFailure>,
        reason: String,
    ) -> JobOutcome {
        advance(phase, JobPhase::Notifying);
        let notice = JobNotice::failed(&job.job_id, processed, failures.clone(), &reason);
        self.send_notice(job, &notice).await;
        advance(phase, JobPhase::Failed);

        self.metrics.job_failed();
        warn!(reason = %reason, failed = failures.len(), "Job failed");

        JobOutcome::Failed {
            processed,
            failures,
            reason,
        }
    }

    async fn send_notice(&self, job: &Job, notice: &JobNotice) {
        if let Err(e) = self.notifier.notify(&job.notify_target, notice).await {
            warn!(error = %e, "Notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchFailure;
    use crate::job::SourceFile;
    use crate::notify::NoticeOutcome;
    use crate::sink::SinkError;
    use async_trait::async_trait;
    use std::io::{Cursor, Read};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ORIGIN: &str = "https://cdn.example.com";

    #[derive(Default)]
    struct StubFetcher {
        bodies: HashMap<String, Vec<u8>>,
    }

    impl StubFetcher {
        fn serve(mut self, path: &str, body: &[u8]) -> Self {
            self.bodies.insert(format!("{ORIGIN}/{path}"), body.to_vec());
            self
        }
    }

    #[async_trait]
    impl Fetch for StubFetcher {
        async fn fetch(&self, file: &SourceFile) -> FetchOutcome {
            if file.origin.ends_with("/panic") {
                panic!("fetcher bug");
            }
            match self.bodies.get(&file.origin) {
                Some(body) => FetchOutcome::Succeeded(Bytes::from(body.clone())),
                None => {
                    warn!(origin = %file.origin, "Stub origin missing");
                    FetchOutcome::Failed(FetchFailure::new(
                        FailureCode::HttpStatus(404),
                        "HTTP 404: Not Found",
                    ))
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<(String, JobNotice)>>,
    }

    impl RecordingNotifier {
        fn single(&self) -> (String, JobNotice) {
            let notices = self.notices.lock().unwrap();
            assert_eq!(notices.len(), 1, "exactly one notice per job");
            notices[0].clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, target: &str, notice: &JobNotice) -> notify::Result<()> {
            self.notices
                .lock()
                .unwrap()
                .push((target.to_string(), notice.clone()));
            Ok(())
        }
    }

    /// Counts calls and optionally fails instead of storing
    struct CountingSink {
        inner: ResultSink,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSink {
        fn new(fail: bool) -> Self {
            Self {
                inner: ResultSink::new(StorageClient::in_memory(), "archives"),
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl ArchiveSink for CountingSink {
        async fn deliver(
            &self,
            job: &Job,
            archive: SpooledArchive,
            failures: Vec<FileFailure>,
            started: Instant,
        ) -> crate::sink::Result<JobResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SinkError::Spool(std::io::Error::other("bucket unreachable")));
            }
            self.inner.deliver(job, archive, failures, started).await
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        sink: Arc<CountingSink>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(fetcher: StubFetcher, failing_sink: bool) -> Harness {
        let sink = Arc::new(CountingSink::new(failing_sink));
        let notifier = Arc::new(RecordingNotifier::default());
        let settings = PipelineSettings {
            max_entry_bytes: 1024,
            max_name_bytes: 200,
            photo_batch_size: 3,
            video_batch_size: 2,
            yield_after_bytes: 512,
            spool_dir: None,
        };
        let orchestrator = Orchestrator::new(
            Arc::new(fetcher),
            sink.clone(),
            notifier.clone(),
            settings,
        );
        Harness {
            orchestrator,
            sink,
            notifier,
        }
    }

    fn job(paths: &[(&str, &str)]) -> Job {
        let entries = paths
            .iter()
            .map(|(name, path)| SourceFile::new(*name, format!("{ORIGIN}/{path}")))
            .collect();
        Job::new("job-1", "evt-1", "host@example.com", entries)
    }

    async fn stored_entries(sink: &CountingSink, key: &str) -> HashMap<String, Vec<u8>> {
        let bytes = sink.inner.storage().download(key).await.unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entries = HashMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            entries.insert(file.name().to_string(), content);
        }
        entries
    }

    #[tokio::test]
    async fn test_all_files_archived() {
        let fetcher = StubFetcher::default()
            .serve("a", b"photo-a")
            .serve("b", b"photo-b")
            .serve("c", b"clip-c")
            .serve("d", b"photo-d");
        let h = harness(fetcher, false);

        let outcome = h
            .orchestrator
            .run(job(&[
                ("IMG.jpg", "a"),
                ("IMG.jpg", "b"),
                ("party.mp4", "c"),
                ("cake.png", "d"),
            ]))
            .await;

        let JobOutcome::Completed(result) = outcome else {
            panic!("job should complete");
        };
        assert_eq!(result.succeeded, 4);
        assert_eq!(result.failed, 0);

        let entries = stored_entries(&h.sink, &result.storage_key).await;
        assert_eq!(entries.len(), 4);
        assert_eq!(entries["IMG.jpg"], b"photo-a");
        assert_eq!(entries["IMG_1.jpg"], b"photo-b");
        assert_eq!(entries["party.mp4"], b"clip-c");
        assert_eq!(entries["cake.png"], b"photo-d");

        let (target, notice) = h.notifier.single();
        assert_eq!(target, "host@example.com");
        assert!(notice.ok);
        assert_eq!(notice.outcome, NoticeOutcome::Complete);
        assert_eq!(notice.processed_count, 4);
        assert_eq!(notice.download_url.as_deref(), Some(result.download_url.as_str()));

        let metrics = h.orchestrator.metrics().snapshot();
        assert_eq!(metrics.jobs_completed, 1);
        assert_eq!(metrics.files_fetched, 4);
    }

    #[tokio::test]
    async fn test_partial_failure_still_succeeds() {
        let fetcher = StubFetcher::default().serve("a", b"ok").serve("c", b"ok too");
        let h = harness(fetcher, false);

        let outcome = h
            .orchestrator
            .run(job(&[("a.jpg", "a"), ("b.jpg", "missing"), ("c.jpg", "c")]))
            .await;
        assert!(outcome.is_success());

        let (_, notice) = h.notifier.single();
        assert!(notice.ok);
        assert_eq!(notice.outcome, NoticeOutcome::Partial);
        assert_eq!(notice.processed_count, 2);
        assert_eq!(notice.failed_count, 1);
        assert_eq!(notice.failures.len(), notice.failed_count);
        assert_eq!(notice.failures[0].name, "b.jpg");
        assert!(notice.failures[0].reason.starts_with("http_status"));
    }

    #[tokio::test]
    async fn test_zero_successes_never_reach_sink() {
        let h = harness(StubFetcher::default(), false);

        let outcome = h
            .orchestrator
            .run(job(&[("a.jpg", "gone-1"), ("b.jpg", "gone-2")]))
            .await;

        let JobOutcome::Failed { reason, failures, .. } = outcome else {
            panic!("job should fail");
        };
        assert_eq!(reason, NO_FILES_PROCESSED);
        assert_eq!(failures.len(), 2);
        assert_eq!(h.sink.calls.load(Ordering::SeqCst), 0);

        let (_, notice) = h.notifier.single();
        assert!(!notice.ok);
        assert_eq!(notice.outcome, NoticeOutcome::Failed);
        assert_eq!(notice.error_message.as_deref(), Some(NO_FILES_PROCESSED));
        assert_eq!(notice.failed_count, 2);
    }

    #[tokio::test]
    async fn test_empty_job_fails() {
        let h = harness(StubFetcher::default(), false);

        let outcome = h.orchestrator.run(job(&[])).await;

        assert!(!outcome.is_success());
        assert_eq!(h.sink.calls.load(Ordering::SeqCst), 0);
        assert!(!h.notifier.single().1.ok);
    }

    #[tokio::test]
    async fn test_sink_failure_is_fatal_and_notified() {
        let fetcher = StubFetcher::default().serve("a", b"ok");
        let h = harness(fetcher, true);

        let outcome = h.orchestrator.run(job(&[("a.jpg", "a")])).await;

        let JobOutcome::Failed { processed, reason, .. } = outcome else {
            panic!("upload failure must fail the job");
        };
        assert_eq!(processed, 1);
        assert!(reason.starts_with("archive upload failed"));
        assert_eq!(h.sink.calls.load(Ordering::SeqCst), 1);

        let (_, notice) = h.notifier.single();
        assert!(!notice.ok);
        assert!(notice.download_url.is_none());
    }

    #[tokio::test]
    async fn test_oversized_payload_recorded_as_size_limit() {
        let fetcher = StubFetcher::default()
            .serve("small", b"fits")
            .serve("big", &[0u8; 2048]);
        let h = harness(fetcher, false);

        let outcome = h
            .orchestrator
            .run(job(&[("small.jpg", "small"), ("big.mov", "big")]))
            .await;

        let JobOutcome::Completed(result) = outcome else {
            panic!("job should complete");
        };
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].name, "big.mov");
        assert!(result.failures[0].reason.contains("exceeds size limit"));
        assert!(result.failures[0].reason.starts_with("size_limit"));
    }

    #[tokio::test]
    async fn test_panicking_fetch_becomes_file_failure() {
        let fetcher = StubFetcher::default().serve("a", b"ok");
        let h = harness(fetcher, false);

        let outcome = h
            .orchestrator
            .run(job(&[("a.jpg", "a"), ("boom.jpg", "panic")]))
            .await;

        let JobOutcome::Completed(result) = outcome else {
            panic!("job should complete");
        };
        assert_eq!(result.succeeded, 1);
        assert_eq!(
            result.failures,
            vec![FileFailure::new("boom.jpg", "internal: fetch task aborted")]
        );
    }

    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fetch_task_logs_carry_job_id() {
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let fetcher = StubFetcher::default().serve("a", b"ok");
        let h = harness(fetcher, false);
        let outcome = h
            .orchestrator
            .run(job(&[("a.jpg", "a"), ("gone.jpg", "gone")]))
            .await;
        assert!(matches!(outcome, JobOutcome::Completed(_)));

        let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        let fetch_line = logs
            .lines()
            .find(|line| line.contains("Stub origin missing"))
            .expect("fetch task line captured");
        assert!(fetch_line.contains("job_id=job-1"), "{fetch_line}");
        assert!(fetch_line.contains("collection_id=evt-1"), "{fetch_line}");
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(JobPhase::Analyzing.to_string(), "analyzing");
        assert_eq!(
            serde_json::to_value(JobPhase::Uploading).unwrap(),
            serde_json::json!("uploading")
        );
    }
}
