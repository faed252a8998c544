/*!
 * Batch dispatcher.
 *
 * Every input file becomes a [`Job`]. Up to `concurrency_limit` jobs run at once, each as
 * its own Tokio task executing the full per-file pipeline:
 * extraction → outline → translation → rendering.
 *
 * A job owns everything it mutates, including its own [`RateLimiter`]. The only state
 * shared between jobs is read-only (provider client, glossary, settings). A job that
 * fails or panics is recorded in the report; the batch always runs to the end.
 */

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::errors::PipelineError;
use crate::extraction::Extractor;
use crate::file_utils::FileManager;
use crate::providers::Provider;
use crate::rendering::Renderer;
use crate::report::{BatchReport, JobReport};
use crate::translation::document::{ExtractedDocument, TranslatedDocument};
use crate::translation::glossary::Glossary;
use crate::translation::outline::{DocumentOutline, OutlineGenerator};
use crate::translation::rate_limiter::{RateLimiter, RateLimiterSettings};
use crate::translation::scheduler::{SchedulerSettings, TranslationScheduler};

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    /// Output was produced, but some units or formats are missing their translation
    PartiallySucceeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PartiallySucceeded | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::PartiallySucceeded => "partially_succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// One input file
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub source_path: PathBuf,
    /// Folder of the file relative to the scan root, mirrored in the output
    pub group_key: String,
    pub status: JobStatus,
    pub error: Option<String>,
}

impl Job {
    pub fn new(source_path: impl Into<PathBuf>, group_key: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            group_key: group_key.into(),
            status: JobStatus::Pending,
            error: None,
        }
    }

    /// Job for a file found under `root`
    pub fn from_scan(root: &Path, source_path: &Path) -> Self {
        Self::new(source_path, FileManager::group_key(root, source_path))
    }

    /// File name for logs
    pub fn name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source_path.to_string_lossy().to_string())
    }

    /// Output folder, derived only from the group key and the file stem
    pub fn output_dir(&self, output_root: &Path) -> PathBuf {
        FileManager::job_output_dir(output_root, &self.group_key, &self.source_path)
    }
}

/// Callback receiving `(file name, finished units, total units)`
pub type UnitProgress = Arc<dyn Fn(&str, usize, usize) + Send + Sync>;

/// The per-file pipeline run by every job
pub struct FilePipeline {
    extractor: Arc<dyn Extractor>,
    provider: Arc<dyn Provider>,
    renderer: Arc<dyn Renderer>,
    glossary: Arc<Glossary>,
    outline: Option<Arc<OutlineGenerator>>,
    scheduler_settings: SchedulerSettings,
    limiter_settings: RateLimiterSettings,
    output_root: PathBuf,
    extraction_retries: u32,
    extraction_retry_delay: Duration,
    shutdown: CancellationToken,
    unit_progress: Option<UnitProgress>,
}

impl FilePipeline {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        provider: Arc<dyn Provider>,
        renderer: Arc<dyn Renderer>,
        glossary: Arc<Glossary>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            extractor,
            provider,
            renderer,
            glossary,
            outline: None,
            scheduler_settings: SchedulerSettings::default(),
            limiter_settings: RateLimiterSettings::default(),
            output_root: output_root.into(),
            extraction_retries: 2,
            extraction_retry_delay: Duration::from_secs(1),
            shutdown: CancellationToken::new(),
            unit_progress: None,
        }
    }

    pub fn with_scheduler_settings(mut self, settings: SchedulerSettings) -> Self {
        self.scheduler_settings = settings;
        self
    }

    /// Settings for the rate limiter each job creates
    pub fn with_limiter_settings(mut self, settings: RateLimiterSettings) -> Self {
        self.limiter_settings = settings;
        self
    }

    /// Analyze each document's sections before translating it
    pub fn with_outline(mut self, generator: OutlineGenerator) -> Self {
        self.outline = Some(Arc::new(generator));
        self
    }

    /// Extra extraction attempts and the pause between them
    pub fn with_extraction_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.extraction_retries = retries;
        self.extraction_retry_delay = delay;
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn with_unit_progress(mut self, progress: UnitProgress) -> Self {
        self.unit_progress = Some(progress);
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Run one job to a terminal state; never returns an error
    pub async fn run(&self, mut job: Job) -> JobReport {
        let start_time = Instant::now();
        job.status = JobStatus::Running;
        let name = job.name();
        info!("Processing {}", name);

        let document = match self.extract_with_retries(&job.source_path).await {
            Ok(document) => document,
            Err(e) => {
                error!("{}: {}", name, e);
                return JobReport::failed(&job, e.to_string(), start_time.elapsed());
            }
        };

        let output_dir = job.output_dir(&self.output_root);
        let mut units = document.translation_units();
        debug!("{}: {} blocks, {} translation units", name, document.blocks.len(), units.len());

        if let Some(outline) = self.outline_for(&document, &output_dir).await {
            let annotated = outline.annotate(&mut units);
            debug!("{}: outline context for {} of {} units", name, annotated, units.len());
        }

        // One limiter per file, never shared with other jobs
        let rate_limiter = Arc::new(RateLimiter::new(self.limiter_settings.clone()).with_label(name.clone()));
        let scheduler = TranslationScheduler::new(Arc::clone(&self.provider), self.scheduler_settings.clone())
            .with_shutdown(self.shutdown.clone());

        let progress = self.unit_progress.clone();
        let progress_name = name.clone();
        let translation = scheduler
            .translate_all_with_progress(units, rate_limiter, Arc::clone(&self.glossary), move |finished, total| {
                if let Some(progress) = &progress {
                    progress(&progress_name, finished, total);
                }
            })
            .await;

        let units_total = translation.units.len();
        let mut issues = translation.issues();
        let limiter = translation.limiter;
        let failed_units = translation.failed_count();
        let degraded_units = translation.degraded_count();

        let translated = TranslatedDocument {
            source_path: job.source_path.clone(),
            document,
            units: translation.units,
        };

        let rendered = match self.render(&translated, &output_dir).await {
            Ok(rendered) => rendered,
            Err(e) => {
                error!("{}: {}", name, e);
                let mut report = JobReport::failed(&job, e.to_string(), start_time.elapsed());
                report.issues = issues;
                report.limiter = Some(limiter);
                return report;
            }
        };
        issues.extend(rendered.failures.iter().cloned());

        let mut causes = Vec::new();
        if translation.timed_out {
            causes.push("file translation timed out".to_string());
        } else if translation.interrupted {
            causes.push("interrupted by shutdown".to_string());
        }
        if failed_units > 0 {
            causes.push(format!("{} of {} units failed", failed_units, units_total));
        }
        if !rendered.failures.is_empty() {
            causes.push(format!("{} output format(s) failed", rendered.failures.len()));
        }

        job.status = if causes.is_empty() {
            JobStatus::Succeeded
        } else {
            JobStatus::PartiallySucceeded
        };
        job.error = (!causes.is_empty()).then(|| causes.join("; "));

        if degraded_units > 0 {
            warn!("{}: {} units kept unresolved placeholders", name, degraded_units);
        }

        let report = JobReport {
            source_path: job.source_path.clone(),
            group_key: job.group_key.clone(),
            status: job.status,
            cause: job.error.clone(),
            issues,
            units_total,
            units_failed: failed_units,
            units_degraded: degraded_units,
            limiter: Some(limiter),
            artifacts: rendered.artifacts,
            duration_secs: start_time.elapsed().as_secs_f64(),
        };
        info!("{}", report.summary_line());
        report
    }

    async fn outline_for(&self, document: &ExtractedDocument, output_dir: &Path) -> Option<DocumentOutline> {
        let generator = self.outline.as_ref()?;
        if self.shutdown.is_cancelled() {
            return None;
        }
        generator.load_or_generate(document, output_dir).await
    }

    async fn extract_with_retries(&self, path: &Path) -> Result<ExtractedDocument, PipelineError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.extractor.extract(path).await {
                Ok(document) => return Ok(document),
                Err(e) if attempt <= self.extraction_retries && !self.shutdown.is_cancelled() => {
                    warn!(
                        "Extraction attempt {} of {:?} with {} failed: {}",
                        attempt,
                        path,
                        self.extractor.name(),
                        e
                    );
                    tokio::time::sleep(self.extraction_retry_delay * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn render(
        &self,
        document: &TranslatedDocument,
        output_dir: &Path,
    ) -> Result<crate::rendering::RenderOutput, PipelineError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| PipelineError::io(output_dir, e))?;
        self.renderer.render(document, output_dir).await
    }
}

/// Runs jobs in parallel and collects their reports
pub struct FileDispatcher {
    pipeline: Arc<FilePipeline>,
    shutdown: CancellationToken,
}

impl FileDispatcher {
    pub fn new(pipeline: FilePipeline) -> Self {
        let shutdown = pipeline.shutdown.clone();
        Self {
            pipeline: Arc::new(pipeline),
            shutdown,
        }
    }

    pub fn pipeline(&self) -> &FilePipeline {
        &self.pipeline
    }

    /// Run every job; the report lists jobs in the order they finished
    pub async fn run_batch(&self, jobs: Vec<Job>, concurrency_limit: usize) -> BatchReport {
        self.run_batch_with_progress(jobs, concurrency_limit, |_| {}).await
    }

    /// Run every job, calling `on_job_done` as each reaches a terminal state
    pub async fn run_batch_with_progress<F>(&self, jobs: Vec<Job>, concurrency_limit: usize, mut on_job_done: F) -> BatchReport
    where
        F: FnMut(&JobReport),
    {
        let start_time = Instant::now();
        let concurrency_limit = concurrency_limit.max(1);
        let mut report = BatchReport::new(jobs.len());
        info!("Dispatching {} jobs, {} at a time", jobs.len(), concurrency_limit);

        let mut finished = stream::iter(jobs.into_iter().map(|job| {
            let pipeline = Arc::clone(&self.pipeline);
            let shutdown = self.shutdown.clone();
            async move { Self::run_job(pipeline, shutdown, job).await }
        }))
        .buffer_unordered(concurrency_limit);

        while let Some(job_report) = finished.next().await {
            on_job_done(&job_report);
            report.push(job_report);
        }

        report.finish(start_time.elapsed());
        report
    }

    async fn run_job(pipeline: Arc<FilePipeline>, shutdown: CancellationToken, job: Job) -> JobReport {
        if shutdown.is_cancelled() {
            return JobReport::failed(&job, "Cancelled: shutdown before the job started", Duration::ZERO);
        }

        let start_time = Instant::now();
        let placeholder = job.clone();
        let handle = tokio::spawn(async move { pipeline.run(job).await });

        match handle.await {
            Ok(report) => report,
            Err(join_error) => {
                let cause = if join_error.is_panic() {
                    let payload = join_error.into_panic();
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    PipelineError::WorkerAborted(format!("panicked: {}", message))
                } else {
                    PipelineError::WorkerAborted("task was cancelled".to_string())
                };
                error!("{}: {}", placeholder.name(), cause);
                JobReport::failed(&placeholder, cause.to_string(), start_time.elapsed())
            }
        }
    }
}
