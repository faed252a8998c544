use anyhow::{Result, Context, anyhow};
use log::{error, warn, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use indicatif::{ProgressBar, ProgressStyle, MultiProgress};
use tokio_util::sync::CancellationToken;

use crate::app_config::Config;
use crate::dispatcher::{FileDispatcher, FilePipeline, Job, JobStatus, UnitProgress};
use crate::extraction::{self, Extractor};
use crate::file_utils::FileManager;
use crate::providers::Provider;
use crate::providers::openai::OpenAI;
use crate::rendering::{DocumentRenderer, Renderer, TRANSLATED_HTML};
use crate::report::BatchReport;
use crate::translation::glossary::Glossary;
use crate::translation::outline::{OutlineGenerator, OutlineSettings};
use crate::translation::rate_limiter::RateLimiterSettings;
use crate::translation::scheduler::SchedulerSettings;

// @module: Application controller for batch document translation

/// Main application controller: scans the input, wires the collaborators and runs the batch
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Overrides of the collaborators built from the configuration
    provider: Option<Arc<dyn Provider>>,
    extractor: Option<Arc<dyn Extractor>>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self {
            config,
            provider: None,
            extractor: None,
            renderer: None,
        })
    }

    /// Use `provider` instead of the configured endpoint
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build jobs for every document under `input_path`.
    ///
    /// Returns the jobs to run and the files skipped because their output already exists.
    pub fn scan(&self, input_path: &Path, output_root: &Path, force_overwrite: bool) -> Result<(Vec<Job>, Vec<PathBuf>)> {
        if !input_path.exists() {
            return Err(anyhow!("Input path does not exist: {:?}", input_path));
        }

        let (root, files) = if input_path.is_file() {
            let root = input_path.parent().map(Path::to_path_buf).unwrap_or_default();
            (root, vec![input_path.to_path_buf()])
        } else {
            let files = FileManager::find_files(input_path, &self.config.extraction.extensions)?;
            (input_path.to_path_buf(), files)
        };

        if files.is_empty() {
            return Err(anyhow!(
                "No documents with extensions [{}] found in {:?}",
                self.config.extraction.extensions.join(", "),
                input_path
            ));
        }

        let mut jobs = Vec::new();
        let mut skipped = Vec::new();
        for file in files {
            let job = Job::from_scan(&root, &file);
            if !force_overwrite && FileManager::file_exists(job.output_dir(output_root).join(TRANSLATED_HTML)) {
                warn!("Skipping {}, translation already exists (use -f to force overwrite)", job.name());
                skipped.push(file);
                continue;
            }
            jobs.push(job);
        }
        Ok((jobs, skipped))
    }

    /// Run the batch, stopping early on Ctrl-C
    pub async fn run(&self, input_path: PathBuf, output_root: PathBuf, force_overwrite: bool) -> Result<BatchReport> {
        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        let signal_listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing in-flight work (press Ctrl-C again to force quit)");
                signal_token.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            }
        });

        let result = self.run_with_shutdown(input_path, output_root, force_overwrite, shutdown).await;
        signal_listener.abort();
        result
    }

    /// Run the batch; cancelling `shutdown` stops new jobs and new units
    pub async fn run_with_shutdown(
        &self,
        input_path: PathBuf,
        output_root: PathBuf,
        force_overwrite: bool,
        shutdown: CancellationToken,
    ) -> Result<BatchReport> {
        let (jobs, skipped) = self.scan(&input_path, &output_root, force_overwrite)?;
        FileManager::ensure_dir(&output_root)?;

        let glossary = Arc::new(
            Glossary::load_from_paths(&self.config.glossary.paths, self.config.glossary.whole_word_only)
                .context("Failed to load glossary")?,
        );
        let provider = match &self.provider {
            Some(provider) => Arc::clone(provider),
            None => Arc::new(OpenAI::from_config(&self.config.provider)) as Arc<dyn Provider>,
        };
        let extractor = self
            .extractor
            .clone()
            .unwrap_or_else(|| extraction::build_extractor(&self.config.extraction));
        let renderer = self
            .renderer
            .clone()
            .unwrap_or_else(|| Arc::new(DocumentRenderer::from_config(&self.config.output)) as Arc<dyn Renderer>);

        if jobs.is_empty() {
            info!("Nothing to do, {} files already translated", skipped.len());
            let mut report = BatchReport::new(0);
            report.skipped = skipped;
            return Ok(report);
        }

        if let Err(e) = provider.test_connection().await {
            warn!("Connection test with {} failed: {}", provider.name(), e);
        }

        info!(
            "🚀 docbatch: {} - {} ({} files, {} glossary terms)",
            provider.name(),
            self.config.provider.model,
            jobs.len(),
            glossary.len()
        );

        let multi_progress = MultiProgress::new();
        let files_pb = multi_progress.add(ProgressBar::new(jobs.len() as u64));
        files_pb.set_style(Self::progress_style(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg} {eta}",
        ));
        files_pb.set_message("Translating");
        let units_pb = multi_progress.add(ProgressBar::new_spinner());
        units_pb.enable_steady_tick(Duration::from_millis(200));

        let units_bar = units_pb.clone();
        let unit_progress: UnitProgress = Arc::new(move |name, finished, total| {
            units_bar.set_message(format!("{}: {}/{} units", name, finished, total));
        });

        let pipeline = FilePipeline::new(extractor, Arc::clone(&provider), renderer, glossary, output_root.clone())
            .with_scheduler_settings(SchedulerSettings::from_config(&self.config)?)
            .with_limiter_settings(RateLimiterSettings::from(&self.config.concurrency))
            .with_extraction_retries(self.config.extraction.retries, Duration::from_secs(1))
            .with_shutdown(shutdown)
            .with_unit_progress(unit_progress);
        let pipeline = if self.config.outline.enabled {
            pipeline.with_outline(OutlineGenerator::new(
                Arc::clone(&provider),
                OutlineSettings::from_config(&self.config)?,
            ))
        } else {
            pipeline
        };
        let dispatcher = FileDispatcher::new(pipeline);

        let pb = files_pb.clone();
        let mut report = dispatcher
            .run_batch_with_progress(jobs, self.config.concurrency.max_file_concurrency, move |job| {
                pb.set_message(job.display_name());
                pb.inc(1);
            })
            .await;

        units_pb.finish_and_clear();
        files_pb.finish_with_message("Batch complete");
        report.skipped = skipped;

        for job in &report.jobs {
            match job.status {
                JobStatus::Succeeded => info!("{}", job.summary_line()),
                JobStatus::PartiallySucceeded => warn!("{}", job.summary_line()),
                _ => error!("{}", job.summary_line()),
            }
        }
        info!("{} - Duration: {}", report.summary(), Self::format_duration(Duration::from_secs_f64(report.duration_secs)));

        match report.write_json(&output_root) {
            Ok(path) => info!("Report written to {}", path.display()),
            Err(e) => warn!("Failed to write batch report: {:#}", e),
        }

        let context = format!(
            "{} - {} ({})",
            provider.name(),
            self.config.provider.model,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        match report.write_issues_log(&output_root, &context) {
            Ok(0) => {}
            Ok(count) => info!("{} problematic files listed in {}", count, crate::report::ISSUES_LOG_FILE),
            Err(e) => warn!("Failed to write issues log: {:#}", e),
        }

        Ok(report)
    }

    fn progress_style(template: &str) -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(template)
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░")
    }

    // Format duration in a human-readable format (HH:MM:SS)
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
