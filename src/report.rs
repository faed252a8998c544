use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dispatcher::{Job, JobStatus};
use crate::file_utils::FileManager;
use crate::translation::rate_limiter::RateLimiterStats;

// @module: Batch results and their persisted forms

pub const REPORT_FILE: &str = "batch_report.json";
pub const ISSUES_LOG_FILE: &str = "docbatch.issues.log";

// @struct: Terminal record of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub source_path: PathBuf,
    pub group_key: String,
    pub status: JobStatus,
    /// Why the job failed or is only partially translated
    pub cause: Option<String>,
    /// Unit and format level problems
    pub issues: Vec<String>,
    pub units_total: usize,
    pub units_failed: usize,
    pub units_degraded: usize,
    /// Counters of the job's rate limiter, absent when translation never started
    pub limiter: Option<RateLimiterStats>,
    pub artifacts: Vec<PathBuf>,
    pub duration_secs: f64,
}

impl JobReport {
    // @creates: Report for a job that produced no output
    pub fn failed(job: &Job, cause: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            source_path: job.source_path.clone(),
            group_key: job.group_key.clone(),
            status: JobStatus::Failed,
            cause: Some(cause.into()),
            issues: Vec::new(),
            units_total: 0,
            units_failed: 0,
            units_degraded: 0,
            limiter: None,
            artifacts: Vec::new(),
            duration_secs: elapsed.as_secs_f64(),
        }
    }

    // @returns: Path relative to the scan root
    pub fn display_name(&self) -> String {
        let file = self
            .source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.group_key.is_empty() {
            file
        } else {
            format!("{}/{}", self.group_key, file)
        }
    }

    // @returns: One human-readable line
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{}: {} ({} units, {:.1}s)",
            self.display_name(),
            self.status,
            self.units_total,
            self.duration_secs
        );
        if let Some(cause) = &self.cause {
            line.push_str(&format!(" - {}", cause));
        }
        line
    }
}

// @struct: Aggregate of every job in a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: String,
    pub total_jobs: usize,
    pub succeeded: usize,
    pub partially_succeeded: usize,
    pub failed: usize,
    /// Files not dispatched because their output already existed
    pub skipped: Vec<PathBuf>,
    pub duration_secs: f64,
    /// Jobs in the order they finished
    pub jobs: Vec<JobReport>,
}

impl BatchReport {
    pub fn new(total_jobs: usize) -> Self {
        Self {
            started_at: Local::now().to_rfc3339(),
            total_jobs,
            succeeded: 0,
            partially_succeeded: 0,
            failed: 0,
            skipped: Vec::new(),
            duration_secs: 0.0,
            jobs: Vec::with_capacity(total_jobs),
        }
    }

    // @updates: Counters with a terminal job
    pub fn push(&mut self, job: JobReport) {
        match job.status {
            JobStatus::Succeeded => self.succeeded += 1,
            JobStatus::PartiallySucceeded => self.partially_succeeded += 1,
            // A job reported as non-terminal never finished
            JobStatus::Failed | JobStatus::Pending | JobStatus::Running => self.failed += 1,
        }
        self.jobs.push(job);
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.duration_secs = elapsed.as_secs_f64();
    }

    pub fn has_problems(&self) -> bool {
        self.failed > 0 || self.partially_succeeded > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} jobs: {} succeeded, {} partially succeeded, {} failed, {} skipped in {:.1}s",
            self.total_jobs,
            self.succeeded,
            self.partially_succeeded,
            self.failed,
            self.skipped.len(),
            self.duration_secs
        )
    }

    // @writes: batch_report.json into the output root
    pub fn write_json(&self, output_root: &Path) -> Result<PathBuf> {
        let path = output_root.join(REPORT_FILE);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize batch report")?;
        FileManager::write_to_file(&path, &json)?;
        Ok(path)
    }

    // @writes: One entry per problematic job, with its issues indented below
    // @returns: Number of jobs written
    pub fn write_issues_log(&self, output_root: &Path, context: &str) -> Result<usize> {
        let problems: Vec<&JobReport> = self
            .jobs
            .iter()
            .filter(|j| j.status != JobStatus::Succeeded || !j.issues.is_empty())
            .collect();
        if problems.is_empty() {
            return Ok(0);
        }

        let path = output_root.join(ISSUES_LOG_FILE);
        FileManager::append_to_log_file(&path, &format!("=== {} ===", context))?;
        for job in &problems {
            let mut entry = job.summary_line();
            for issue in &job.issues {
                entry.push_str("\n    ");
                entry.push_str(issue);
            }
            FileManager::append_to_log_file(&path, &entry)?;
        }
        Ok(problems.len())
    }
}
