/*!
 * Integration tests for file-level dispatch with scripted collaborators
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use docbatch::dispatcher::{FileDispatcher, FilePipeline, Job, JobStatus};
use docbatch::providers::mock::MockProvider;
use docbatch::rendering::{DocumentRenderer, Renderer};
use docbatch::translation::{RateLimiterSettings, RetryPolicy, SchedulerSettings};
use tokio_util::sync::CancellationToken;

use crate::common::create_temp_dir;
use crate::common::empty_glossary;
use crate::common::mock_collaborators::{BrokenRenderer, FlakyFormatRenderer, ScriptedExtractor};

fn pipeline(
    extractor: ScriptedExtractor,
    provider: MockProvider,
    renderer: Arc<dyn Renderer>,
    output_root: &std::path::Path,
) -> FilePipeline {
    FilePipeline::new(Arc::new(extractor), Arc::new(provider), renderer, empty_glossary(), output_root)
        .with_scheduler_settings(SchedulerSettings {
            retry: RetryPolicy::immediate(2),
            ..SchedulerSettings::default()
        })
        .with_limiter_settings(RateLimiterSettings {
            initial_workers: 3,
            max_workers: 6,
            ..RateLimiterSettings::default()
        })
        .with_extraction_retries(0, Duration::from_millis(1))
}

fn jobs(names: &[&str]) -> Vec<Job> {
    names
        .iter()
        .map(|name| Job::new(format!("/in/papers/{}.pdf", name), "papers"))
        .collect()
}

#[tokio::test]
async fn test_runBatch_fatalFile_shouldNotAffectOthers() {
    let dir = create_temp_dir().unwrap();
    let extractor = ScriptedExtractor::new(4);
    let dispatcher = FileDispatcher::new(pipeline(
        extractor.clone(),
        MockProvider::working(),
        Arc::new(DocumentRenderer::html_only()),
        dir.path(),
    ));

    let report = dispatcher
        .run_batch(jobs(&["alpha", "fatal_scan", "beta", "gamma", "delta"]), 2)
        .await;

    assert_eq!(report.total_jobs, 5);
    assert_eq!(report.succeeded, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(extractor.calls(), 5);

    let failed = report.jobs.iter().find(|j| j.status == JobStatus::Failed).unwrap();
    assert!(failed.source_path.ends_with("fatal_scan.pdf"));
    assert!(failed.cause.as_deref().unwrap().contains("corrupt document"));
    assert!(failed.limiter.is_none());

    for job in report.jobs.iter().filter(|j| j.status == JobStatus::Succeeded) {
        assert_eq!(job.units_total, 5);
        assert!(job.artifacts.iter().all(|a| a.exists()));
    }
    assert!(dir.path().join("papers").join("alpha").join("translated.html").exists());
}

#[tokio::test]
async fn test_runBatch_flakyExtraction_shouldRecoverWithRetry() {
    let dir = create_temp_dir().unwrap();
    let extractor = ScriptedExtractor::new(2);
    let pipeline = pipeline(
        extractor.clone(),
        MockProvider::working(),
        Arc::new(FlakyFormatRenderer),
        dir.path(),
    )
    .with_extraction_retries(1, Duration::from_millis(1));

    let report = FileDispatcher::new(pipeline).run_batch(jobs(&["flaky_one"]), 1).await;

    assert_eq!(extractor.calls(), 2);
    let job = &report.jobs[0];
    assert_ne!(job.status, JobStatus::Failed);
    assert_eq!(job.units_total, 3);
}

#[tokio::test]
async fn test_runBatch_formatFailure_shouldBePartialSuccess() {
    let dir = create_temp_dir().unwrap();
    let dispatcher = FileDispatcher::new(pipeline(
        ScriptedExtractor::new(2),
        MockProvider::working(),
        Arc::new(FlakyFormatRenderer),
        dir.path(),
    ));

    let report = dispatcher.run_batch(jobs(&["one", "two"]), 2).await;

    assert_eq!(report.partially_succeeded, 2);
    for job in &report.jobs {
        assert_eq!(job.units_failed, 0);
        assert!(job.cause.as_deref().unwrap().contains("output format"));
        assert!(job.issues.iter().any(|i| i.contains("no browser")));
    }
}

#[tokio::test]
async fn test_runBatch_rendererError_shouldFailJobButKeepCounters() {
    let dir = create_temp_dir().unwrap();
    let dispatcher = FileDispatcher::new(pipeline(
        ScriptedExtractor::new(2),
        MockProvider::working(),
        Arc::new(BrokenRenderer),
        dir.path(),
    ));

    let report = dispatcher.run_batch(jobs(&["one"]), 1).await;

    let job = &report.jobs[0];
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.cause.as_deref().unwrap().contains("disk full"));
    assert_eq!(job.limiter.unwrap().total_successes, 3);
}

#[tokio::test]
async fn test_runBatch_eachJobGetsOwnLimiter() {
    let dir = create_temp_dir().unwrap();
    // Every unit of "noisy" is rejected once before it succeeds
    let provider = MockProvider::rate_limited_first(3);
    let dispatcher = FileDispatcher::new(pipeline(
        ScriptedExtractor::new(2),
        provider,
        Arc::new(DocumentRenderer::html_only()),
        dir.path(),
    ));

    let report = dispatcher.run_batch(jobs(&["noisy"]), 1).await;
    let quiet = FileDispatcher::new(pipeline(
        ScriptedExtractor::new(2),
        MockProvider::working(),
        Arc::new(DocumentRenderer::html_only()),
        dir.path(),
    ))
    .run_batch(jobs(&["quiet"]), 1)
    .await;

    let noisy_stats = report.jobs[0].limiter.unwrap();
    let quiet_stats = quiet.jobs[0].limiter.unwrap();
    assert_eq!(noisy_stats.rate_limit_events, 3);
    assert_eq!(noisy_stats.current_workers, 1);
    assert_eq!(quiet_stats.rate_limit_events, 0);
    assert_eq!(quiet_stats.current_workers, 3);
}

#[tokio::test]
async fn test_runBatch_fileConcurrency_shouldBeBounded() {
    let dir = create_temp_dir().unwrap();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let seen: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));

    let (active_cb, peak_cb, seen_cb) = (Arc::clone(&active), Arc::clone(&peak), Arc::clone(&seen));
    let pipeline = pipeline(
        ScriptedExtractor::new(3),
        MockProvider::working().with_latency(|_| Duration::from_millis(5)),
        Arc::new(DocumentRenderer::html_only()),
        dir.path(),
    )
    .with_unit_progress(Arc::new(move |name: &str, finished: usize, total: usize| {
        let mut seen = seen_cb.lock().unwrap();
        if !seen.contains_key(name) {
            let now = active_cb.fetch_add(1, Ordering::SeqCst) + 1;
            peak_cb.fetch_max(now, Ordering::SeqCst);
        }
        seen.insert(name.to_string(), finished);
        if finished == total {
            active_cb.fetch_sub(1, Ordering::SeqCst);
        }
    }));

    let names: Vec<String> = (0..8).map(|i| format!("doc{}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut completed = Vec::new();
    let report = FileDispatcher::new(pipeline)
        .run_batch_with_progress(jobs(&refs), 3, |job| completed.push(job.display_name()))
        .await;

    assert_eq!(report.succeeded, 8);
    assert_eq!(completed.len(), 8);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(seen.lock().unwrap().len(), 8);
}

#[tokio::test]
async fn test_runBatch_cancelledBeforeStart_shouldNotExtract() {
    let dir = create_temp_dir().unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let extractor = ScriptedExtractor::new(2);
    let pipeline = pipeline(
        extractor.clone(),
        MockProvider::working(),
        Arc::new(DocumentRenderer::html_only()),
        dir.path(),
    )
    .with_shutdown(token);

    let report = FileDispatcher::new(pipeline).run_batch(jobs(&["a", "b", "c"]), 2).await;

    assert_eq!(report.failed, 3);
    assert_eq!(extractor.calls(), 0);
    assert!(report.jobs.iter().all(|j| j.cause.as_deref().unwrap().contains("shutdown")));
}
