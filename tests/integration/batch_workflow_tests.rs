/*!
 * End-to-end batch runs through the controller with a mock provider
 */

use std::fs;
use std::path::Path;
use std::sync::Arc;

use docbatch::app_config::Config;
use docbatch::app_controller::Controller;
use docbatch::dispatcher::JobStatus;
use docbatch::providers::mock::MockProvider;
use docbatch::providers::{CompletionRequest, RequestKind};
use docbatch::rendering::DocumentRenderer;
use docbatch::report::{ISSUES_LOG_FILE, REPORT_FILE};
use docbatch::translation::outline::OUTLINE_FILE;
use tokio_util::sync::CancellationToken;

use crate::common::{
    SAMPLE_GLOSSARY_CSV, SAMPLE_MARKDOWN, create_temp_dir, create_test_file, init_test_logging, test_config,
};

fn controller(config: Config, provider: MockProvider) -> Controller {
    init_test_logging();
    Controller::with_config(config)
        .unwrap()
        .with_provider(Arc::new(provider))
        .with_renderer(Arc::new(DocumentRenderer::html_only()))
}

fn seed_input(root: &Path) {
    create_test_file(root, "overview.md", SAMPLE_MARKDOWN).unwrap();
    create_test_file(root, "cardiology/notes.txt", "Heart rate.\n\nObesity is common.\n").unwrap();
    create_test_file(root, "cardiology/ignored.csv", "a,b\n").unwrap();
}

#[tokio::test]
async fn test_run_nestedFolder_shouldMirrorGroupsAndWriteReport() {
    let dir = create_temp_dir().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    seed_input(&input);
    let glossary = create_test_file(dir.path(), "terms.csv", SAMPLE_GLOSSARY_CSV).unwrap();

    let mut config = test_config();
    config.glossary.paths = vec![glossary];

    let report = controller(config, MockProvider::working())
        .run_with_shutdown(input.clone(), output.clone(), false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.total_jobs, 2);
    assert_eq!(report.succeeded, 2);
    assert!(!report.has_problems());

    let overview = fs::read_to_string(output.join("overview").join("translated.html")).unwrap();
    assert!(overview.contains("[Chinese]"));
    assert!(overview.contains("肥胖"));
    assert!(overview.contains("https://www.who.int/news-room/fact-sheets"));
    assert!(overview.contains("doi:10.1000/182"));
    assert!(overview.contains("bmi = weight / height^2"));

    let original = fs::read_to_string(output.join("overview").join("original.html")).unwrap();
    assert!(!original.contains("[Chinese]"));

    let notes = fs::read_to_string(output.join("cardiology").join("notes").join("translated.html")).unwrap();
    assert!(notes.contains("[Chinese] 肥胖 is common."));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.join(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(json["total_jobs"], 2);
    assert_eq!(json["jobs"].as_array().unwrap().len(), 2);
    assert_eq!(json["jobs"][0]["status"], "succeeded");
    assert!(!output.join(ISSUES_LOG_FILE).exists());
}

#[tokio::test]
async fn test_run_secondRun_shouldSkipUnlessForced() {
    let dir = create_temp_dir().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    seed_input(&input);

    let provider = MockProvider::working();
    let counter = provider.clone();
    let controller = controller(test_config(), provider);

    controller
        .run_with_shutdown(input.clone(), output.clone(), false, CancellationToken::new())
        .await
        .unwrap();
    let first_requests = counter.request_count();
    assert!(first_requests > 0);

    let second = controller
        .run_with_shutdown(input.clone(), output.clone(), false, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.total_jobs, 0);
    assert_eq!(second.skipped.len(), 2);
    assert_eq!(counter.request_count(), first_requests);

    let forced = controller
        .run_with_shutdown(input, output, true, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(forced.succeeded, 2);
    assert_eq!(counter.request_count(), first_requests * 2);
}

#[tokio::test]
async fn test_run_unitFailure_shouldReportPartialSuccessAndLogIssues() {
    let dir = create_temp_dir().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    create_test_file(&input, "a.md", "First paragraph.\n\nSecond POISON paragraph.\n").unwrap();
    create_test_file(&input, "b.md", "Clean text.\n").unwrap();

    let report = controller(test_config(), MockProvider::working().with_permanent_failure_on("POISON"))
        .run_with_shutdown(input, output.clone(), false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.partially_succeeded, 1);

    let partial = report
        .jobs
        .iter()
        .find(|j| j.status == JobStatus::PartiallySucceeded)
        .unwrap();
    assert_eq!(partial.units_failed, 1);

    // The failed unit falls back to its original text
    let translated = fs::read_to_string(output.join("a").join("translated.html")).unwrap();
    assert!(translated.contains("[Chinese] First paragraph."));
    assert!(translated.contains("Second POISON paragraph."));

    let log = fs::read_to_string(output.join(ISSUES_LOG_FILE)).unwrap();
    assert!(log.contains("a.md"));
    assert!(!log.contains("b.md"));
}

#[tokio::test]
async fn test_run_cancelledToken_shouldFailEveryJobWithoutCalls() {
    let dir = create_temp_dir().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    seed_input(&input);

    let provider = MockProvider::working();
    let counter = provider.clone();
    let token = CancellationToken::new();
    token.cancel();

    let report = controller(test_config(), provider)
        .run_with_shutdown(input, output.clone(), false, token)
        .await
        .unwrap();

    assert_eq!(report.failed, 2);
    assert_eq!(counter.request_count(), 0);
    assert!(output.join(REPORT_FILE).exists());
    assert!(!output.join("overview").join("translated.html").exists());
}

#[tokio::test]
async fn test_run_missingGlossary_shouldFailBeforeDispatch() {
    let dir = create_temp_dir().unwrap();
    let input = dir.path().join("input");
    seed_input(&input);

    let mut config = test_config();
    config.glossary.paths = vec![dir.path().join("missing.csv")];

    let result = controller(config, MockProvider::working())
        .run_with_shutdown(input, dir.path().join("output"), false, CancellationToken::new())
        .await;

    assert!(result.is_err());
}

// Units whose prompt carries outline keywords are tagged so the output shows it
fn outline_aware(request: &CompletionRequest) -> String {
    match request.kind {
        RequestKind::Outline => MockProvider::outline_for(&request.text),
        RequestKind::Translation if request.prompt.contains("Keywords: methods") => {
            format!("[outlined] {}", request.text)
        }
        RequestKind::Translation => MockProvider::translate_text(&request.text, &request.target_language),
    }
}

#[tokio::test]
async fn test_run_withOutline_shouldCacheOutlineAndFeedPrompts() {
    let dir = create_temp_dir().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    create_test_file(&input, "overview.md", SAMPLE_MARKDOWN).unwrap();

    let mut config = test_config();
    config.outline.enabled = true;
    let provider = MockProvider::working().with_custom_response(outline_aware);
    let counter = provider.clone();
    let controller = controller(config, provider);

    let report = controller
        .run_with_shutdown(input.clone(), output.clone(), false, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.succeeded, 1);
    let units = report.jobs[0].units_total;
    assert_eq!(counter.request_count(), units + 1);

    let outline: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.join("overview").join(OUTLINE_FILE)).unwrap()).unwrap();
    assert_eq!(outline["structure"][1]["title"], "Methods");

    let translated = fs::read_to_string(output.join("overview").join("translated.html")).unwrap();
    assert!(translated.contains("[outlined] We followed"));
    assert!(translated.contains("[Chinese] Obesity raises the risk"));

    // A forced run reuses the cached outline
    controller
        .run_with_shutdown(input, output, true, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(counter.request_count(), units * 2 + 1);
}
