/*!
 * Integration tests for per-file scheduling against scripted providers
 */

use std::sync::Arc;
use std::time::Duration;

use docbatch::providers::CompletionRequest;
use docbatch::providers::mock::MockProvider;
use docbatch::translation::{
    Glossary, RateLimiter, RateLimiterSettings, RetryPolicy, SchedulerSettings, TranslationScheduler, UnitStatus,
};
use tokio_util::sync::CancellationToken;

use crate::common::{empty_glossary, limiter, units};

fn scheduler(provider: MockProvider, retries: u32) -> TranslationScheduler {
    TranslationScheduler::new(
        Arc::new(provider),
        SchedulerSettings {
            retry: RetryPolicy::immediate(retries),
            ..SchedulerSettings::default()
        },
    )
}

// Longer texts come back sooner, so completion order is the reverse of input order
fn inverse_latency(request: &CompletionRequest) -> Duration {
    Duration::from_millis(200u64.saturating_sub(request.text.len() as u64 * 10))
}

#[tokio::test]
async fn test_outOfOrderCompletion_shouldKeepInputOrder() {
    let texts: Vec<String> = (1..=8).map(|i| "x".repeat(i)).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

    let result = scheduler(MockProvider::working().with_latency(inverse_latency), 0)
        .translate_all(units(&refs), limiter(8, 8), empty_glossary())
        .await;

    for (i, unit) in result.units.iter().enumerate() {
        assert_eq!(unit.id, i);
        assert_eq!(unit.final_text(), format!("[Chinese] {}", texts[i]));
    }
}

#[tokio::test]
async fn test_oneOfTenPermanentFailure_shouldKeepNineTranslations() {
    let texts: Vec<String> = (0..10).map(|i| format!("sentence number {}", i)).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let provider = MockProvider::working().with_permanent_failure_on("number 6");

    let result = scheduler(provider, 3)
        .translate_all(units(&refs), limiter(4, 8), empty_glossary())
        .await;

    assert!(!result.is_complete());
    assert_eq!(result.failed_count(), 1);
    let failed = &result.units[6];
    assert_eq!(failed.status, UnitStatus::Failed);
    assert_eq!(failed.final_text(), "sentence number 6");
    assert_eq!(failed.attempts, 1);
    for unit in result.units.iter().filter(|u| u.id != 6) {
        assert_eq!(unit.status, UnitStatus::Succeeded);
        assert_eq!(unit.final_text(), format!("[Chinese] {}", unit.original_text));
    }
    assert_eq!(result.issues().len(), 1);
}

#[tokio::test]
async fn test_repeatedRateLimits_shouldShrinkToMinimumAndStillFinish() {
    let texts: Vec<String> = (0..6).map(|i| format!("unit {}", i)).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let provider = MockProvider::rate_limited_first(4);
    let observer = provider.clone();

    let result = scheduler(provider, 10)
        .translate_all(units(&refs), limiter(16, 16), empty_glossary())
        .await;

    assert!(result.is_complete());
    assert_eq!(result.limiter.rate_limit_events, 4);
    assert_eq!(result.limiter.current_workers, 1);
    assert_eq!(observer.request_count(), 10);
}

#[tokio::test]
async fn test_healthyFile_shouldGrowPoolDuringTranslation() {
    let texts: Vec<String> = (0..60).map(|i| format!("unit {}", i)).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let limiter = Arc::new(RateLimiter::new(RateLimiterSettings {
        initial_workers: 2,
        min_workers: 1,
        max_workers: 10,
        increase_interval: Duration::ZERO,
        min_samples: 4,
        ..RateLimiterSettings::default()
    }));

    let result = scheduler(MockProvider::working().with_latency(|_| Duration::from_millis(5)), 0)
        .translate_all(units(&refs), limiter, empty_glossary())
        .await;

    assert!(result.is_complete());
    assert!(result.limiter.grow_events > 0);
    assert!(result.limiter.peak_workers > 2);
}

#[tokio::test]
async fn test_intermittentFailures_shouldBeRetried() {
    let texts: Vec<String> = (0..9).map(|i| format!("unit {}", i)).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

    let result = scheduler(MockProvider::intermittent(3), 2)
        .translate_all(units(&refs), limiter(1, 1), empty_glossary())
        .await;

    assert!(result.is_complete());
    assert_eq!(result.limiter.total_failures, 4);
    assert_eq!(result.limiter.rate_limit_events, 0);
}

#[tokio::test]
async fn test_emptyResponses_shouldExhaustRetries() {
    let result = scheduler(MockProvider::empty(), 1)
        .translate_all(units(&["text"]), limiter(1, 1), empty_glossary())
        .await;

    assert_eq!(result.units[0].attempts, 2);
    assert!(result.units[0].is_failed());
}

#[tokio::test]
async fn test_callTimeout_shouldCountAsTransient() {
    let mut settings = SchedulerSettings {
        retry: RetryPolicy::immediate(1),
        ..SchedulerSettings::default()
    };
    settings.call_timeout = Duration::from_millis(20);

    let result = TranslationScheduler::new(Arc::new(MockProvider::slow(500)), settings)
        .translate_all(units(&["slow"]), limiter(1, 1), empty_glossary())
        .await;

    let unit = &result.units[0];
    assert!(unit.is_failed());
    assert_eq!(unit.attempts, 2);
    assert!(unit.error.as_deref().unwrap_or_default().contains("timed out"));
}

#[tokio::test]
async fn test_shutdownMidFile_shouldFinishInFlightAndFailRest() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    let texts: Vec<String> = (0..20).map(|i| format!("unit {}", i)).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let result = scheduler(MockProvider::working().with_latency(|_| Duration::from_millis(20)), 0)
        .with_shutdown(token)
        .translate_all(units(&refs), limiter(2, 2), empty_glossary())
        .await;

    assert!(result.interrupted);
    let succeeded = result.units.iter().filter(|u| u.status == UnitStatus::Succeeded).count();
    assert!(succeeded >= 2 && succeeded < 20);
    assert_eq!(succeeded + result.failed_count(), 20);
    assert!(
        result
            .units
            .iter()
            .filter(|u| u.is_failed())
            .all(|u| u.error.as_deref().unwrap_or_default().contains("shutdown"))
    );
}

#[tokio::test]
async fn test_glossaryAndLinks_shouldSurviveTranslation() {
    let glossary = Arc::new(Glossary::from_pairs([("heart", "心脏"), ("heart disease", "心脏病")], true));
    let result = scheduler(MockProvider::working(), 0)
        .translate_all(
            units(&["heart disease data: https://heart.org/stats", "the heart"]),
            limiter(2, 2),
            glossary,
        )
        .await;

    assert_eq!(result.units[0].final_text(), "[Chinese] 心脏病 data: https://heart.org/stats");
    assert_eq!(result.units[1].final_text(), "[Chinese] the 心脏");
}

#[test]
fn test_emptyFile_shouldFinishWithoutCalls() {
    let provider = MockProvider::working();
    let observer = provider.clone();

    let result = tokio_test::block_on(async {
        scheduler(provider, 0)
            .translate_all(units(&["", "   "]), limiter(2, 2), empty_glossary())
            .await
    });

    assert!(result.is_complete());
    assert_eq!(observer.request_count(), 0);
    assert_eq!(result.units[1].final_text(), "   ");
}

fn chatty_answer(request: &CompletionRequest) -> String {
    format!("译文：“{}”", request.text.replace("Hello", "你好"))
}

#[tokio::test]
async fn test_chattyModel_shouldBeCleanedBeforeRestoring() {
    let provider = MockProvider::working().with_custom_response(chatty_answer);

    let result = scheduler(provider, 0)
        .translate_all(units(&["Hello https://example.com/x"]), limiter(1, 1), empty_glossary())
        .await;

    assert_eq!(result.units[0].status, UnitStatus::Succeeded);
    assert_eq!(result.units[0].final_text(), "你好 https://example.com/x");
}
