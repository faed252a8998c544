/*!
 * Per-file translation scheduler.
 *
 * All units of one file are translated through a pool of concurrent provider calls whose
 * size follows the file's [`RateLimiter`]. The pool is topped up every time a call
 * completes, so a resize takes effect at the next dispatch without draining in-flight
 * work. Units are stored by position and never reordered; concurrency only changes the
 * order in which they finish.
 *
 * A unit that keeps failing is marked failed with its original text as fallback. Nothing
 * that happens to a unit ends the file early, except the file deadline or a shutdown.
 */

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::app_config::Config;
use crate::errors::{FailureClass, ProviderError, TranslationError};
use crate::language_utils;
use crate::providers::{CompletionRequest, CompletionResponse, Provider, RequestKind};
use crate::translation::document::{TranslationUnit, UnitStatus};
use crate::translation::glossary::Glossary;
use crate::translation::prompts::{TranslationPromptBuilder, clean_output};
use crate::translation::protection::TerminologyProtector;
use crate::translation::rate_limiter::{RateLimiter, RateLimiterStats};
use crate::translation::retry::RetryPolicy;

/// Settings shared by every file's scheduler
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Source language display name, e.g. "English"
    pub source_language: String,
    /// Target language display name, e.g. "Chinese"
    pub target_language: String,
    pub system_prompt: String,
    /// Upper bound for one provider call
    pub call_timeout: Duration,
    /// Upper bound for the translation phase of one file
    pub file_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl SchedulerSettings {
    /// Build settings from the application configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            source_language: language_utils::get_language_name(&config.source_language)?,
            target_language: language_utils::get_language_name(&config.target_language)?,
            system_prompt: config.provider.system_prompt.clone(),
            call_timeout: config.provider.call_timeout(),
            file_timeout: config.concurrency.file_timeout(),
            retry: RetryPolicy::from(&config.retry),
        })
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            source_language: "English".to_string(),
            target_language: "Chinese".to_string(),
            system_prompt: String::new(),
            call_timeout: Duration::from_secs(120),
            file_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of translating one file
#[derive(Debug, Clone)]
pub struct FileTranslation {
    /// Units in original order
    pub units: Vec<TranslationUnit>,
    /// Counters of the file's rate limiter
    pub limiter: RateLimiterStats,
    /// The file deadline cut the translation short
    pub timed_out: bool,
    /// A shutdown stopped dispatching before every unit was sent
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl FileTranslation {
    pub fn failed_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_failed()).count()
    }

    pub fn degraded_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_degraded()).count()
    }

    /// True when no unit failed; degraded units still count as translated
    pub fn is_complete(&self) -> bool {
        self.failed_count() == 0
    }

    /// Human-readable causes of failed and degraded units
    pub fn issues(&self) -> Vec<String> {
        self.units
            .iter()
            .filter(|u| u.is_failed() || u.is_degraded())
            .map(|u| {
                let label = if u.is_failed() { "failed" } else { "degraded" };
                format!(
                    "unit {} {}: {}",
                    u.id,
                    label,
                    u.error.as_deref().unwrap_or("no detail")
                )
            })
            .collect()
    }
}

enum AttemptOutcome {
    Completed(Result<CompletionResponse, ProviderError>),
    /// Shutdown arrived while the attempt was still waiting out its back-off
    Abandoned,
}

struct Attempt {
    index: usize,
    outcome: AttemptOutcome,
}

/// Concurrent executor for the units of one file
pub struct TranslationScheduler {
    provider: Arc<dyn Provider>,
    settings: SchedulerSettings,
    shutdown: CancellationToken,
}

impl TranslationScheduler {
    /// Create a scheduler over a shared provider
    pub fn new(provider: Arc<dyn Provider>, settings: SchedulerSettings) -> Self {
        Self {
            provider,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop dispatching when `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Translate every unit of one file
    pub async fn translate_all(
        &self,
        units: Vec<TranslationUnit>,
        rate_limiter: Arc<RateLimiter>,
        glossary: Arc<Glossary>,
    ) -> FileTranslation {
        self.translate_all_with_progress(units, rate_limiter, glossary, |_, _| {})
            .await
    }

    /// Translate every unit, reporting `(finished, total)` after each unit reaches a final state
    pub async fn translate_all_with_progress(
        &self,
        mut units: Vec<TranslationUnit>,
        rate_limiter: Arc<RateLimiter>,
        glossary: Arc<Glossary>,
        progress_callback: impl Fn(usize, usize) + Send,
    ) -> FileTranslation {
        let start_time = Instant::now();
        let protector = TerminologyProtector::new(glossary);
        let total = units.len();
        let mut finished = 0;

        // Protect once per unit; retries reuse the same tokens
        let mut protected_texts = Vec::with_capacity(total);
        let mut pending: VecDeque<(usize, Duration)> = VecDeque::new();
        for (index, unit) in units.iter_mut().enumerate() {
            if unit.original_text.trim().is_empty() {
                unit.translated_text = Some(unit.original_text.clone());
                unit.status = UnitStatus::Succeeded;
                protected_texts.push(String::new());
                finished += 1;
                continue;
            }
            let protected = protector.protect(&unit.original_text);
            unit.spans = protected.spans;
            protected_texts.push(protected.text);
            pending.push_back((index, Duration::ZERO));
        }
        if finished > 0 {
            progress_callback(finished, total);
        }

        let deadline = self.settings.file_timeout;
        let deadline_sleep = async move {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline_sleep);

        let mut in_flight: FuturesUnordered<BoxFuture<'static, Attempt>> = FuturesUnordered::new();
        let mut timed_out = false;
        let mut shutdown_seen = self.shutdown.is_cancelled();

        loop {
            if !shutdown_seen {
                let target = rate_limiter.current_workers();
                while in_flight.len() < target {
                    let Some((index, delay)) = pending.pop_front() else {
                        break;
                    };
                    units[index].attempts += 1;
                    let request = self.request_for(&units[index], &protected_texts[index]);
                    in_flight.push(self.attempt(index, request, delay));
                }
            }

            if in_flight.is_empty() {
                break;
            }

            let attempt = tokio::select! {
                biased;
                _ = &mut deadline_sleep => {
                    timed_out = true;
                    break;
                }
                _ = self.shutdown.cancelled(), if !shutdown_seen => {
                    shutdown_seen = true;
                    info!("Shutdown requested, waiting for {} in-flight translation calls", in_flight.len());
                    continue;
                }
                Some(attempt) = in_flight.next() => attempt,
            };

            let index = attempt.index;
            let response = match attempt.outcome {
                AttemptOutcome::Completed(result) => result,
                AttemptOutcome::Abandoned => {
                    units[index].attempts -= 1;
                    pending.push_back((index, Duration::ZERO));
                    continue;
                }
            };

            let error = match response {
                Ok(response) => {
                    let cleaned = clean_output(&response.text);
                    if cleaned.is_empty() {
                        ProviderError::ParseError("Empty translation returned".to_string())
                    } else {
                        rate_limiter.on_success();
                        self.accept(&protector, &mut units[index], &cleaned);
                        finished += 1;
                        progress_callback(finished, total);
                        continue;
                    }
                }
                Err(error) => error,
            };

            // An empty answer is worth another try even though it parsed
            let class = match &error {
                ProviderError::ParseError(_) => FailureClass::Transient,
                other => other.classify(),
            };
            let unit = &mut units[index];
            match class {
                FailureClass::RateLimited => {
                    rate_limiter.on_rate_limit_error();
                }
                FailureClass::Transient | FailureClass::Permanent => rate_limiter.on_failure(),
            }

            if class != FailureClass::Permanent && self.settings.retry.can_retry(unit.attempts) {
                let delay = self.settings.retry.delay_for(unit.attempts, &error);
                debug!(
                    "Unit {} attempt {} failed ({}), retrying in {:?}",
                    unit.id, unit.attempts, error, delay
                );
                pending.push_back((index, delay));
                continue;
            }

            let cause = if class == FailureClass::Permanent {
                TranslationError::Provider(error)
            } else {
                TranslationError::RetriesExhausted {
                    attempts: unit.attempts,
                    last_error: error,
                }
            };
            warn!("Unit {} failed: {}", unit.id, cause);
            unit.fail(cause.to_string());
            finished += 1;
            progress_callback(finished, total);
        }

        // Dropping the pool cancels every outstanding call
        drop(in_flight);

        let leftover = if timed_out {
            let limit = self.settings.file_timeout.unwrap_or_default();
            error!("File translation timed out after {:?}", limit);
            TranslationError::Cancelled(format!("file translation timed out after {:?}", limit))
        } else {
            TranslationError::Cancelled("shutdown before the unit was translated".to_string())
        };
        let mut interrupted = false;
        for unit in units.iter_mut().filter(|u| u.status == UnitStatus::Pending) {
            interrupted = true;
            unit.fail(leftover.to_string());
        }

        FileTranslation {
            units,
            limiter: rate_limiter.stats(),
            timed_out,
            interrupted: interrupted && !timed_out,
            elapsed: start_time.elapsed(),
        }
    }

    fn request_for(&self, unit: &TranslationUnit, protected_text: &str) -> CompletionRequest {
        let prompt = TranslationPromptBuilder::new(&self.settings.source_language, &self.settings.target_language)
            .with_context(&unit.context)
            .build(protected_text);
        CompletionRequest {
            kind: RequestKind::Translation,
            system_prompt: self.settings.system_prompt.clone(),
            prompt,
            text: protected_text.to_string(),
            target_language: self.settings.target_language.clone(),
        }
    }

    fn attempt(&self, index: usize, request: CompletionRequest, delay: Duration) -> BoxFuture<'static, Attempt> {
        let provider = Arc::clone(&self.provider);
        let shutdown = self.shutdown.clone();
        let call_timeout = self.settings.call_timeout;

        Box::pin(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        return Attempt { index, outcome: AttemptOutcome::Abandoned };
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let result = match tokio::time::timeout(call_timeout, provider.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(call_timeout)),
            };
            Attempt {
                index,
                outcome: AttemptOutcome::Completed(result),
            }
        })
    }

    fn accept(&self, protector: &TerminologyProtector, unit: &mut TranslationUnit, translated: &str) {
        let restored = protector.restore(translated, &unit.spans);
        if restored.is_degraded() {
            let mismatches: Vec<String> = restored
                .missing
                .iter()
                .map(|token| TranslationError::ProtectionMismatch { token: token.clone() }.to_string())
                .collect();
            warn!("Unit {} degraded: {}", unit.id, mismatches.join("; "));
            unit.status = UnitStatus::Degraded;
            unit.error = Some(mismatches.join("; "));
        } else {
            unit.status = UnitStatus::Succeeded;
        }
        unit.translated_text = Some(restored.text);
    }
}
