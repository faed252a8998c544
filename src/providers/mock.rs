/*!
 * Mock provider implementations for testing.
 *
 * This module provides mock providers that simulate different endpoint behaviors:
 * - `MockProvider::working()` - Always succeeds, echoing the text with a target tag
 * - `MockProvider::rate_limited_first(n)` - Signals overload for the first n requests
 * - `MockProvider::intermittent(n)` - Every nth request fails with a 503
 * - `MockProvider::failing()` - Always fails with a 500
 * - `MockProvider::dropping_placeholders()` - Succeeds but loses placeholder tokens
 *
 * Texts containing a marker registered with `with_permanent_failure_on` always fail
 * with a 400, and `with_latency` lets a test choose the delay of every call.
 * Outline requests are answered with a fenced JSON outline built from the headings
 * of the document digest.
 */

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{CompletionRequest, CompletionResponse, Provider, RequestKind};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"⟦[^⟧]*⟧").unwrap());

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a proper translation
    Working,
    /// Returns 429 for the first `count` requests, then works
    RateLimitedFirst { count: usize },
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with a server error
    Failing,
    /// Succeeds but strips every placeholder token
    DropPlaceholders,
    /// Returns empty response
    Empty,
    /// Simulates slow response (for timeout testing)
    Slow { delay_ms: u64 },
}

/// Mock provider for testing translation behavior
#[derive(Debug)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter shared between clones
    request_count: Arc<AtomicUsize>,
    /// Calls currently in flight
    in_flight: Arc<AtomicUsize>,
    /// Highest number of simultaneous calls seen
    peak_in_flight: Arc<AtomicUsize>,
    /// Texts containing this marker fail permanently
    permanent_failure_marker: Option<String>,
    /// Per-call delay chosen by the test
    latency: Option<fn(&CompletionRequest) -> Duration>,
    /// Custom response generator (optional)
    custom_response: Option<fn(&CompletionRequest) -> String>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            permanent_failure_marker: None,
            latency: None,
            custom_response: None,
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a mock that rejects the first `count` requests as rate limited
    pub fn rate_limited_first(count: usize) -> Self {
        Self::new(MockBehavior::RateLimitedFirst { count })
    }

    /// Create an intermittently failing mock provider
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    /// Create a failing mock provider that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock that loses placeholders
    pub fn dropping_placeholders() -> Self {
        Self::new(MockBehavior::DropPlaceholders)
    }

    /// Create a mock that returns empty responses
    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Create a mock that waits before answering
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Fail permanently on any text containing `marker`
    pub fn with_permanent_failure_on(mut self, marker: impl Into<String>) -> Self {
        self.permanent_failure_marker = Some(marker.into());
        self
    }

    /// Delay each call by the duration the function returns
    pub fn with_latency(mut self, latency: fn(&CompletionRequest) -> Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Set a custom response generator
    pub fn with_custom_response(mut self, generator: fn(&CompletionRequest) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Requests received so far, across clones
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent calls observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// The translation the working mock produces for `text`
    pub fn translate_text(text: &str, target_language: &str) -> String {
        format!("[{}] {}", target_language, text)
    }

    /// The outline the working mock produces for a document digest: one section per
    /// Markdown heading, with a canned summary and the heading's words as keywords
    pub fn outline_for(digest: &str) -> String {
        let structure: Vec<serde_json::Value> = digest
            .lines()
            .filter_map(|line| {
                let level = line.chars().take_while(|c| *c == '#').count();
                let title = line[level..].trim();
                (level > 0 && !title.is_empty()).then(|| {
                    let keywords: Vec<String> = title.split_whitespace().take(3).map(str::to_lowercase).collect();
                    serde_json::json!({
                        "level": level,
                        "title": title,
                        "summary": format!("Summary of {}", title),
                        "keywords": keywords,
                    })
                })
            })
            .collect();
        let outline = serde_json::json!({ "document_type": "journal_article", "structure": structure });
        format!("```json\n{}\n```", outline)
    }

    fn respond(&self, request: &CompletionRequest) -> CompletionResponse {
        let text = match (self.custom_response, request.kind) {
            (Some(generator), _) => generator(request),
            (None, RequestKind::Outline) => Self::outline_for(&request.text),
            (None, RequestKind::Translation) => Self::translate_text(&request.text, &request.target_language),
        };
        CompletionResponse {
            prompt_tokens: Some(request.prompt.len() as u64),
            completion_tokens: Some(text.len() as u64 / 2),
            text,
        }
    }

    async fn answer(&self, count: usize, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency(&request)).await;
        }

        if let Some(marker) = &self.permanent_failure_marker {
            if request.text.contains(marker.as_str()) {
                return Err(ProviderError::ApiError {
                    status_code: 400,
                    message: format!("Simulated permanent failure for '{}'", marker),
                });
            }
        }

        match self.behavior {
            MockBehavior::Working => Ok(self.respond(&request)),

            MockBehavior::RateLimitedFirst { count: limit } => {
                if count < limit {
                    Err(ProviderError::RateLimitExceeded {
                        message: format!("Simulated 429 (request #{})", count + 1),
                        retry_after_secs: None,
                    })
                } else {
                    Ok(self.respond(&request))
                }
            }

            MockBehavior::Intermittent { fail_every } => {
                if fail_every > 0 && count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    Ok(self.respond(&request))
                }
            }

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::DropPlaceholders => {
                let mut response = self.respond(&request);
                response.text = PLACEHOLDER.replace_all(&response.text, "").into_owned();
                Ok(response)
            }

            MockBehavior::Empty => Ok(CompletionResponse {
                text: String::new(),
                prompt_tokens: Some(0),
                completion_tokens: Some(0),
            }),

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(self.respond(&request))
            }
        }
    }
}

impl Clone for MockProvider {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior,
            request_count: Arc::clone(&self.request_count),
            in_flight: Arc::clone(&self.in_flight),
            peak_in_flight: Arc::clone(&self.peak_in_flight),
            permanent_failure_marker: self.permanent_failure_marker.clone(),
            latency: self.latency,
            custom_response: self.custom_response,
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(active, Ordering::SeqCst);

        let result = self.answer(count, request).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::ConnectionError("Simulated outage".to_string())),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
