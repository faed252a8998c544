/*!
 * Structural analysis of a document before translation.
 *
 * One request per document asks the endpoint for the section outline: every heading with
 * a short summary and a few keywords. The outline is cached as `outline.json` in the job's
 * output folder and reused by later runs. Units then carry the summary and keywords of
 * their enclosing section into the translation prompt.
 *
 * The outline only enriches prompts. When it cannot be produced the file is translated
 * with heading context alone.
 */

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::Config;
use crate::errors::{FailureClass, ProviderError};
use crate::file_utils::FileManager;
use crate::language_utils;
use crate::providers::{CompletionRequest, Provider, RequestKind};
use crate::translation::document::{BlockKind, ExtractedDocument, TranslationUnit};
use crate::translation::prompts::build_outline_prompt;
use crate::translation::retry::RetryPolicy;

pub const OUTLINE_FILE: &str = "outline.json";

/// One section of a document outline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlineSection {
    #[serde(default)]
    pub level: u8,
    pub title: String,
    /// First and last page, when the source has pages
    #[serde(default)]
    pub pages: Vec<u32>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Section structure of a whole document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutline {
    #[serde(default)]
    pub document_type: String,
    #[serde(default)]
    pub structure: Vec<OutlineSection>,
}

impl DocumentOutline {
    /// Section whose title matches `title`, ignoring case, spacing and leading numbering
    pub fn section(&self, title: &str) -> Option<&OutlineSection> {
        let wanted = normalize_title(title);
        if wanted.is_empty() {
            return None;
        }
        self.structure.iter().find(|s| normalize_title(&s.title) == wanted)
    }

    /// Copy summaries and keywords into the context of every unit inside a known section.
    ///
    /// Returns the number of units annotated.
    pub fn annotate(&self, units: &mut [TranslationUnit]) -> usize {
        let mut annotated = 0;
        for unit in units.iter_mut() {
            let Some(section) = unit.context.section.as_deref().and_then(|title| self.section(title)) else {
                continue;
            };
            let summary = section.summary.trim();
            unit.context.section_summary = (!summary.is_empty()).then(|| summary.to_string());
            unit.context.keywords = section
                .keywords
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            annotated += 1;
        }
        annotated
    }
}

fn normalize_title(title: &str) -> String {
    title
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parse the model's answer, tolerating code fences and text around the JSON object
pub fn parse_outline(answer: &str) -> Result<DocumentOutline, ProviderError> {
    let trimmed = answer.trim();
    let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        return Err(ProviderError::ParseError("Outline answer contains no JSON object".to_string()));
    };
    if end < start {
        return Err(ProviderError::ParseError("Outline answer contains no JSON object".to_string()));
    }
    serde_json::from_str(&trimmed[start..=end])
        .map_err(|e| ProviderError::ParseError(format!("Invalid outline JSON: {}", e)))
}

/// Markdown-like digest of a document for the outline request.
///
/// Body text stops once `max_chars` is reached, headings are kept to the end.
pub fn document_digest(document: &ExtractedDocument, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut used = 0;

    for block in &document.blocks {
        let text = block.text.trim();
        if text.is_empty() {
            continue;
        }
        match block.kind {
            BlockKind::Heading { level } => {
                parts.push(format!("{} {}", "#".repeat(level.clamp(1, 6) as usize), text));
            }
            BlockKind::Paragraph | BlockKind::ListItem | BlockKind::Caption => {
                let remaining = max_chars.saturating_sub(used);
                if remaining == 0 {
                    continue;
                }
                let excerpt: String = text.chars().take(remaining).collect();
                used += excerpt.chars().count();
                parts.push(excerpt);
            }
            BlockKind::Table | BlockKind::Code | BlockKind::Image => {}
        }
    }
    parts.join("\n\n")
}

/// Settings of the outline step
#[derive(Debug, Clone)]
pub struct OutlineSettings {
    /// Source language display name
    pub source_language: String,
    /// Language of the summaries
    pub target_language: String,
    pub system_prompt: String,
    pub max_input_chars: usize,
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
}

impl OutlineSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            source_language: language_utils::get_language_name(&config.source_language)?,
            target_language: language_utils::get_language_name(&config.target_language)?,
            system_prompt: config.provider.system_prompt.clone(),
            max_input_chars: config.outline.max_input_chars,
            call_timeout: config.provider.call_timeout(),
            retry: RetryPolicy::from(&config.retry),
        })
    }
}

impl Default for OutlineSettings {
    fn default() -> Self {
        Self {
            source_language: "English".to_string(),
            target_language: "Chinese".to_string(),
            system_prompt: String::new(),
            max_input_chars: 12_000,
            call_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

/// Builds document outlines through the translation endpoint
#[derive(Debug)]
pub struct OutlineGenerator {
    provider: Arc<dyn Provider>,
    settings: OutlineSettings,
}

impl OutlineGenerator {
    pub fn new(provider: Arc<dyn Provider>, settings: OutlineSettings) -> Self {
        Self { provider, settings }
    }

    /// Ask the endpoint for the outline; transient failures are retried
    pub async fn generate(&self, document: &ExtractedDocument) -> Result<DocumentOutline, ProviderError> {
        let digest = document_digest(document, self.settings.max_input_chars);
        if digest.trim().is_empty() {
            return Ok(DocumentOutline::default());
        }

        let request = CompletionRequest {
            kind: RequestKind::Outline,
            system_prompt: self.settings.system_prompt.clone(),
            prompt: build_outline_prompt(&self.settings.source_language, &self.settings.target_language, &digest),
            text: digest,
            target_language: self.settings.target_language.clone(),
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = match tokio::time::timeout(self.settings.call_timeout, self.provider.complete(request.clone())).await
            {
                Ok(response) => response.and_then(|r| parse_outline(&r.text)),
                Err(_) => Err(ProviderError::Timeout(self.settings.call_timeout)),
            };

            match result {
                Ok(outline) => return Ok(outline),
                Err(e) if e.classify() != FailureClass::Permanent && self.settings.retry.can_retry(attempts) => {
                    let delay = self.settings.retry.delay_for(attempts, &e);
                    debug!("Outline attempt {} failed ({}), retrying in {:?}", attempts, e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reuse `outline.json` from `output_dir`, or generate and cache it.
    ///
    /// Returns None when no outline could be produced.
    pub async fn load_or_generate(&self, document: &ExtractedDocument, output_dir: &Path) -> Option<DocumentOutline> {
        let path = output_dir.join(OUTLINE_FILE);
        if FileManager::file_exists(&path) {
            let cached = FileManager::read_to_string(&path)
                .and_then(|json| serde_json::from_str::<DocumentOutline>(&json).map_err(anyhow::Error::from));
            match cached {
                Ok(outline) => {
                    debug!("Loaded cached outline {:?} ({} sections)", path, outline.structure.len());
                    return Some(outline);
                }
                Err(e) => warn!("Ignoring unreadable outline {:?}: {:#}", path, e),
            }
        }

        let outline = match self.generate(document).await {
            Ok(outline) => outline,
            Err(e) => {
                warn!("Outline of {:?} failed, translating with headings only: {}", output_dir, e);
                return None;
            }
        };
        info!("Outline generated: {} sections", outline.structure.len());

        let saved = serde_json::to_string_pretty(&outline)
            .map_err(anyhow::Error::from)
            .and_then(|json| FileManager::write_to_file(&path, &json));
        if let Err(e) = saved {
            warn!("Could not cache outline at {:?}: {:#}", path, e);
        }
        Some(outline)
    }
}
