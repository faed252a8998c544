use anyhow::{anyhow, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Remote translation endpoint
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Two-tier concurrency settings
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Per-unit retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Content extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Terminology tables
    #[serde(default)]
    pub glossary: GlossaryConfig,

    /// Section outline fed into the translation prompts
    #[serde(default)]
    pub outline: OutlineConfig,

    /// Rendering settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// OpenAI-compatible chat completions endpoint
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Base URL; `/chat/completions` is appended
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API key sent as a bearer token
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum completion tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// System prompt sent with every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl ProviderConfig {
    /// Per-call timeout as a duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings for both scheduling tiers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConcurrencyConfig {
    /// Files processed in parallel (tier 1)
    #[serde(default = "default_max_file_concurrency")]
    pub max_file_concurrency: usize,

    /// Translation workers per file at start (tier 2)
    #[serde(default = "default_initial_workers")]
    pub initial_workers: usize,

    /// Upper bound for translation workers per file
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Lower bound for translation workers per file
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,

    /// Multiplier applied to the pool on a rate-limit signal
    #[serde(default = "default_backoff_factor")]
    pub rate_limit_backoff_factor: f64,

    /// Multiplier applied to the pool after a healthy window
    #[serde(default = "default_growth_factor")]
    pub rate_limit_growth_factor: f64,

    /// Success ratio that must be exceeded before growing
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f64,

    /// Minimum window length before growing, in seconds
    #[serde(default = "default_increase_interval_secs")]
    pub increase_interval_secs: u64,

    /// Minimum outcomes observed in a window before growing
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,

    /// Wall-clock limit for the translation phase of one file; 0 disables it
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_file_concurrency: default_max_file_concurrency(),
            initial_workers: default_initial_workers(),
            max_workers: default_max_workers(),
            min_workers: default_min_workers(),
            rate_limit_backoff_factor: default_backoff_factor(),
            rate_limit_growth_factor: default_growth_factor(),
            success_threshold: default_success_threshold(),
            increase_interval_secs: default_increase_interval_secs(),
            min_samples: default_min_samples(),
            file_timeout_secs: default_file_timeout_secs(),
        }
    }
}

impl ConcurrencyConfig {
    /// File-level deadline, if enabled
    pub fn file_timeout(&self) -> Option<Duration> {
        (self.file_timeout_secs > 0).then(|| Duration::from_secs(self.file_timeout_secs))
    }
}

/// Retry policy for a single translation unit
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for a single delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth base of the exponential back-off
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
        }
    }
}

/// Where document content comes from
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Read text and markdown files directly
    #[default]
    Local,
    /// Send files to an extraction service
    Service,
}

/// Content extraction settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Extraction backend
    #[serde(default)]
    pub mode: ExtractionMode,

    /// Extraction service URL (service mode only)
    #[serde(default = "String::new")]
    pub endpoint: String,

    /// Attempts after the first failed extraction
    #[serde(default = "default_extraction_retries")]
    pub retries: u32,

    /// Extraction request timeout in seconds
    #[serde(default = "default_extraction_timeout_secs")]
    pub timeout_secs: u64,

    /// File extensions picked up by the folder scan
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::default(),
            endpoint: String::new(),
            retries: default_extraction_retries(),
            timeout_secs: default_extraction_timeout_secs(),
            extensions: default_extensions(),
        }
    }
}

/// Terminology tables
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GlossaryConfig {
    /// CSV or TSV files with source and target columns
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Only match terms at word boundaries
    #[serde(default = "default_true")]
    pub whole_word_only: bool,
}

impl Default for GlossaryConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            whole_word_only: true,
        }
    }
}

/// Structural analysis run once per document before translation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutlineConfig {
    /// Ask the endpoint for section summaries and keywords
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Characters of document text sent with the outline request; headings are always sent
    #[serde(default = "default_outline_input_chars")]
    pub max_input_chars: usize,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_input_chars: default_outline_input_chars(),
        }
    }
}

/// Rendered output format
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Html,
    Pdf,
    Docx,
}

impl OutputFormat {
    /// File extension and folder name for this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Rendering settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    /// Formats to produce; HTML is always produced because the others derive from it
    #[serde(default = "default_formats")]
    pub formats: Vec<OutputFormat>,

    /// Command converting HTML to PDF; `{input}` and `{output}` are substituted
    #[serde(default = "default_pdf_command")]
    pub pdf_command: Vec<String>,

    /// Path to the pandoc binary used for DOCX
    #[serde(default = "default_pandoc_path")]
    pub pandoc_path: String,

    /// Timeout for each external tool invocation in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            pdf_command: default_pdf_command(),
            pandoc_path: default_pandoc_path(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_language() -> String {
    "zh".to_string()
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_system_prompt() -> String {
    "You are a professional translator of academic documents.".to_string()
}

fn default_max_file_concurrency() -> usize {
    4
}

fn default_initial_workers() -> usize {
    20
}

fn default_max_workers() -> usize {
    100
}

fn default_min_workers() -> usize {
    1
}

fn default_backoff_factor() -> f64 {
    0.5
}

fn default_growth_factor() -> f64 {
    1.2
}

fn default_success_threshold() -> f64 {
    0.95
}

fn default_increase_interval_secs() -> u64 {
    30
}

fn default_min_samples() -> u64 {
    20 // Avoid growing on a handful of lucky calls
}

fn default_file_timeout_secs() -> u64 {
    3600
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_exponential_base() -> f64 {
    2.0
}

fn default_extraction_retries() -> u32 {
    2
}

fn default_extraction_timeout_secs() -> u64 {
    300
}

fn default_extensions() -> Vec<String> {
    vec!["txt".to_string(), "md".to_string()]
}

fn default_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Html]
}

fn default_pdf_command() -> Vec<String> {
    vec![
        "chromium".to_string(),
        "--headless".to_string(),
        "--disable-gpu".to_string(),
        "--print-to-pdf={output}".to_string(),
        "{input}".to_string(),
    ]
}

fn default_pandoc_path() -> String {
    "pandoc".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    120
}

fn default_outline_input_chars() -> usize {
    12_000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        // Validate languages
        let _source_name = crate::language_utils::get_language_name(&self.source_language)?;
        let _target_name = crate::language_utils::get_language_name(&self.target_language)?;
        if crate::language_utils::language_codes_match(&self.source_language, &self.target_language) {
            warn!(
                "Source and target language are both '{}', documents will be rewritten in place",
                self.target_language
            );
        }

        Url::parse(&self.provider.endpoint)
            .map_err(|e| anyhow!("Invalid provider endpoint '{}': {}", self.provider.endpoint, e))?;

        if self.provider.api_key.is_empty() && !is_local_endpoint(&self.provider.endpoint) {
            return Err(anyhow!("Translation API key is required for remote endpoint {}", self.provider.endpoint));
        }

        let c = &self.concurrency;
        if c.max_file_concurrency == 0 {
            return Err(anyhow!("max_file_concurrency must be at least 1"));
        }
        if c.min_workers == 0 {
            return Err(anyhow!("min_workers must be at least 1"));
        }
        if c.min_workers > c.max_workers {
            return Err(anyhow!("min_workers ({}) exceeds max_workers ({})", c.min_workers, c.max_workers));
        }
        if !(0.0..1.0).contains(&c.rate_limit_backoff_factor) || c.rate_limit_backoff_factor == 0.0 {
            return Err(anyhow!("rate_limit_backoff_factor must be in (0, 1), got {}", c.rate_limit_backoff_factor));
        }
        if c.rate_limit_growth_factor < 1.0 {
            return Err(anyhow!("rate_limit_growth_factor must be at least 1.0, got {}", c.rate_limit_growth_factor));
        }
        if !(0.0..=1.0).contains(&c.success_threshold) {
            return Err(anyhow!("success_threshold must be in [0, 1], got {}", c.success_threshold));
        }

        if self.retry.exponential_base < 1.0 {
            return Err(anyhow!("retry.exponential_base must be at least 1.0"));
        }

        if self.extraction.mode == ExtractionMode::Service {
            Url::parse(&self.extraction.endpoint)
                .map_err(|e| anyhow!("Invalid extraction endpoint '{}': {}", self.extraction.endpoint, e))?;
        }

        if self.outline.enabled && self.outline.max_input_chars == 0 {
            return Err(anyhow!("outline.max_input_chars must be at least 1 when the outline is enabled"));
        }

        if self.output.formats.contains(&OutputFormat::Pdf) && self.output.pdf_command.is_empty() {
            return Err(anyhow!("PDF output requested but output.pdf_command is empty"));
        }

        Ok(())
    }
}

// Local servers such as Ollama or LM Studio accept requests without a key
fn is_local_endpoint(endpoint: &str) -> bool {
    Url::parse(endpoint)
        .ok()
        .and_then(|url| url.host_str().map(|h| h == "localhost" || h == "127.0.0.1"))
        .unwrap_or(false)
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            target_language: default_target_language(),
            provider: ProviderConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
            extraction: ExtractionConfig::default(),
            glossary: GlossaryConfig::default(),
            outline: OutlineConfig::default(),
            output: OutputConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
