/*!
 * # docbatch - adaptive batch document translator
 *
 * A Rust library for translating whole folders of documents with an LLM endpoint.
 *
 * ## Features
 *
 * - Several files translated in parallel, each in its own task
 * - Per-file pool of concurrent calls sized by an AIMD rate limiter
 * - URLs, DOIs, domains and glossary terms shielded behind placeholders
 * - Glossary tables in CSV or TSV
 * - HTML output of the original and the translation, PDF and DOCX through external tools
 * - A JSON batch report and an issues log
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `dispatcher`: Jobs and the parallel file dispatcher
 * - `extraction`: Document content sources
 * - `translation`: Per-file translation core:
 *   - `translation::protection`: Placeholder shielding
 *   - `translation::rate_limiter`: Adaptive pool size
 *   - `translation::scheduler`: Concurrent unit translation
 * - `rendering`: Output documents
 * - `report`: Batch results
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `providers`: Translation endpoint clients
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod dispatcher;
pub mod errors;
pub mod extraction;
pub mod file_utils;
pub mod language_utils;
pub mod providers;
pub mod rendering;
pub mod report;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use dispatcher::{FileDispatcher, FilePipeline, Job, JobStatus};
pub use errors::{FailureClass, PipelineError, ProviderError, TranslationError};
pub use language_utils::{get_language_name, language_codes_match};
pub use report::{BatchReport, JobReport};
pub use translation::{Glossary, RateLimiter, TerminologyProtector, TranslationScheduler};
