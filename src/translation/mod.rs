/*!
 * Translation of document units.
 *
 * This module contains the per-file translation core. It is split into several submodules:
 *
 * - `document`: Document model shared by extraction, translation and rendering
 * - `glossary`: Terminology tables
 * - `outline`: Section summaries and keywords for prompt context
 * - `protection`: Placeholder shielding of links and glossary terms
 * - `rate_limiter`: Adaptive size of the per-file call pool
 * - `retry`: Back-off policy for failed calls
 * - `scheduler`: Concurrent execution of the units of one file
 * - `prompts`: Prompt templates and output cleaning
 */

// Re-export main types for easier usage
pub use self::glossary::{Glossary, GlossaryEntry};
pub use self::outline::{DocumentOutline, OutlineGenerator, OutlineSection, OutlineSettings};
pub use self::protection::{ProtectedSpan, ProtectedText, RestoredText, SpanKind, TerminologyProtector};
pub use self::rate_limiter::{RateLimiter, RateLimiterSettings, RateLimiterStats};
pub use self::retry::RetryPolicy;
pub use self::scheduler::{FileTranslation, SchedulerSettings, TranslationScheduler};

// Re-export document model types
pub use self::document::{
    Block, BlockKind, ExtractedDocument, TranslatedDocument, TranslationUnit, UnitContext, UnitStatus,
};

// Re-export prompt types
pub use self::prompts::{PromptTemplate, TranslationPromptBuilder};

// Submodules
pub mod document;
pub mod glossary;
pub mod outline;
pub mod prompts;
pub mod protection;
pub mod rate_limiter;
pub mod retry;
pub mod scheduler;
