/*!
 * Prompt engineering for document translation.
 *
 * This module provides:
 * - The rules template sent with every unit
 * - Prompt construction with section context
 * - The outline request for whole documents
 * - Cleanup of model output before placeholder restoration
 */

pub mod templates;

// Re-export main types
pub use templates::{PromptTemplate, TranslationPromptBuilder, build_outline_prompt, clean_output};
