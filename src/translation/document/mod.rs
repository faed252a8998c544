/*!
 * Document model for translation.
 *
 * This module provides the structured representation produced by extraction:
 * - Ordered structural blocks with their kind
 * - Translation units with protection spans and status
 * - The translated document handed to rendering
 */

pub mod model;

// Re-export main types
pub use model::{
    Block, BlockKind, ExtractedDocument, TranslatedDocument, TranslationUnit, UnitContext, UnitStatus,
};
