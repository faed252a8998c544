/*!
 * Core document model types for document translation.
 *
 * An extractor turns a source file into an [`ExtractedDocument`]: an ordered list of
 * structural blocks. Translatable blocks become [`TranslationUnit`]s, which the
 * scheduler fills in; the renderers then pair each unit back with its block.
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::translation::protection::ProtectedSpan;

/// Structural role of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    /// Section heading, level 1 being the document title level
    Heading { level: u8 },
    Paragraph,
    ListItem,
    Table,
    Caption,
    /// Source code or preformatted text, never translated
    Code,
    /// Image reference, never translated
    Image,
}

impl BlockKind {
    /// Whether text in this block is sent for translation
    pub fn is_translatable(&self) -> bool {
        !matches!(self, Self::Code | Self::Image)
    }
}

/// One structural block of an extracted document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    /// Block text; for images the alt text
    #[serde(default)]
    pub text: String,
    /// Image location relative to the source file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

impl Block {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            image_path: None,
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph, text)
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::new(BlockKind::Heading { level }, text)
    }
}

/// Structured content of one source file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Document title if the extractor found one
    #[serde(default)]
    pub title: Option<String>,
    /// Ordered blocks
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl ExtractedDocument {
    pub fn new(title: Option<String>, blocks: Vec<Block>) -> Self {
        Self { title, blocks }
    }

    /// Build translation units for every translatable, non-empty block.
    ///
    /// Each unit carries the text of the nearest preceding heading as context.
    pub fn translation_units(&self) -> Vec<TranslationUnit> {
        let mut units = Vec::new();
        let mut section: Option<String> = None;

        for (block_index, block) in self.blocks.iter().enumerate() {
            if !block.kind.is_translatable() || block.text.trim().is_empty() {
                continue;
            }

            let context = UnitContext {
                document_title: self.title.clone(),
                section: section.clone(),
                ..UnitContext::default()
            };
            units.push(TranslationUnit::new(units.len(), block_index, block.text.clone()).with_context(context));

            if let BlockKind::Heading { .. } = block.kind {
                section = Some(block.text.trim().to_string());
            }
        }
        units
    }

    /// Number of blocks that produce units
    pub fn translatable_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.kind.is_translatable() && !b.text.trim().is_empty())
            .count()
    }
}

/// Surrounding information passed to the model with a unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitContext {
    pub document_title: Option<String>,
    /// Heading of the enclosing section
    pub section: Option<String>,
    /// Summary of the enclosing section, from the document outline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl UnitContext {
    pub fn is_empty(&self) -> bool {
        self.document_title.is_none()
            && self.section.is_none()
            && self.section_summary.is_none()
            && self.keywords.is_empty()
    }
}

/// Lifecycle of a translation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Succeeded,
    /// Translated, but at least one placeholder could not be restored
    Degraded,
    Failed,
}

/// One atomic piece of text to translate
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationUnit {
    /// Stable identifier; position among the document's units
    pub id: usize,
    /// Index of the block this unit came from
    pub block_index: usize,
    pub original_text: String,
    /// Placeholders issued for this unit, in issue order
    pub spans: Vec<ProtectedSpan>,
    pub translated_text: Option<String>,
    pub status: UnitStatus,
    pub context: UnitContext,
    /// Attempts made against the provider
    pub attempts: u32,
    /// Cause of failure, or the placeholders lost for degraded units
    pub error: Option<String>,
}

impl TranslationUnit {
    pub fn new(id: usize, block_index: usize, original_text: impl Into<String>) -> Self {
        Self {
            id,
            block_index,
            original_text: original_text.into(),
            spans: Vec::new(),
            translated_text: None,
            status: UnitStatus::Pending,
            context: UnitContext::default(),
            attempts: 0,
            error: None,
        }
    }

    pub fn with_context(mut self, context: UnitContext) -> Self {
        self.context = context;
        self
    }

    /// Text handed to rendering: the translation, or the original as fallback
    pub fn final_text(&self) -> &str {
        match (&self.status, &self.translated_text) {
            (UnitStatus::Succeeded | UnitStatus::Degraded, Some(text)) => text,
            _ => &self.original_text,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == UnitStatus::Failed
    }

    pub fn is_degraded(&self) -> bool {
        self.status == UnitStatus::Degraded
    }

    /// Mark as failed, keeping the original text as the rendered fallback
    pub fn fail(&mut self, cause: impl Into<String>) {
        self.status = UnitStatus::Failed;
        self.translated_text = Some(self.original_text.clone());
        self.error = Some(cause.into());
    }
}

/// A document with its translated units, ready for rendering
#[derive(Debug, Clone)]
pub struct TranslatedDocument {
    pub source_path: PathBuf,
    pub document: ExtractedDocument,
    /// Units in document order
    pub units: Vec<TranslationUnit>,
}

impl TranslatedDocument {
    /// Blocks with translatable text replaced by each unit's final text
    pub fn translated_blocks(&self) -> Vec<Block> {
        let mut blocks = self.document.blocks.clone();
        for unit in &self.units {
            if let Some(block) = blocks.get_mut(unit.block_index) {
                block.text = unit.final_text().to_string();
            }
        }
        blocks
    }

    /// Title in the target language when the first heading was translated
    pub fn translated_title(&self) -> Option<String> {
        let title = self.document.title.as_deref()?;
        self.units
            .iter()
            .find(|u| u.original_text.trim() == title.trim())
            .map(|u| u.final_text().to_string())
            .or_else(|| Some(title.to_string()))
    }
}
