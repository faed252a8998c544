/*!
 * Prompt templates for academic document translation.
 *
 * The user prompt carries the rules, optional section context and the protected text.
 * The model answers with plain text, which [`clean_output`] strips of the prefixes and
 * quoting models like to add.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::translation::document::UnitContext;

/// Prompt template for a single translation unit.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// Rules sent with every unit.
    pub const ACADEMIC_TRANSLATOR: &'static str = r#"Translate the following {source_language} text into {target_language}.

Requirements:
1. Keep an academic register and render technical terms accurately
2. Preserve the paragraph structure and any inline formatting
3. Copy every token of the form ⟦…⟧ exactly as it appears, in the position the sentence needs it; never translate, split or drop one
4. Keep every URL (starting with http:// or https://) and domain unchanged
5. Output only the translation, with no explanation and no "Translation:" prefix"#;

    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Create the default academic translator template.
    pub fn academic_translator() -> Self {
        Self::new(Self::ACADEMIC_TRANSLATOR)
    }

    /// Render the template with the given variables.
    pub fn render(&self, source_language: &str, target_language: &str) -> String {
        self.template
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::academic_translator()
    }
}

/// Builder for constructing translation prompts with context.
#[derive(Debug, Clone)]
pub struct TranslationPromptBuilder {
    source_language: String,
    target_language: String,
    template: PromptTemplate,
    context: UnitContext,
}

impl TranslationPromptBuilder {
    /// Create a new prompt builder; languages are display names such as "English".
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            template: PromptTemplate::default(),
            context: UnitContext::default(),
        }
    }

    /// Set the document context of the unit.
    pub fn with_context(mut self, context: &UnitContext) -> Self {
        self.context = context.clone();
        self
    }

    /// Build the user prompt for `text`.
    pub fn build(&self, text: &str) -> String {
        let mut parts = vec![self.template.render(&self.source_language, &self.target_language)];

        if !self.context.is_empty() {
            parts.push(String::new());
            parts.push("[Document context]".to_string());
            if let Some(title) = &self.context.document_title {
                parts.push(format!("Document: {}", title));
            }
            if let Some(section) = &self.context.section {
                parts.push(format!("Section: {}", section));
            }
            if let Some(summary) = &self.context.section_summary {
                parts.push(format!("Section summary: {}", summary));
            }
            if !self.context.keywords.is_empty() {
                parts.push(format!("Keywords: {}", self.context.keywords.join(", ")));
            }
        }

        parts.push(String::new());
        parts.push("[Text to translate]".to_string());
        parts.push(text.to_string());
        parts.join("\n")
    }
}

/// Request for the section outline of a whole document.
pub const OUTLINE_REQUEST: &str = r#"Analyze the following {source_language} document and describe its structure as JSON.

Requirements:
1. Identify the document type: research_report, journal_article, technical_document or book_chapter
2. List every section with its heading level and its title exactly as written in the document
3. Summarize each section in {target_language}, in at most 50 words
4. Give each section 3 to 5 keywords

Output format:
{
  "document_type": "journal_article",
  "structure": [
    {"level": 1, "title": "Section title", "pages": [], "summary": "Short summary", "keywords": ["keyword"]}
  ]
}

Return only the JSON, with no explanation."#;

/// Build the outline request for a document digest.
pub fn build_outline_prompt(source_language: &str, target_language: &str, digest: &str) -> String {
    let rules = PromptTemplate::new(OUTLINE_REQUEST).render(source_language, target_language);
    format!("{}\n\n[Document]\n{}", rules, digest)
}

static OUTPUT_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:译文|翻译|【译文】|【翻译】|\[译文\]|\[翻译\]|translation|translated text|以下是翻译|翻译如下|翻译结果)[：:\s]+")
        .unwrap()
});

const QUOTE_PAIRS: [(char, char); 5] = [('"', '"'), ('“', '”'), ('「', '」'), ('『', '』'), ('《', '》')];

/// Strip labels and wrapping quotes a model adds around its answer.
pub fn clean_output(text: &str) -> String {
    let trimmed = text.trim();
    let mut cleaned = OUTPUT_PREFIX.replace(trimmed, "").into_owned();

    for (open, close) in QUOTE_PAIRS {
        if cleaned.chars().count() >= 2 && cleaned.starts_with(open) && cleaned.ends_with(close) {
            cleaned = cleaned[open.len_utf8()..cleaned.len() - close.len_utf8()].to_string();
            break;
        }
    }

    cleaned.trim().to_string()
}
