/*!
 * Content extraction.
 *
 * An [`Extractor`] turns one source file into an [`ExtractedDocument`]. Plain text and
 * Markdown are parsed locally; anything else is sent to an extraction service that
 * answers with the same JSON document model.
 */

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{ExtractionConfig, ExtractionMode};
use crate::errors::PipelineError;
use crate::translation::document::{Block, BlockKind, ExtractedDocument};

/// Source of structured document content
#[async_trait]
pub trait Extractor: Send + Sync + Debug {
    /// Extract the blocks of one file
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, PipelineError>;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// Build the extractor selected by the configuration
pub fn build_extractor(config: &ExtractionConfig) -> Arc<dyn Extractor> {
    match config.mode {
        ExtractionMode::Local => Arc::new(LocalExtractor),
        ExtractionMode::Service => Arc::new(ServiceExtractor::new(
            &config.endpoint,
            Duration::from_secs(config.timeout_secs),
        )),
    }
}

/// Parses `.txt` and `.md` files
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExtractor;

impl LocalExtractor {
    /// Parse Markdown-ish text into blocks; plain text is a special case with only paragraphs
    pub fn parse(content: &str) -> ExtractedDocument {
        let mut blocks = Vec::new();
        let mut paragraph: Vec<&str> = Vec::new();
        let mut table: Vec<&str> = Vec::new();
        let mut code: Option<Vec<&str>> = None;

        fn flush(lines: &mut Vec<&str>, kind: BlockKind, blocks: &mut Vec<Block>) {
            if !lines.is_empty() {
                let separator = if kind == BlockKind::Table { "\n" } else { " " };
                blocks.push(Block::new(kind, lines.iter().map(|l| l.trim()).collect::<Vec<_>>().join(separator)));
                lines.clear();
            }
        }

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(code_lines) = code.as_mut() {
                if trimmed.starts_with("```") {
                    blocks.push(Block::new(BlockKind::Code, code_lines.join("\n")));
                    code = None;
                } else {
                    code_lines.push(line);
                }
                continue;
            }

            if trimmed.starts_with("```") {
                flush(&mut paragraph, BlockKind::Paragraph, &mut blocks);
                flush(&mut table, BlockKind::Table, &mut blocks);
                code = Some(Vec::new());
                continue;
            }

            if trimmed.starts_with('|') {
                flush(&mut paragraph, BlockKind::Paragraph, &mut blocks);
                table.push(trimmed);
                continue;
            }
            flush(&mut table, BlockKind::Table, &mut blocks);

            if trimmed.is_empty() {
                flush(&mut paragraph, BlockKind::Paragraph, &mut blocks);
            } else if let Some((level, text)) = parse_heading(trimmed) {
                flush(&mut paragraph, BlockKind::Paragraph, &mut blocks);
                blocks.push(Block::heading(level, text));
            } else if let Some((alt, src)) = parse_image(trimmed) {
                flush(&mut paragraph, BlockKind::Paragraph, &mut blocks);
                blocks.push(Block {
                    kind: BlockKind::Image,
                    text: alt.to_string(),
                    image_path: Some(src.to_string()),
                });
            } else if let Some(item) = parse_list_item(trimmed) {
                flush(&mut paragraph, BlockKind::Paragraph, &mut blocks);
                blocks.push(Block::new(BlockKind::ListItem, item));
            } else {
                paragraph.push(trimmed);
            }
        }

        if let Some(code_lines) = code {
            blocks.push(Block::new(BlockKind::Code, code_lines.join("\n")));
        }
        flush(&mut table, BlockKind::Table, &mut blocks);
        flush(&mut paragraph, BlockKind::Paragraph, &mut blocks);

        let title = blocks
            .iter()
            .find(|b| b.kind == BlockKind::Heading { level: 1 })
            .map(|b| b.text.clone());
        ExtractedDocument::new(title, blocks)
    }
}

fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((level as u8, rest.trim().trim_end_matches('#').trim()))
}

fn parse_image(line: &str) -> Option<(&str, &str)> {
    let inner = line.strip_prefix("![")?.strip_suffix(')')?;
    let (alt, src) = inner.split_once("](")?;
    Some((alt, src.split_whitespace().next().unwrap_or(src)))
}

fn parse_list_item(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "+ "] {
        if let Some(item) = line.strip_prefix(marker) {
            return Some(item.trim());
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(item) = line[digits..].strip_prefix(". ") {
            return Some(item.trim());
        }
    }
    None
}

#[async_trait]
impl Extractor for LocalExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, PipelineError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !matches!(extension.as_str(), "txt" | "md" | "markdown") {
            return Err(PipelineError::Extraction {
                path: path.to_path_buf(),
                message: format!("Local extraction does not support '.{}' files", extension),
            });
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::io(path, e))?;
        let document = Self::parse(&content);
        debug!("Extracted {} blocks from {:?}", document.blocks.len(), path);
        Ok(document)
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Client of an HTTP extraction service.
///
/// The file is posted as the raw request body with its name in `X-File-Name`; the
/// service answers with an [`ExtractedDocument`] as JSON.
#[derive(Debug, Clone)]
pub struct ServiceExtractor {
    client: Client,
    endpoint: String,
}

impl ServiceExtractor {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl Extractor for ServiceExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, PipelineError> {
        let failure = |message: String| PipelineError::Extraction {
            path: path.to_path_buf(),
            message,
        };

        let bytes = tokio::fs::read(path).await.map_err(|e| PipelineError::io(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-File-Name", file_name)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| failure(format!("Extraction request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(failure(format!("Extraction service returned {}: {}", status, text)));
        }

        response
            .json::<ExtractedDocument>()
            .await
            .map_err(|e| failure(format!("Invalid extraction response: {}", e)))
    }

    fn name(&self) -> &str {
        "service"
    }
}
