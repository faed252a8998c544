/*!
 * Rendering of translated documents.
 *
 * HTML is always produced, once for the original text and once for the translation.
 * PDF and DOCX are derived from the translated HTML by external tools (a headless
 * browser command and pandoc). A missing or failing tool degrades the job; it never
 * undoes the translation.
 */

use async_trait::async_trait;
use log::{debug, warn};
use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use crate::app_config::{OutputConfig, OutputFormat};
use crate::errors::PipelineError;
use crate::file_utils::FileManager;
use crate::translation::document::{Block, BlockKind, TranslatedDocument};

pub const ORIGINAL_HTML: &str = "original.html";
pub const TRANSLATED_HTML: &str = "translated.html";

/// Artifacts produced for one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOutput {
    /// Files written
    pub artifacts: Vec<PathBuf>,
    /// Formats that could not be produced, with the cause
    pub failures: Vec<String>,
}

/// Turns a translated document into output files
#[async_trait]
pub trait Renderer: Send + Sync + Debug {
    /// Render into `output_dir`; an error means nothing usable was written
    async fn render(&self, document: &TranslatedDocument, output_dir: &Path) -> Result<RenderOutput, PipelineError>;
}

/// HTML plus optional PDF and DOCX conversions
#[derive(Debug, Clone)]
pub struct DocumentRenderer {
    formats: Vec<OutputFormat>,
    pdf_command: Vec<String>,
    pandoc_path: String,
    tool_timeout: Duration,
}

impl DocumentRenderer {
    pub fn from_config(config: &OutputConfig) -> Self {
        Self {
            formats: config.formats.clone(),
            pdf_command: config.pdf_command.clone(),
            pandoc_path: config.pandoc_path.clone(),
            tool_timeout: Duration::from_secs(config.tool_timeout_secs),
        }
    }

    /// Renderer producing only HTML
    pub fn html_only() -> Self {
        Self::from_config(&OutputConfig {
            formats: vec![OutputFormat::Html],
            ..OutputConfig::default()
        })
    }

    async fn write_html(&self, document: &TranslatedDocument, output_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let document = document.clone();
        let output_dir = output_dir.to_path_buf();

        // Page building and image copying are blocking work
        tokio::task::spawn_blocking(move || {
            let source_dir = document.source_path.parent().map(Path::to_path_buf).unwrap_or_default();
            let original_title = document.document.title.clone().unwrap_or_else(|| file_title(&document.source_path));
            let translated_title = document.translated_title().unwrap_or_else(|| original_title.clone());

            let original = render_page(&original_title, &document.document.blocks);
            let translated = render_page(&translated_title, &document.translated_blocks());

            let original_path = output_dir.join(ORIGINAL_HTML);
            let translated_path = output_dir.join(TRANSLATED_HTML);
            FileManager::write_to_file(&original_path, &original).map_err(|e| PipelineError::Rendering {
                format: "html".to_string(),
                message: format!("{:#}", e),
            })?;
            FileManager::write_to_file(&translated_path, &translated).map_err(|e| PipelineError::Rendering {
                format: "html".to_string(),
                message: format!("{:#}", e),
            })?;

            for block in document.document.blocks.iter().filter(|b| b.kind == BlockKind::Image) {
                if let Some(src) = &block.image_path {
                    copy_image(&source_dir, &output_dir, src);
                }
            }

            Ok(vec![original_path, translated_path])
        })
        .await
        .map_err(|e| PipelineError::WorkerAborted(format!("HTML rendering task failed: {}", e)))?
    }

    async fn convert(&self, format: OutputFormat, html: &Path, output_dir: &Path) -> Result<PathBuf, PipelineError> {
        let output = output_dir.join(format!("translated.{}", format.extension()));
        let (program, args) = match format {
            OutputFormat::Html => return Ok(html.to_path_buf()),
            OutputFormat::Pdf => {
                let substituted: Vec<String> = self
                    .pdf_command
                    .iter()
                    .map(|arg| {
                        arg.replace("{input}", &html.to_string_lossy())
                            .replace("{output}", &output.to_string_lossy())
                    })
                    .collect();
                let Some((program, args)) = substituted.split_first() else {
                    return Err(PipelineError::Rendering {
                        format: format.to_string(),
                        message: "No PDF command configured".to_string(),
                    });
                };
                (program.clone(), args.to_vec())
            }
            OutputFormat::Docx => (
                self.pandoc_path.clone(),
                vec![
                    html.to_string_lossy().to_string(),
                    "-o".to_string(),
                    output.to_string_lossy().to_string(),
                    format!("--resource-path={}", output_dir.to_string_lossy()),
                ],
            ),
        };

        run_tool(&program, &args, self.tool_timeout)
            .await
            .map_err(|message| PipelineError::Rendering {
                format: format.to_string(),
                message,
            })?;

        if !FileManager::file_exists(&output) {
            return Err(PipelineError::Rendering {
                format: format.to_string(),
                message: format!("{} finished but did not write {:?}", program, output),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl Renderer for DocumentRenderer {
    async fn render(&self, document: &TranslatedDocument, output_dir: &Path) -> Result<RenderOutput, PipelineError> {
        let mut output = RenderOutput {
            artifacts: self.write_html(document, output_dir).await?,
            failures: Vec::new(),
        };
        let translated_html = output_dir.join(TRANSLATED_HTML);

        for format in self.formats.iter().filter(|f| **f != OutputFormat::Html) {
            match self.convert(*format, &translated_html, output_dir).await {
                Ok(path) => {
                    debug!("Rendered {:?}", path);
                    output.artifacts.push(path);
                }
                Err(e) => {
                    warn!("{}", e);
                    output.failures.push(e.to_string());
                }
            }
        }
        Ok(output)
    }
}

// Runs an external tool with a timeout; the error is a readable message
async fn run_tool(program: &str, args: &[String], timeout: Duration) -> Result<(), String> {
    let future = Command::new(program).args(args).kill_on_drop(true).output();

    let result = tokio::select! {
        result = future => {
            result.map_err(|e| format!("Failed to execute {}: {}", program, e))?
        },
        _ = tokio::time::sleep(timeout) => {
            return Err(format!("{} timed out after {:?}", program, timeout));
        }
    };

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(format!("{} failed ({}): {}", program, result.status, stderr.trim()));
    }
    Ok(())
}

/// Image reference confined to the document's folder, or None for absolute and `..` paths
pub fn relative_image_path(src: &str) -> Option<PathBuf> {
    let path = Path::new(src);
    let confined = path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && path.components().any(|c| matches!(c, Component::Normal(_)));
    confined.then(|| path.to_path_buf())
}

// Copies an image referenced by the document next to the rendered pages
fn copy_image(source_dir: &Path, output_dir: &Path, src: &str) {
    let Some(relative) = relative_image_path(src) else {
        warn!("Skipping image outside the document folder: {}", src);
        return;
    };
    let from = source_dir.join(&relative);
    let to = output_dir.join(&relative);
    if !FileManager::file_exists(&from) {
        return;
    }
    // Output written next to the input must not copy a file onto itself
    if let (Ok(a), Ok(b)) = (from.canonicalize(), to.canonicalize()) {
        if a == b {
            debug!("Image {:?} is already in place", from);
            return;
        }
    }
    if let Err(e) = FileManager::copy_file(&from, &to) {
        warn!("Could not copy image {:?}: {:#}", from, e);
    }
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Document".to_string())
}

/// Escape text for HTML element content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Standalone HTML page for a list of blocks
pub fn render_page(title: &str, blocks: &[Block]) -> String {
    let mut body = String::new();
    let mut in_list = false;

    for block in blocks {
        if in_list && block.kind != BlockKind::ListItem {
            body.push_str("</ul>\n");
            in_list = false;
        }
        let text = escape_html(&block.text);
        match block.kind {
            BlockKind::Heading { level } => {
                let level = level.clamp(1, 6);
                body.push_str(&format!("<h{level}>{text}</h{level}>\n"));
            }
            BlockKind::Paragraph => body.push_str(&format!("<p>{text}</p>\n")),
            BlockKind::ListItem => {
                if !in_list {
                    body.push_str("<ul>\n");
                    in_list = true;
                }
                body.push_str(&format!("<li>{text}</li>\n"));
            }
            BlockKind::Table => body.push_str(&format!("<pre class=\"table\">{text}</pre>\n")),
            BlockKind::Caption => body.push_str(&format!("<p class=\"caption\">{text}</p>\n")),
            BlockKind::Code => body.push_str(&format!("<pre><code>{text}</code></pre>\n")),
            BlockKind::Image => {
                let src = escape_html(block.image_path.as_deref().unwrap_or_default());
                body.push_str(&format!("<figure><img src=\"{src}\" alt=\"{text}\"></figure>\n"));
            }
        }
    }
    if in_list {
        body.push_str("</ul>\n");
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>body{{max-width:48em;margin:2em auto;font-family:serif;line-height:1.6}}img{{max-width:100%}}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        body
    )
}
