/*!
 * Mock extraction and rendering collaborators
 */

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use docbatch::errors::PipelineError;
use docbatch::extraction::Extractor;
use docbatch::rendering::{RenderOutput, Renderer};
use docbatch::translation::{Block, ExtractedDocument, TranslatedDocument};

/// Produces `paragraphs` paragraphs per file; files whose name contains "fatal" fail,
/// files whose name contains "flaky" fail on their first attempt only
#[derive(Debug, Clone)]
pub struct ScriptedExtractor {
    pub paragraphs: usize,
    calls: Arc<AtomicUsize>,
    flaky_failures: Arc<AtomicUsize>,
}

impl ScriptedExtractor {
    pub fn new(paragraphs: usize) -> Self {
        Self {
            paragraphs,
            calls: Arc::new(AtomicUsize::new(0)),
            flaky_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        if name.contains("fatal") {
            return Err(PipelineError::Extraction {
                path: path.to_path_buf(),
                message: "corrupt document".to_string(),
            });
        }
        if name.contains("flaky") && self.flaky_failures.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(PipelineError::Extraction {
                path: path.to_path_buf(),
                message: "service busy".to_string(),
            });
        }

        let mut blocks = vec![Block::heading(1, format!("Title of {}", name))];
        blocks.extend((0..self.paragraphs).map(|i| Block::paragraph(format!("{} paragraph {}", name, i))));
        Ok(ExtractedDocument::new(Some(format!("Title of {}", name)), blocks))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Renderer that writes nothing and reports one failed format per document
#[derive(Debug, Clone, Default)]
pub struct FlakyFormatRenderer;

#[async_trait]
impl Renderer for FlakyFormatRenderer {
    async fn render(&self, _document: &TranslatedDocument, output_dir: &Path) -> Result<RenderOutput, PipelineError> {
        Ok(RenderOutput {
            artifacts: vec![output_dir.join("translated.html")],
            failures: vec!["Rendering pdf failed: no browser".to_string()],
        })
    }
}

/// Renderer that always fails
#[derive(Debug, Clone, Default)]
pub struct BrokenRenderer;

#[async_trait]
impl Renderer for BrokenRenderer {
    async fn render(&self, _document: &TranslatedDocument, _output_dir: &Path) -> Result<RenderOutput, PipelineError> {
        Err(PipelineError::Rendering {
            format: "html".to_string(),
            message: "disk full".to_string(),
        })
    }
}
