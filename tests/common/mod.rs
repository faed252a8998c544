/*!
 * Common test utilities for the docbatch test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use docbatch::app_config::Config;
use docbatch::translation::{Glossary, RateLimiter, RateLimiterSettings, TranslationUnit};

// Re-export the mock collaborators module
pub mod mock_collaborators;

/// Route log output through the test harness; safe to call from every test
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content, creating parent folders
pub fn create_test_file(dir: &Path, relative_path: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(relative_path);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Markdown document with links, a glossary term and a code block
pub const SAMPLE_MARKDOWN: &str = r#"# Obesity and Heart Disease

Obesity raises the risk of heart disease, see https://www.who.int/news-room/fact-sheets for figures.

## Methods

We followed doi:10.1000/182 and the protocol at example.org/protocol.

- Body mass index
- Waist circumference

```
bmi = weight / height^2
```
"#;

/// Glossary table in CSV with a header row
pub const SAMPLE_GLOSSARY_CSV: &str = "source,target\nheart disease,心脏病\nheart,心脏\nObesity,肥胖\n";

/// Configuration pointing at a local endpoint, HTML output only
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.provider.endpoint = "http://localhost:11434/v1".to_string();
    config.concurrency.max_file_concurrency = 2;
    config.concurrency.initial_workers = 4;
    config.concurrency.max_workers = 8;
    config.retry.max_retries = 2;
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.extraction.retries = 0;
    // Request counts in tests cover translation calls only
    config.outline.enabled = false;
    config
}

/// Units with ids and block indexes following their position
pub fn units(texts: &[&str]) -> Vec<TranslationUnit> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| TranslationUnit::new(i, i, *text))
        .collect()
}

/// Limiter with the given start size and default factors
pub fn limiter(initial: usize, max: usize) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(RateLimiterSettings {
        initial_workers: initial,
        min_workers: 1,
        max_workers: max,
        ..RateLimiterSettings::default()
    }))
}

pub fn empty_glossary() -> Arc<Glossary> {
    Arc::new(Glossary::default())
}
