/*!
 * Tests for configuration files
 */

use docbatch::app_config::{Config, ExtractionMode, OutputFormat};
use docbatch::translation::{RateLimiterSettings, RetryPolicy, SchedulerSettings};
use std::time::Duration;

use crate::common::{create_temp_dir, create_test_file, test_config};

#[test]
fn test_defaultConfig_writtenAndReadBack_shouldKeepDefaults() {
    let dir = create_temp_dir().unwrap();
    let json = serde_json::to_string_pretty(&Config::default()).unwrap();
    let path = create_test_file(dir.path(), "conf.json", &json).unwrap();

    let mut config: Config = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(config.concurrency.max_file_concurrency, 4);
    assert_eq!(config.concurrency.initial_workers, 20);
    assert_eq!(config.concurrency.min_samples, 20);
    assert!(config.validate().is_err());

    config.provider.api_key = "sk-test".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_fullConfig_shouldDeserializeEverySection() {
    let json = r#"{
        "source_language": "de",
        "target_language": "en",
        "provider": { "endpoint": "http://127.0.0.1:1234/v1", "model": "local", "timeout_secs": 30 },
        "concurrency": { "max_file_concurrency": 2, "initial_workers": 6, "min_workers": 2, "max_workers": 12,
                         "rate_limit_backoff_factor": 0.6, "increase_interval_secs": 5, "file_timeout_secs": 0 },
        "retry": { "max_retries": 5, "initial_delay_ms": 200 },
        "extraction": { "mode": "service", "endpoint": "http://127.0.0.1:9000/extract", "extensions": ["pdf", "docx"] },
        "glossary": { "paths": ["terms.csv"], "whole_word_only": false },
        "output": { "formats": ["html", "docx"] },
        "log_level": "debug"
    }"#;

    let config: Config = serde_json::from_str(json).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.extraction.mode, ExtractionMode::Service);
    assert_eq!(config.output.formats, vec![OutputFormat::Html, OutputFormat::Docx]);
    assert!(!config.glossary.whole_word_only);

    let limiter = RateLimiterSettings::from(&config.concurrency);
    assert_eq!(limiter.initial_workers, 6);
    assert_eq!(limiter.backoff_factor, 0.6);
    assert_eq!(limiter.increase_interval, Duration::from_secs(5));

    let retry = RetryPolicy::from(&config.retry);
    assert_eq!(retry.max_attempts(), 6);

    let scheduler = SchedulerSettings::from_config(&config).unwrap();
    assert_eq!(scheduler.source_language, "German");
    assert_eq!(scheduler.target_language, "English");
    assert_eq!(scheduler.call_timeout, Duration::from_secs(30));
    assert!(scheduler.file_timeout.is_none());
}

#[test]
fn test_validate_unknownLanguage_shouldFail() {
    let mut config = test_config();
    config.target_language = "xx-not-a-language".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_serviceModeWithoutEndpoint_shouldFail() {
    let mut config = test_config();
    config.extraction.mode = ExtractionMode::Service;
    assert!(config.validate().is_err());
}
