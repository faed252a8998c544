/*!
 * Error types for the docbatch application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// How the scheduler should react to a failed provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The endpoint signalled overload; shrink the pool and retry
    RateLimited,
    /// Network trouble, timeouts, server-side errors; retry with back-off
    Transient,
    /// Retrying cannot help
    Permanent,
}

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The call did not complete within the per-call timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Error message from the API
        message: String,
        /// Server-provided retry delay, if any
        retry_after_secs: Option<u64>,
    },

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Classify this error for retry and rate-control purposes.
    ///
    /// The rate-limit check runs first, so a 429 wrapped in any variant is always
    /// treated as overload rather than as a generic transient failure.
    pub fn classify(&self) -> FailureClass {
        match self {
            Self::RateLimitExceeded { .. } => FailureClass::RateLimited,
            Self::ApiError { status_code: 429, .. } => FailureClass::RateLimited,
            Self::ApiError { status_code, .. } if *status_code >= 500 || *status_code == 408 => {
                FailureClass::Transient
            }
            Self::RequestFailed(_) | Self::ConnectionError(_) | Self::Timeout(_) => {
                FailureClass::Transient
            }
            Self::ApiError { .. } | Self::ParseError(_) | Self::AuthenticationError(_) => {
                FailureClass::Permanent
            }
        }
    }

    /// Server-provided retry delay for rate-limited calls
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Errors that can occur while translating the units of one file
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A placeholder did not survive the round trip through the model
    #[error("Placeholder {token} missing from translated text")]
    ProtectionMismatch {
        /// The token that could not be found
        token: String,
    },

    /// Retries for a unit were used up
    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// The error of the final attempt
        last_error: ProviderError,
    },

    /// The file-level deadline or a shutdown stopped the unit
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

/// Errors that end or degrade the pipeline of one file
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The extraction collaborator could not produce content
    #[error("Extraction failed for {path}: {message}")]
    Extraction {
        /// Source file
        path: PathBuf,
        /// Cause reported by the extractor
        message: String,
    },

    /// A renderer could not produce an artifact
    #[error("Rendering {format} failed: {message}")]
    Rendering {
        /// Output format that failed
        format: String,
        /// Cause reported by the renderer
        message: String,
    },

    /// File system error while reading sources or writing outputs
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The worker running the file stopped abnormally
    #[error("Worker aborted: {0}")]
    WorkerAborted(String),
}

impl PipelineError {
    /// Wrap an I/O error with the path it concerns
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
