/*!
 * Provider implementations for the translation endpoint.
 *
 * This module contains the client seam used by the scheduler:
 * - OpenAI: any OpenAI-compatible chat completions API (OpenAI, DeepSeek, LM Studio, Ollama's /v1)
 * - Mock: scripted provider for tests
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;

/// What a completion call is for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestKind {
    /// Translate one protected unit
    #[default]
    Translation,
    /// Summarize the section structure of a whole document as JSON
    Outline,
}

/// One completion call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub kind: RequestKind,
    /// System prompt
    pub system_prompt: String,
    /// Full user prompt including the rules and the text
    pub prompt: String,
    /// The protected text embedded in the prompt, or the document digest for outlines
    pub text: String,
    /// Target language display name
    pub target_language: String,
}

/// Text returned by a completion call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    /// The generated text
    pub text: String,
    /// Prompt tokens reported by the endpoint
    pub prompt_tokens: Option<u64>,
    /// Completion tokens reported by the endpoint
    pub completion_tokens: Option<u64>,
}

/// Common trait for all LLM providers
///
/// Implementations report failures as a [`ProviderError`] whose
/// [`classify`](ProviderError::classify) result drives retries and pool sizing.
/// A provider must treat placeholder tokens in the text as opaque.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Complete a request using this provider
    ///
    /// # Arguments
    /// * `request` - The request to complete
    ///
    /// # Returns
    /// * `Result<CompletionResponse, ProviderError>` - The response from the provider or an error
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Test the connection to the provider
    ///
    /// # Returns
    /// * `Result<(), ProviderError>` - Ok if the connection is successful, or an error
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Short name for logs
    fn name(&self) -> &str;
}

pub mod mock;
pub mod openai;
