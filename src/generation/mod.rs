//! Streaming text generation.
//!
//! A [`GenerationClient`] turns a prompt into a [`FragmentStream`]: text fragments in the order
//! the model produced them, ending when the provider closes the response. Dropping the stream
//! drops the underlying HTTP response, which releases the connection and stops the provider from
//! being polled for further fragments.

mod lines;
mod ollama;
mod openai;

pub use ollama::OllamaGenerationClient;
pub use openai::OpenAiGenerationClient;

use crate::config::{Config, GenerationProvider};
use async_trait::async_trait;
use futures_core::Stream;
use reqwest::StatusCode;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while opening or consuming a generation stream.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// HTTP layer failed before or while receiving the response.
    #[error("Generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider answered with a non-success status.
    #[error("Generation provider returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// A streamed message could not be decoded.
    #[error("Malformed generation stream: {0}")]
    InvalidResponse(String),
    /// Provider reported an error inside the stream.
    #[error("Generation provider error: {0}")]
    Provider(String),
}

/// Ordered text fragments produced by a generation call.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Interface implemented by streaming text generation backends.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Start a streaming completion for `prompt`.
    async fn stream_complete(&self, prompt: String) -> Result<FragmentStream, GenerationError>;
}

/// Build the generation client selected by configuration.
pub fn build_generation_client(
    config: &Config,
) -> Result<Arc<dyn GenerationClient>, GenerationError> {
    let client: Arc<dyn GenerationClient> = match config.generation_provider {
        GenerationProvider::OpenAI => Arc::new(OpenAiGenerationClient::new(
            config
                .generation_url
                .clone()
                .unwrap_or_else(|| openai::DEFAULT_OPENAI_URL.to_string()),
            config.generation_api_key.clone(),
            config.generation_model.clone(),
            config.generation_temperature,
        )?),
        GenerationProvider::Ollama => Arc::new(OllamaGenerationClient::new(
            config
                .generation_url
                .clone()
                .unwrap_or_else(|| config.ollama_base_url()),
            config.generation_model.clone(),
            config.generation_temperature,
        )?),
    };
    tracing::debug!(
        provider = ?config.generation_provider,
        model = %config.generation_model,
        "Built generation client"
    );
    Ok(client)
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GenerationError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = GenerationError::UnexpectedStatus { status, body };
    tracing::error!(error = %error, "Generation request rejected");
    Err(error)
}
