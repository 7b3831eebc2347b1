//! Ollama `/api/embed` adapter.

use super::{
    EmbeddingClient, EmbeddingClientError, EmbeddingMode, ModePrefixes, validate_embeddings,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Embedding client backed by a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
    prefixes: ModePrefixes,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    /// Construct a client for the given runtime URL and model.
    pub fn new(
        base_url: String,
        model: String,
        dimension: usize,
        prefixes: ModePrefixes,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder().user_agent("rusty-rag/embed").build()?;
        Ok(Self {
            http,
            base_url,
            model,
            dimension,
            prefixes,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(
        &self,
        texts: Vec<String>,
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        let expected = texts.len();
        let input = self.prefixes.apply(mode, texts);
        tracing::debug!(model = %self.model, inputs = expected, ?mode, "Requesting Ollama embeddings");

        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({
                "model": self.model,
                "input": input,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = EmbeddingClientError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Ollama embedding request failed");
            return Err(error);
        }

        let EmbedResponse { embeddings } = response.json().await?;
        validate_embeddings(&embeddings, expected, self.dimension)?;
        Ok(embeddings)
    }
}
