//! Embedding client abstraction and provider adapters.
//!
//! Ingestion embeds chunks in [`EmbeddingMode::Document`] and queries in
//! [`EmbeddingMode::Query`]. Providers without native task types realise the two modes as text
//! prefixes, which is how asymmetric models such as `nomic-embed-text` expect to be called.

mod ollama;
mod openai;

pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// HTTP layer failed before a response was received.
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider answered with a non-success status.
    #[error("Embedding provider returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider returned a different number of vectors than inputs.
    #[error("Embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
    /// Returned vector does not match the configured dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for the collection.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
    /// Provider returned an all-zero or non-finite vector.
    #[error("Embedding provider returned a degenerate vector for input {index}")]
    DegenerateVector {
        /// Position of the offending input within the batch.
        index: usize,
    },
}

/// Which side of an asymmetric retrieval setup a text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// Corpus content written to the vector index.
    Document,
    /// User questions used to search the index.
    Query,
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector per supplied text, in input order.
    async fn embed(
        &self,
        texts: Vec<String>,
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Text prefixes realising [`EmbeddingMode`] for providers without task types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModePrefixes {
    /// Prefix applied in document mode.
    pub document: String,
    /// Prefix applied in query mode.
    pub query: String,
}

impl ModePrefixes {
    /// Resolve prefixes from explicit configuration, falling back to model conventions.
    pub fn resolve(config: &Config) -> Self {
        let defaults = Self::for_model(&config.embedding_model);
        Self {
            document: config
                .embedding_document_prefix
                .clone()
                .unwrap_or(defaults.document),
            query: config
                .embedding_query_prefix
                .clone()
                .unwrap_or(defaults.query),
        }
    }

    /// Prefixes a model family was trained with, or none.
    pub fn for_model(model: &str) -> Self {
        let normalized = model.to_lowercase();
        if normalized.starts_with("nomic-embed") {
            Self {
                document: "search_document: ".into(),
                query: "search_query: ".into(),
            }
        } else if normalized.contains("e5-") {
            Self {
                document: "passage: ".into(),
                query: "query: ".into(),
            }
        } else {
            Self::default()
        }
    }

    pub(crate) fn apply(&self, mode: EmbeddingMode, texts: Vec<String>) -> Vec<String> {
        let prefix = match mode {
            EmbeddingMode::Document => &self.document,
            EmbeddingMode::Query => &self.query,
        };
        if prefix.is_empty() {
            return texts;
        }
        texts
            .into_iter()
            .map(|text| format!("{prefix}{text}"))
            .collect()
    }
}

/// Reject provider output that cannot be stored or searched meaningfully.
pub(crate) fn validate_embeddings(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingClientError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingClientError::CountMismatch {
            expected: expected_count,
            actual: vectors.len(),
        });
    }
    for (index, vector) in vectors.iter().enumerate() {
        if vector.len() != dimension {
            return Err(EmbeddingClientError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        let finite = vector.iter().all(|value| value.is_finite());
        let non_zero = vector.iter().any(|value| *value != 0.0);
        if !finite || !non_zero {
            return Err(EmbeddingClientError::DegenerateVector { index });
        }
    }
    Ok(())
}

/// Build an embedding client suitable for the current configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    let prefixes = ModePrefixes::resolve(config);
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        document_prefix = %prefixes.document,
        query_prefix = %prefixes.query,
        "Building embedding client"
    );
    let client: Arc<dyn EmbeddingClient> = match config.embedding_provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            config
                .embedding_url
                .clone()
                .unwrap_or_else(|| config.ollama_base_url()),
            config.embedding_model.clone(),
            config.embedding_dimension,
            prefixes,
        )?),
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbeddingClient::new(
            config
                .embedding_url
                .clone()
                .unwrap_or_else(|| openai::DEFAULT_OPENAI_URL.to_string()),
            config.embedding_api_key.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
            prefixes,
        )?),
    };
    Ok(client)
}
