//! Core data types and error definitions for the ingestion and query pipelines.

use crate::{
    embedding::EmbeddingClientError, extraction::ExtractionError, generation::GenerationError,
    qdrant::QdrantError, rerank::RerankError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while configuring the chunker.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible character budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap would stop the chunker from making progress.
    #[error("chunk overlap ({overlap}) must be smaller than the chunk size ({chunk_size})")]
    InvalidOverlap {
        /// Requested overlap in characters.
        overlap: usize,
        /// Configured chunk size in characters.
        chunk_size: usize,
    },
}

/// Coarse classification used by callers to report errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Request was rejected before any external call.
    Input,
    /// Document content could not be turned into text.
    Extraction,
    /// An external collaborator failed.
    Upstream,
}

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Document could not be decoded into text.
    #[error("{0}")]
    Extraction(#[from] ExtractionError),
    /// Document contained no usable text; nothing was written.
    #[error("No usable text found in '{document}'")]
    NoContent {
        /// Source identifier of the rejected document.
        document: String,
    },
    /// Embedding provider failed to produce vectors for the chunks.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Batch write failed; the index state is unknown.
    #[error("Failed to write chunks to the vector index: {0}")]
    Index(#[from] QdrantError),
    /// Chunks were written but records from an earlier ingestion could not be removed.
    #[error("Chunks were written but stale records could not be removed: {0}")]
    StaleCleanup(#[source] QdrantError),
}

impl IngestError {
    /// Classify the error for reporting.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Extraction(
                ExtractionError::UnsupportedFormat(_) | ExtractionError::ExtractorUnavailable(_),
            )
            | Self::NoContent { .. } => ErrorClass::Input,
            Self::Extraction(ExtractionError::InvalidUtf8(_) | ExtractionError::Rejected { .. }) => {
                ErrorClass::Extraction
            }
            Self::Extraction(ExtractionError::Http(_))
            | Self::Embedding(_)
            | Self::Index(_)
            | Self::StaleCleanup(_) => ErrorClass::Upstream,
        }
    }

    /// Whether the caller supplied an unusable document.
    pub fn is_client_error(&self) -> bool {
        self.class() == ErrorClass::Input
    }
}

/// Errors emitted by the query pipeline.
///
/// Only [`QueryError::EmptyQuestion`] is returned synchronously; everything else surfaces as a
/// single [`QueryEvent::Error`] once the answer stream has opened.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Question was missing or blank.
    #[error("No query provided")]
    EmptyQuestion,
    /// Embedding provider failed for the question.
    #[error("Failed to embed the question: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Similarity search failed.
    #[error("Failed to search the vector index: {0}")]
    Index(#[from] QdrantError),
    /// The index returned nothing to answer from.
    #[error("No relevant documents found. Ingest documents before asking questions.")]
    NoContext,
    /// Reranking failed.
    #[error("Failed to rerank candidates: {0}")]
    Rerank(#[from] RerankError),
    /// Generation failed to start or broke off mid-stream.
    #[error("Failed to generate an answer: {0}")]
    Generation(#[from] GenerationError),
    /// Generation finished without producing any text.
    #[error("The language model returned an empty answer")]
    EmptyAnswer,
}

impl QueryError {
    /// Classify the error for reporting.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::EmptyQuestion => ErrorClass::Input,
            _ => ErrorClass::Upstream,
        }
    }
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Source identifier of the ingested document.
    pub source: String,
    /// Number of chunks written to the index.
    pub chunks: usize,
}

impl IngestOutcome {
    /// Human-readable confirmation.
    pub fn message(&self) -> String {
        format!(
            "Successfully ingested {} chunks from {}.",
            self.chunks, self.source
        )
    }
}

/// A numbered reference to the source text supporting an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based sequence number matching the inline markers in the answer.
    pub id: usize,
    /// Exact chunk text supplied to the model.
    pub source_text: String,
    /// Source identifier of the originating document.
    pub source: String,
    /// Position of the chunk within its document.
    pub position: usize,
}

/// One message of a streamed answer, serialised as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum QueryEvent {
    /// Generated answer fragment.
    Chunk(String),
    /// Terminal list of citations, sent after the last fragment.
    Citations(Vec<Citation>),
    /// Terminal error description.
    Error(String),
}

impl QueryEvent {
    /// Encode the event as one newline-terminated JSON line.
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Reachability of the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    /// Whether the index answered and the collection exists.
    pub index_reachable: bool,
}
