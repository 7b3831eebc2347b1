//! Vector index contract shared by the ingestion and query pipelines.

use crate::qdrant::QdrantError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Metadata stored next to every indexed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Batch-local identifier (`chunk_<i>`).
    pub chunk_id: String,
    /// Exact chunk text; returned to the query pipeline as context.
    pub text: String,
    /// Source identifier of the originating document.
    pub source: String,
    /// Zero-based position of the chunk within its document.
    pub position: usize,
    /// SHA-256 hex digest of `text`.
    #[serde(default)]
    pub chunk_hash: String,
    /// RFC 3339 ingestion timestamp.
    #[serde(default)]
    pub ingested_at: String,
}

/// A chunk with its embedding, ready to be written under a unique id.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    /// Point identifier, unique within the batch.
    pub id: String,
    /// Embedding vector produced in document mode.
    pub vector: Vec<f32>,
    /// Stored metadata.
    pub payload: RecordPayload,
}

/// A record returned by similarity search, in the index's own ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedCandidate {
    /// Point identifier.
    pub id: String,
    /// Similarity score reported by the index.
    pub score: f32,
    /// Chunk text.
    pub text: String,
    /// Source identifier of the originating document.
    pub source: String,
    /// Position of the chunk within its document.
    pub position: usize,
}

/// Storage and similarity search for embedded chunks.
///
/// Implementations are external services with their own synchronization; callers never lock
/// around them.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the backing index when absent. Idempotent.
    async fn ensure_ready(&self) -> Result<(), QdrantError>;

    /// Write all records in a single batch call.
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<(), QdrantError>;

    /// Return up to `top_k` records ordered by descending similarity.
    async fn search(
        &self,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<RetrievedCandidate>, QdrantError>;

    /// Delete records of `source` whose position is `>= keep_below`.
    async fn remove_stale(&self, source: &str, keep_below: usize) -> Result<(), QdrantError>;

    /// Delete every record in the index.
    async fn clear(&self) -> Result<(), QdrantError>;

    /// Check that the index is reachable and present.
    async fn ping(&self) -> Result<bool, QdrantError>;
}
