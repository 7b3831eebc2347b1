//! Service wiring the pipelines to their collaborators.

use crate::{
    config::Config,
    embedding::{EmbeddingClientError, build_embedding_client},
    extraction::{Document, DocumentExtractor, ExtractionError},
    generation::{GenerationError, build_generation_client},
    index::VectorIndex,
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::Chunker,
        ingest::IngestionPipeline,
        query::{AnswerStream, QueryPipeline},
        types::{ChunkingError, HealthSnapshot, IngestError, IngestOutcome, QueryError},
    },
    qdrant::{QdrantError, QdrantService},
    rerank::{RerankError, build_reranker},
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building the service at startup.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Chunker parameters are invalid.
    #[error("Invalid chunking configuration: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding client could not be built.
    #[error("Failed to initialize embedding client: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector index could not be reached or created.
    #[error("Failed to prepare the vector index: {0}")]
    Index(#[from] QdrantError),
    /// Reranker could not be built.
    #[error("Failed to initialize reranker: {0}")]
    Rerank(#[from] RerankError),
    /// Generation client could not be built.
    #[error("Failed to initialize generation client: {0}")]
    Generation(#[from] GenerationError),
    /// Extractor could not be built.
    #[error("Failed to initialize document extractor: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Abstraction over the pipelines used by the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Ingest one document into the corpus.
    async fn ingest(&self, document: Document) -> Result<IngestOutcome, IngestError>;

    /// Open an answer stream for a question.
    fn answer(&self, question: &str) -> Result<AnswerStream, QueryError>;

    /// Report whether the vector index is reachable.
    async fn health(&self) -> HealthSnapshot;

    /// Retrieve the current metrics snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the ingestion and query pipelines for one corpus.
///
/// Build it once with [`RagService::setup`] before serving requests and share it through an
/// `Arc`.
pub struct RagService {
    ingestion: IngestionPipeline,
    query: QueryPipeline,
    index: Arc<dyn VectorIndex>,
    metrics: Arc<PipelineMetrics>,
}

impl RagService {
    /// Build all collaborators from configuration and make sure the index exists.
    pub async fn setup(config: &Config) -> Result<Self, SetupError> {
        let chunker = Chunker::new(
            config.text_splitter_chunk_size,
            config.text_splitter_chunk_overlap,
        )?;
        let embedder = build_embedding_client(config)?;
        let reranker = build_reranker(config)?;
        let generator = build_generation_client(config)?;
        let extractor = Arc::new(DocumentExtractor::new(config)?);

        let qdrant = QdrantService::new(config)?;
        tracing::debug!(collection = %qdrant.collection(), "Ensuring vector index");
        qdrant.ensure_ready().await?;
        let index: Arc<dyn VectorIndex> = Arc::new(qdrant);
        tracing::info!(collection = %config.qdrant_collection_name, "Vector index ready");

        let metrics = Arc::new(PipelineMetrics::new());
        let ingestion = IngestionPipeline::new(
            extractor,
            chunker,
            embedder.clone(),
            index.clone(),
            metrics.clone(),
        )
        .with_batch_size(config.embedding_batch_size)
        .with_mode(config.ingest_mode);
        let query = QueryPipeline::new(
            embedder,
            index.clone(),
            reranker,
            generator,
            config.retrieval_top_k,
            config.rerank_top_n,
            metrics.clone(),
        );

        Ok(Self {
            ingestion,
            query,
            index,
            metrics,
        })
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest(&self, document: Document) -> Result<IngestOutcome, IngestError> {
        self.ingestion.ingest(document).await
    }

    fn answer(&self, question: &str) -> Result<AnswerStream, QueryError> {
        self.query.answer(question)
    }

    async fn health(&self) -> HealthSnapshot {
        let index_reachable = match self.index.ping().await {
            Ok(present) => present,
            Err(error) => {
                tracing::warn!(error = %error, "Vector index health check failed");
                false
            }
        };
        HealthSnapshot { index_reachable }
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
