//! Ingestion pipeline: extract, chunk, embed, and write one batch to the vector index.

use crate::{
    config::IngestMode,
    embedding::{EmbeddingClient, EmbeddingClientError, EmbeddingMode},
    extraction::{Document, TextExtractor},
    index::{IndexRecord, RecordPayload, VectorIndex},
    metrics::PipelineMetrics,
    processing::{
        chunking::{Chunk, Chunker},
        types::{IngestError, IngestOutcome},
    },
    qdrant::{
        compute_chunk_hash,
        payload::{chunk_id, current_timestamp_rfc3339},
        record_id,
    },
};
use std::sync::Arc;

/// Turns documents into indexed records.
#[derive(Clone)]
pub struct IngestionPipeline {
    extractor: Arc<dyn TextExtractor>,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    mode: IngestMode,
    metrics: Arc<PipelineMetrics>,
}

impl IngestionPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            extractor,
            chunker,
            embedder,
            index,
            batch_size: usize::MAX,
            mode: IngestMode::Source,
            metrics,
        }
    }

    /// Limit the number of texts sent per embedding request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Choose how existing records are treated.
    pub fn with_mode(mut self, mode: IngestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Ingest one document and report how many chunks were written.
    ///
    /// Nothing is written when extraction fails or the text yields no chunks. A failed batch write
    /// leaves the index in an unknown state.
    pub async fn ingest(&self, document: Document) -> Result<IngestOutcome, IngestError> {
        let result = self.run(document).await;
        match &result {
            Ok(outcome) => self.metrics.record_document(outcome.chunks as u64),
            Err(error) => {
                self.metrics.record_ingest_failure();
                tracing::warn!(error = %error, "Ingestion failed");
            }
        }
        result
    }

    async fn run(&self, document: Document) -> Result<IngestOutcome, IngestError> {
        let source = document.source().to_string();
        tracing::info!(source = %source, format = ?document.format(), "Ingesting document");

        let text = self.extractor.extract(&document).await?;
        drop(document);

        let chunks: Vec<Chunk> = self.chunker.split(&source, &text).collect();
        if chunks.is_empty() {
            return Err(IngestError::NoContent { document: source });
        }
        tracing::debug!(
            source = %source,
            chunks = chunks.len(),
            chunk_size = self.chunker.chunk_size(),
            overlap = self.chunker.overlap(),
            "Document chunked"
        );

        let vectors = self.embed_chunks(&chunks).await?;
        let ingested_at = current_timestamp_rfc3339();
        let records: Vec<IndexRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| to_record(chunk, vector, &ingested_at))
            .collect();
        let count = records.len();

        if self.mode == IngestMode::Replace {
            self.index.clear().await?;
            tracing::debug!("Cleared index before replace ingestion");
        }
        self.index.upsert(records).await?;
        if self.mode == IngestMode::Source {
            self.index
                .remove_stale(&source, count)
                .await
                .map_err(IngestError::StaleCleanup)?;
        }

        tracing::info!(source = %source, chunks = count, mode = ?self.mode, "Document indexed");
        Ok(IngestOutcome {
            source,
            chunks: count,
        })
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, IngestError> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts = batch.iter().map(|chunk| chunk.text().to_string()).collect();
            let embedded = self.embedder.embed(texts, EmbeddingMode::Document).await?;
            if embedded.len() != batch.len() {
                return Err(EmbeddingClientError::CountMismatch {
                    expected: batch.len(),
                    actual: embedded.len(),
                }
                .into());
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}

fn to_record(chunk: Chunk, vector: Vec<f32>, ingested_at: &str) -> IndexRecord {
    let position = chunk.position();
    let source = chunk.source().to_string();
    let text = chunk.into_text();
    IndexRecord {
        id: record_id(&source, position),
        vector,
        payload: RecordPayload {
            chunk_id: chunk_id(position),
            chunk_hash: compute_chunk_hash(&text),
            text,
            source,
            position,
            ingested_at: ingested_at.to_string(),
        },
    }
}
