//! Query pipeline: embed, retrieve, rerank, assemble the prompt, and stream a cited answer.

use crate::{
    embedding::{EmbeddingClient, EmbeddingClientError, EmbeddingMode},
    generation::GenerationClient,
    index::VectorIndex,
    metrics::{PipelineMetrics, QueryOutcome},
    processing::{
        prompt::build_prompt,
        types::{Citation, QueryError, QueryEvent},
    },
    rerank::{RerankError, Reranker},
};
use futures_core::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::sync::Arc;

/// Messages of one answer: fragments, then exactly one terminal citations or error message.
pub type AnswerStream = Pin<Box<dyn Stream<Item = QueryEvent> + Send>>;

/// Answers questions from the indexed corpus.
#[derive(Clone)]
pub struct QueryPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    reranker: Arc<dyn Reranker>,
    generator: Arc<dyn GenerationClient>,
    top_k: usize,
    top_n: usize,
    metrics: Arc<PipelineMetrics>,
}

impl QueryPipeline {
    /// Assemble a pipeline from its collaborators and retrieval limits.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        reranker: Arc<dyn Reranker>,
        generator: Arc<dyn GenerationClient>,
        top_k: usize,
        top_n: usize,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            embedder,
            index,
            reranker,
            generator,
            top_k: top_k.max(1),
            top_n: top_n.max(1),
            metrics,
        }
    }

    /// Open an answer stream for `question`.
    ///
    /// A blank question is rejected here, before any external call. Every later failure is
    /// delivered as a single [`QueryEvent::Error`] that ends the stream. The stream is lazy:
    /// nothing runs until it is polled, and dropping it stops generation and releases the
    /// provider connection.
    pub fn answer(&self, question: &str) -> Result<AnswerStream, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let pipeline = self.clone();
        let question = question.to_string();
        let mut outcome = QueryOutcome::begin(self.metrics.clone());

        Ok(Box::pin(async_stream::stream! {
            let citations = match pipeline.retrieve_citations(&question).await {
                Ok(citations) => citations,
                Err(error) => {
                    yield fail(&mut outcome, error);
                    return;
                }
            };

            let prompt = build_prompt(&question, &citations);
            let mut fragments = match pipeline.generator.stream_complete(prompt).await {
                Ok(fragments) => fragments,
                Err(error) => {
                    yield fail(&mut outcome, error.into());
                    return;
                }
            };

            let mut emitted = 0usize;
            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(text) if text.is_empty() => {}
                    Ok(text) => {
                        emitted += 1;
                        yield QueryEvent::Chunk(text);
                    }
                    Err(error) => {
                        yield fail(&mut outcome, error.into());
                        return;
                    }
                }
            }
            drop(fragments);

            if emitted == 0 {
                yield fail(&mut outcome, QueryError::EmptyAnswer);
                return;
            }

            tracing::info!(fragments = emitted, citations = citations.len(), "Answer streamed");
            outcome.completed();
            yield QueryEvent::Citations(citations);
        }))
    }

    async fn retrieve_citations(&self, question: &str) -> Result<Vec<Citation>, QueryError> {
        let vector = self
            .embedder
            .embed(vec![question.to_string()], EmbeddingMode::Query)
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingClientError::CountMismatch {
                expected: 1,
                actual: 0,
            })?;

        let candidates = self.index.search(vector, self.top_k).await?;
        tracing::debug!(top_k = self.top_k, candidates = candidates.len(), "Retrieved candidates");
        if candidates.is_empty() {
            return Err(QueryError::NoContext);
        }

        let top_n = self.top_n.min(candidates.len());
        let documents = candidates
            .iter()
            .map(|candidate| candidate.text.clone())
            .collect();
        let ranked = self.reranker.rerank(question, documents, top_n).await?;

        let citations = ranked
            .into_iter()
            .take(top_n)
            .enumerate()
            .map(|(rank, result)| -> Result<Citation, QueryError> {
                let candidate = candidates.get(result.original_index).ok_or(
                    RerankError::IndexOutOfRange {
                        index: result.original_index,
                        len: candidates.len(),
                    },
                )?;
                Ok(Citation {
                    id: rank + 1,
                    source_text: candidate.text.clone(),
                    source: candidate.source.clone(),
                    position: candidate.position,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if citations.is_empty() {
            return Err(QueryError::NoContext);
        }
        tracing::debug!(top_n, citations = citations.len(), "Reranked candidates");
        Ok(citations)
    }
}

fn fail(outcome: &mut QueryOutcome, error: QueryError) -> QueryEvent {
    tracing::error!(error = %error, "Query failed");
    outcome.failed();
    QueryEvent::Error(error.to_string())
}
