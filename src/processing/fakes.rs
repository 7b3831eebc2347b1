//! In-memory collaborators for pipeline tests.

use crate::{
    embedding::{EmbeddingClient, EmbeddingClientError, EmbeddingMode},
    generation::{FragmentStream, GenerationClient, GenerationError},
    index::{IndexRecord, RetrievedCandidate, VectorIndex},
    qdrant::QdrantError,
    rerank::{RerankError, RerankResult, Reranker},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

fn unavailable() -> QdrantError {
    QdrantError::UnexpectedStatus {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "index offline".into(),
    }
}

#[derive(Default)]
pub(crate) struct FakeEmbedder {
    pub calls: Mutex<Vec<(Vec<String>, EmbeddingMode)>>,
    pub fail: bool,
    pub drop_last: bool,
}

#[async_trait]
impl EmbeddingClient for FakeEmbedder {
    async fn embed(
        &self,
        texts: Vec<String>,
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.fail {
            return Err(EmbeddingClientError::GenerationFailed("model not loaded".into()));
        }
        let mut vectors: Vec<Vec<f32>> = texts
            .iter()
            .map(|text| vec![text.len() as f32, 1.0, 0.0, 0.0])
            .collect();
        if self.drop_last {
            vectors.pop();
        }
        self.calls.lock().await.push((texts, mode));
        Ok(vectors)
    }
}

#[derive(Default)]
pub(crate) struct MemoryIndex {
    pub upserts: Mutex<Vec<Vec<IndexRecord>>>,
    pub stale_calls: Mutex<Vec<(String, usize)>>,
    pub cleared: AtomicBool,
    pub candidates: Vec<RetrievedCandidate>,
    pub searches: Mutex<Vec<usize>>,
    pub fail_upsert: bool,
    pub fail_search: bool,
    pub fail_remove_stale: bool,
}

impl MemoryIndex {
    pub fn with_candidates(count: usize) -> Self {
        Self {
            candidates: (0..count)
                .map(|position| RetrievedCandidate {
                    id: format!("id-{position}"),
                    score: 1.0 - position as f32 / 10.0,
                    text: format!("candidate text {position}"),
                    source: "corpus.txt".into(),
                    position,
                })
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_ready(&self) -> Result<(), QdrantError> {
        Ok(())
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<(), QdrantError> {
        if self.fail_upsert {
            return Err(unavailable());
        }
        self.upserts.lock().await.push(records);
        Ok(())
    }

    async fn search(
        &self,
        _vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<RetrievedCandidate>, QdrantError> {
        if self.fail_search {
            return Err(unavailable());
        }
        self.searches.lock().await.push(top_k);
        Ok(self.candidates.iter().take(top_k).cloned().collect())
    }

    async fn remove_stale(&self, source: &str, keep_below: usize) -> Result<(), QdrantError> {
        if self.fail_remove_stale {
            return Err(unavailable());
        }
        self.stale_calls
            .lock()
            .await
            .push((source.to_string(), keep_below));
        Ok(())
    }

    async fn clear(&self) -> Result<(), QdrantError> {
        self.cleared.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> Result<bool, QdrantError> {
        Ok(!self.fail_search)
    }
}

/// Reverses the candidate order, mimicking a reranker that disagrees with the index.
#[derive(Default)]
pub(crate) struct ReversingReranker {
    pub requested_top_n: Mutex<Vec<usize>>,
    pub calls: Mutex<usize>,
}

#[async_trait]
impl Reranker for ReversingReranker {
    async fn rerank(
        &self,
        _query: &str,
        documents: Vec<String>,
        top_n: usize,
    ) -> Result<Vec<RerankResult>, RerankError> {
        *self.calls.lock().await += 1;
        self.requested_top_n.lock().await.push(top_n);
        Ok((0..documents.len())
            .rev()
            .take(top_n)
            .map(|original_index| RerankResult {
                original_index,
                relevance_score: original_index as f32,
            })
            .collect())
    }
}

/// Plays back a fixed list of fragments; `Err` entries become provider errors.
pub(crate) struct ScriptedGenerator {
    pub script: Vec<Result<&'static str, &'static str>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<&'static str, &'static str>>) -> Self {
        Self {
            script,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    async fn stream_complete(&self, prompt: String) -> Result<FragmentStream, GenerationError> {
        self.prompts.lock().await.push(prompt);
        let items: Vec<Result<String, GenerationError>> = self
            .script
            .iter()
            .map(|item| match item {
                Ok(text) => Ok(text.to_string()),
                Err(message) => Err(GenerationError::Provider(message.to_string())),
            })
            .collect();
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}

/// Yields one fragment and then waits forever, flagging when its stream is dropped.
pub(crate) struct EndlessGenerator {
    pub dropped: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationClient for EndlessGenerator {
    async fn stream_complete(&self, _prompt: String) -> Result<FragmentStream, GenerationError> {
        let flag = DropFlag(self.dropped.clone());
        Ok(Box::pin(async_stream::stream! {
            let _flag = flag;
            yield Ok::<_, GenerationError>("first".to_string());
            futures_util::future::pending::<()>().await;
        }))
    }
}
