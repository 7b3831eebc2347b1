//! Second-pass relevance ordering of retrieved candidates.

use crate::config::{Config, RerankProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by reranking providers.
#[derive(Debug, Error)]
pub enum RerankError {
    /// HTTP layer failed before a response was received.
    #[error("Rerank request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider answered with a non-success status.
    #[error("Reranker returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider referenced a document that was not submitted.
    #[error("Reranker returned index {index} for {len} documents")]
    IndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Number of submitted documents.
        len: usize,
    },
}

/// One reranked entry pointing back into the submitted document list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankResult {
    /// Position of the document in the submitted list.
    pub original_index: usize,
    /// Provider relevance score.
    pub relevance_score: f32,
}

/// Interface implemented by reranking backends.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Return at most `top_n` entries ordered by descending relevance.
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<String>,
        top_n: usize,
    ) -> Result<Vec<RerankResult>, RerankError>;
}

/// Keeps the vector index ordering and truncates to `top_n`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(
        &self,
        _query: &str,
        documents: Vec<String>,
        top_n: usize,
    ) -> Result<Vec<RerankResult>, RerankError> {
        let kept = documents.len().min(top_n);
        Ok((0..kept)
            .map(|original_index| RerankResult {
                original_index,
                relevance_score: 1.0 / (original_index as f32 + 1.0),
            })
            .collect())
    }
}

/// Client for Cohere's `/v1/rerank` endpoint and API-compatible servers.
pub struct CohereReranker {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    relevance_score: f32,
}

impl CohereReranker {
    /// Construct a client for the given endpoint and model.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
    ) -> Result<Self, RerankError> {
        let http = Client::builder().user_agent("rusty-rag/rerank").build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/rerank", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<String>,
        top_n: usize,
    ) -> Result<Vec<RerankResult>, RerankError> {
        if documents.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }
        let len = documents.len();
        let top_n = top_n.min(len);

        let mut request = self.http.post(self.endpoint()).json(&json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": top_n,
        }));
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = RerankError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Rerank request failed");
            return Err(error);
        }

        let RerankResponse { results } = response.json().await?;
        let mut ranked = Vec::with_capacity(results.len().min(top_n));
        for item in results.into_iter().take(top_n) {
            if item.index >= len {
                return Err(RerankError::IndexOutOfRange {
                    index: item.index,
                    len,
                });
            }
            ranked.push(RerankResult {
                original_index: item.index,
                relevance_score: item.relevance_score,
            });
        }
        Ok(ranked)
    }
}

/// Build the reranker selected by configuration.
pub fn build_reranker(config: &Config) -> Result<Arc<dyn Reranker>, RerankError> {
    let reranker: Arc<dyn Reranker> = match config.rerank_provider {
        RerankProvider::None => Arc::new(PassthroughReranker),
        RerankProvider::Cohere => Arc::new(CohereReranker::new(
            config.rerank_url.clone(),
            config.rerank_api_key.clone(),
            config.rerank_model.clone(),
        )?),
    };
    tracing::debug!(provider = ?config.rerank_provider, model = %config.rerank_model, "Built reranker");
    Ok(reranker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn docs(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("doc {i}")).collect()
    }

    fn cohere(server: &MockServer) -> CohereReranker {
        CohereReranker::new(server.base_url(), Some("co-key".into()), "rerank-english-v3.0".into())
            .expect("client")
    }

    #[tokio::test]
    async fn passthrough_handles_short_candidate_lists() {
        let results = PassthroughReranker
            .rerank("q", docs(2), 3)
            .await
            .expect("rerank");
        let indices: Vec<_> = results.iter().map(|r| r.original_index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn cohere_clamps_top_n_and_maps_indices() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/rerank")
                    .header("authorization", "Bearer co-key")
                    .json_body(json!({
                        "model": "rerank-english-v3.0",
                        "query": "what is rust?",
                        "documents": ["doc 0", "doc 1"],
                        "top_n": 2
                    }));
                then.status(200).json_body(json!({
                    "results": [
                        { "index": 1, "relevance_score": 0.9 },
                        { "index": 0, "relevance_score": 0.2 }
                    ]
                }));
            })
            .await;

        let results = cohere(&server)
            .rerank("what is rust?", docs(2), 3)
            .await
            .expect("rerank");

        mock.assert_async().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].original_index, 1);
        assert_eq!(results[1].original_index, 0);
    }

    #[tokio::test]
    async fn cohere_rejects_out_of_range_indices() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/rerank");
                then.status(200).json_body(json!({
                    "results": [ { "index": 5, "relevance_score": 0.9 } ]
                }));
            })
            .await;

        let error = cohere(&server)
            .rerank("q", docs(2), 3)
            .await
            .expect_err("invalid index");

        assert!(matches!(error, RerankError::IndexOutOfRange { index: 5, len: 2 }));
    }

    #[tokio::test]
    async fn cohere_skips_call_for_empty_candidates() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/rerank");
                then.status(500);
            })
            .await;

        let results = cohere(&server).rerank("q", Vec::new(), 3).await.expect("rerank");

        assert!(results.is_empty());
        mock.assert_hits_async(0).await;
    }
}
