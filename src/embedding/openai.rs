//! OpenAI-compatible `/embeddings` adapter.

use super::{
    EmbeddingClient, EmbeddingClientError, EmbeddingMode, ModePrefixes, validate_embeddings,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

pub(crate) const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Embedding client for the OpenAI embeddings API and compatible servers.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    prefixes: ModePrefixes,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingClient {
    /// Construct a client; `base_url` includes the API version path (e.g. `.../v1`).
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        dimension: usize,
        prefixes: ModePrefixes,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder().user_agent("rusty-rag/embed").build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
            dimension,
            prefixes,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
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

        let mut request = self.http.post(self.endpoint()).json(&json!({
            "model": self.model,
            "input": input,
        }));
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = EmbeddingClientError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "OpenAI embedding request failed");
            return Err(error);
        }

        let EmbeddingsResponse { mut data } = response.json().await?;
        // The API documents `index`; ordering of `data` itself is not guaranteed.
        data.sort_by_key(|item| item.index);
        let embeddings: Vec<Vec<f32>> = data.into_iter().map(|item| item.embedding).collect();
        validate_embeddings(&embeddings, expected, self.dimension)?;
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn reorders_vectors_by_index_and_sends_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer sk-test");
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let client = OpenAiEmbeddingClient::new(
            format!("{}/v1", server.base_url()),
            Some("sk-test".into()),
            "text-embedding-3-small".into(),
            2,
            ModePrefixes::default(),
        )
        .expect("client");

        let vectors = client
            .embed(vec!["first".into(), "second".into()], EmbeddingMode::Document)
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }
}
