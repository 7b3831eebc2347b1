//! HTTP client wrapper for interacting with Qdrant.

use crate::config::Config;
use crate::index::{IndexRecord, RecordPayload, RetrievedCandidate, VectorIndex};
use crate::qdrant::{
    filters::{match_all, stale_chunks_filter},
    types::{QdrantError, QueryPoint, QueryResponse, QueryResponseResult},
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// Lightweight HTTP client for the corpus collection in Qdrant.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection: String,
    pub(crate) vector_size: usize,
}

impl QdrantService {
    /// Construct a new client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("rusty-rag/0.1").build()?;

        let base_url = normalize_base_url(&config.qdrant_url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection = %config.qdrant_collection_name,
            has_api_key = %config
                .qdrant_api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: config.qdrant_api_key.clone(),
            collection: config.qdrant_collection_name.clone(),
            vector_size: config.embedding_dimension,
        })
    }

    /// Name of the collection this client writes to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection only when it is missing from Qdrant.
    pub async fn create_collection_if_not_exists(&self) -> Result<(), QdrantError> {
        if self.collection_exists().await? {
            return Ok(());
        }

        tracing::info!(
            collection = %self.collection,
            vector_size = self.vector_size,
            "Creating collection"
        );
        self.create_collection().await
    }

    /// Create the collection with cosine distance and the configured vector size.
    pub async fn create_collection(&self) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": self.vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, "Collection created");
        })
        .await
    }

    /// Ensure payload indexes exist for the fields used in delete filters.
    pub async fn ensure_payload_indexes(&self) -> Result<(), QdrantError> {
        let fields: [(&str, &str); 2] = [("source", "keyword"), ("position", "integer")];

        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(
                    Method::PUT,
                    &format!("collections/{}/index", self.collection),
                )?
                .query(&[("wait", true)])
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() || status == StatusCode::CONFLICT {
                tracing::debug!(collection = %self.collection, field, schema, "Payload index ensured");
            } else {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::warn!(collection = %self.collection, field, schema, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    /// Report whether the collection exists.
    pub async fn collection_exists(&self) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    /// Upload all records in a single request, waiting for Qdrant to apply them.
    pub async fn upsert_points(&self, records: Vec<IndexRecord>) -> Result<(), QdrantError> {
        if records.is_empty() {
            return Ok(());
        }

        let point_count = records.len();
        let points: Vec<Value> = records
            .into_iter()
            .map(|record| {
                json!({
                    "id": record.id,
                    "vector": record.vector,
                    "payload": record.payload,
                })
            })
            .collect();

        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, points = point_count, "Points upserted");
        })
        .await
    }

    /// Perform a similarity search, returning candidates that carry chunk text.
    pub async fn search_points(
        &self,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<RetrievedCandidate>, QdrantError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points.into_iter().filter_map(map_query_point).collect())
    }

    /// Delete every point matching `filter`.
    pub async fn delete_points(&self, filter: Value) -> Result<(), QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "filter": filter }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, "Points deleted");
        })
        .await
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, QdrantError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantService {
    async fn ensure_ready(&self) -> Result<(), QdrantError> {
        self.create_collection_if_not_exists().await?;
        self.ensure_payload_indexes().await
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<(), QdrantError> {
        self.upsert_points(records).await
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<RetrievedCandidate>, QdrantError> {
        self.search_points(vector, top_k).await
    }

    async fn remove_stale(&self, source: &str, keep_below: usize) -> Result<(), QdrantError> {
        self.delete_points(stale_chunks_filter(source, keep_below))
            .await
    }

    async fn clear(&self) -> Result<(), QdrantError> {
        self.delete_points(match_all()).await
    }

    async fn ping(&self) -> Result<bool, QdrantError> {
        self.collection_exists().await
    }
}

fn map_query_point(point: QueryPoint) -> Option<RetrievedCandidate> {
    let id = stringify_point_id(point.id);
    let payload = point.payload?;
    match serde_json::from_value::<RecordPayload>(Value::Object(payload)) {
        Ok(record) if !record.text.trim().is_empty() => Some(RetrievedCandidate {
            id,
            score: point.score,
            text: record.text,
            source: record.source,
            position: record.position,
        }),
        Ok(_) => {
            tracing::warn!(id = %id, "Skipping search hit with empty text");
            None
        }
        Err(error) => {
            tracing::warn!(id = %id, error = %error, "Skipping search hit with malformed payload");
            None
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

pub(crate) fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Object(map) => map
            .get("uuid")
            .map(|value| match value {
                Value::String(uuid) => uuid.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| Value::Object(map).to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };

    fn service(server: &MockServer) -> QdrantService {
        QdrantService {
            client: Client::builder()
                .user_agent("rusty-rag-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            api_key: None,
            collection: "demo".into(),
            vector_size: 2,
        }
    }

    fn record(position: usize, text: &str) -> IndexRecord {
        IndexRecord {
            id: crate::qdrant::record_id("doc.txt", position),
            vector: vec![0.1, 0.2],
            payload: RecordPayload {
                chunk_id: format!("chunk_{position}"),
                text: text.into(),
                source: "doc.txt".into(),
                position,
                chunk_hash: crate::qdrant::compute_chunk_hash(text),
                ingested_at: "2025-01-01T00:00:00Z".into(),
            },
        }
    }

    #[tokio::test]
    async fn search_points_maps_payloads_and_skips_textless_hits() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/query")
                    .json_body(json!({
                        "query": [0.5, 0.25],
                        "limit": 10,
                        "with_payload": true
                    }));
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": "a",
                                "score": 0.9,
                                "payload": {
                                    "chunk_id": "chunk_0",
                                    "text": "Rust is a systems language.",
                                    "source": "doc.txt",
                                    "position": 0
                                }
                            },
                            { "id": 7, "score": 0.5, "payload": { "source": "doc.txt" } }
                        ]
                    }
                }));
            })
            .await;

        let hits = service(&server)
            .search(vec![0.5, 0.25], 10)
            .await
            .expect("search request");

        mock.assert_async().await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].text, "Rust is a systems language.");
        assert_eq!(hits[0].source, "doc.txt");
        assert_eq!(hits[0].position, 0);
    }

    #[tokio::test]
    async fn upsert_sends_one_batch_with_payload() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/demo/points")
                    .query_param("wait", "true")
                    .body_contains("\"chunk_id\":\"chunk_0\"")
                    .body_contains("\"chunk_id\":\"chunk_1\"");
                then.status(200).json_body(json!({ "status": "ok", "result": {} }));
            })
            .await;

        service(&server)
            .upsert(vec![record(0, "alpha"), record(1, "beta")])
            .await
            .expect("upsert");

        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn upsert_failure_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/demo/points");
                then.status(400).body("wrong vector size");
            })
            .await;

        let error = service(&server)
            .upsert(vec![record(0, "alpha")])
            .await
            .expect_err("upsert should fail");

        assert!(matches!(
            error,
            QdrantError::UnexpectedStatus { status, .. } if status == StatusCode::BAD_REQUEST
        ));
    }

    #[tokio::test]
    async fn remove_stale_deletes_by_source_and_position() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/delete")
                    .json_body(json!({ "filter": stale_chunks_filter("doc.txt", 3) }));
                then.status(200).json_body(json!({ "status": "ok", "result": {} }));
            })
            .await;

        service(&server)
            .remove_stale("doc.txt", 3)
            .await
            .expect("delete");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn ensure_ready_creates_missing_collection() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/demo");
                then.status(404).body("not found");
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/demo").json_body(json!({
                    "vectors": { "size": 2, "distance": "Cosine" }
                }));
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let indexes = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/demo/index");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        service(&server).ensure_ready().await.expect("ensure ready");

        exists.assert_async().await;
        create.assert_async().await;
        indexes.assert_hits_async(2).await;
    }

    #[test]
    fn stringify_point_id_handles_numbers_and_uuids() {
        assert_eq!(stringify_point_id(json!(42)), "42");
        assert_eq!(stringify_point_id(json!("abc")), "abc");
        assert_eq!(stringify_point_id(json!({ "uuid": "u-1" })), "u-1");
    }
}
