//! HTTP surface for Rusty RAG.
//!
//! A compact Axum router over [`RagApi`]:
//!
//! - `POST /ingest` – Multipart upload with a `file` field (`.txt`, `.md`, `.pdf`). Returns
//!   `{ "message", "chunks", "source" }`.
//! - `POST /ingest/text` – JSON `{ "text", "source" }` for callers that already hold plain text.
//! - `POST /query` – JSON `{ "query" }`. Streams `application/x-ndjson` lines tagged
//!   `chunk`, `citations` or `error`. A blank question is a 400 and no stream is opened.
//! - `GET /health` – Vector index reachability.
//! - `GET /metrics` – Ingestion and query counters.
//!
//! Errors are JSON bodies `{ "error": "<message>" }`: rejected input is a 400, undecodable
//! documents a 422 and collaborator failures a 502.

use crate::extraction::Document;
use crate::processing::{ErrorClass, IngestError, IngestOutcome, QueryError, QueryEvent, RagApi};
use axum::{
    Json, Router,
    body::Body,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
const DEFAULT_TEXT_SOURCE: &str = "inline.txt";
const ENCODING_FAILED_LINE: &str = "{\"type\":\"error\",\"data\":\"Failed to encode answer\"}\n";

/// Build the HTTP router; uploads larger than `max_upload_bytes` are rejected.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/ingest", post(ingest_upload::<S>))
        .route("/ingest/text", post(ingest_text::<S>))
        .route("/query", post(query::<S>))
        .route("/health", get(health::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Success response for both ingestion endpoints.
#[derive(Serialize)]
struct IngestResponse {
    message: String,
    chunks: usize,
    source: String,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            message: outcome.message(),
            chunks: outcome.chunks,
            source: outcome.source,
        }
    }
}

/// Ingest an uploaded file.
async fn ingest_upload<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<IngestResponse>, AppError>
where
    S: RagApi,
{
    let mut multipart = multipart?;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(base_name).unwrap_or_default();
        let content = field.bytes().await?;
        upload = Some((filename, content));
        break;
    }

    let Some((filename, content)) = upload else {
        return Err(AppError::bad_request("No file part in the request"));
    };
    if filename.is_empty() {
        return Err(AppError::bad_request("No file selected"));
    }

    let document = Document::from_upload(&filename, content.to_vec()).map_err(IngestError::from)?;
    let outcome = service.ingest(document).await?;
    tracing::info!(source = %outcome.source, chunks = outcome.chunks, "Upload ingested");
    Ok(Json(outcome.into()))
}

/// Request body for `POST /ingest/text`.
#[derive(Deserialize)]
struct TextIngestRequest {
    text: String,
    #[serde(default)]
    source: Option<String>,
}

/// Ingest plain text supplied in the request body.
async fn ingest_text<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<TextIngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError>
where
    S: RagApi,
{
    let Json(request) = request?;
    let source = request
        .source
        .filter(|source| !source.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TEXT_SOURCE.to_string());
    let outcome = service
        .ingest(Document::from_text(source, request.text))
        .await?;
    Ok(Json(outcome.into()))
}

/// Request body for `POST /query`.
#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: Option<String>,
}

/// Stream an answer as newline-delimited JSON.
///
/// A missing or unparsable body is treated like an empty question.
async fn query<S>(
    State(service): State<Arc<S>>,
    request: Option<Json<QueryRequest>>,
) -> Result<Response, AppError>
where
    S: RagApi,
{
    let question = request
        .and_then(|Json(request)| request.query)
        .unwrap_or_default();
    let answer = service.answer(&question)?;
    let request_id = Uuid::new_v4();
    tracing::info!(%request_id, chars = question.chars().count(), "Answer stream opened");

    let lines = answer.map(|event| Ok::<_, Infallible>(encode_event(&event)));
    Ok((
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response())
}

fn encode_event(event: &QueryEvent) -> String {
    event.to_ndjson().unwrap_or_else(|error| {
        tracing::error!(error = %error, "Failed to encode answer event");
        ENCODING_FAILED_LINE.to_string()
    })
}

/// Report vector index reachability.
async fn health<S>(State(service): State<Arc<S>>) -> Json<serde_json::Value>
where
    S: RagApi,
{
    let snapshot = service.health().await;
    let status = if snapshot.index_reachable {
        "healthy"
    } else {
        "degraded"
    };
    Json(json!({
        "status": status,
        "index_reachable": snapshot.index_reachable,
    }))
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: RagApi,
{
    Json(service.metrics_snapshot())
}

/// Strip any client-supplied directory components from an upload name.
fn base_name(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Input => StatusCode::BAD_REQUEST,
        ErrorClass::Extraction => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorClass::Upstream => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(inner: IngestError) -> Self {
        Self {
            status: status_for(inner.class()),
            message: inner.to_string(),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(inner: QueryError) -> Self {
        Self {
            status: status_for(inner.class()),
            message: inner.to_string(),
        }
    }
}

impl From<MultipartRejection> for AppError {
    fn from(inner: MultipartRejection) -> Self {
        Self {
            status: inner.status(),
            message: inner.body_text(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(inner: JsonRejection) -> Self {
        Self {
            status: inner.status(),
            message: inner.body_text(),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self {
            status: inner.status(),
            message: inner.body_text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::embedding::EmbeddingClientError;
    use crate::extraction::Document;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        AnswerStream, Citation, HealthSnapshot, IngestError, IngestOutcome, QueryError,
        QueryEvent, RagApi,
    };
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "rustyragboundary";

    enum IngestBehavior {
        Succeed,
        NoContent,
        EmbeddingDown,
    }

    struct StubRagService {
        ingested: Mutex<Vec<String>>,
        questions: Mutex<Vec<String>>,
        ingest: IngestBehavior,
        events: Vec<QueryEvent>,
        reachable: bool,
    }

    impl StubRagService {
        fn new() -> Self {
            Self {
                ingested: Mutex::new(Vec::new()),
                questions: Mutex::new(Vec::new()),
                ingest: IngestBehavior::Succeed,
                events: vec![
                    QueryEvent::Chunk("Rust is ".into()),
                    QueryEvent::Chunk("fast [1].".into()),
                    QueryEvent::Citations(vec![Citation {
                        id: 1,
                        source_text: "Rust is fast.".into(),
                        source: "rust.md".into(),
                        position: 0,
                    }]),
                ],
                reachable: true,
            }
        }
    }

    #[async_trait]
    impl RagApi for StubRagService {
        async fn ingest(&self, document: Document) -> Result<IngestOutcome, IngestError> {
            let source = document.source().to_string();
            self.ingested.lock().await.push(source.clone());
            match self.ingest {
                IngestBehavior::Succeed => Ok(IngestOutcome { source, chunks: 5 }),
                IngestBehavior::NoContent => Err(IngestError::NoContent { document: source }),
                IngestBehavior::EmbeddingDown => Err(IngestError::Embedding(
                    EmbeddingClientError::GenerationFailed("model not loaded".into()),
                )),
            }
        }

        fn answer(&self, question: &str) -> Result<AnswerStream, QueryError> {
            if question.trim().is_empty() {
                return Err(QueryError::EmptyQuestion);
            }
            if let Ok(mut questions) = self.questions.try_lock() {
                questions.push(question.to_string());
            }
            Ok(Box::pin(futures_util::stream::iter(self.events.clone())))
        }

        async fn health(&self) -> HealthSnapshot {
            HealthSnapshot {
                index_reachable: self.reachable,
            }
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_ingested: 2,
                chunks_ingested: 9,
                ..MetricsSnapshot::default()
            }
        }
    }

    fn router(service: Arc<StubRagService>) -> Router {
        create_router(service, 1024 * 1024)
    }

    fn multipart_request(field: &str, filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             {content}\r\n\
             --{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method(Method::POST)
            .uri("/ingest")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    fn json_request(uri: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    #[tokio::test]
    async fn upload_is_ingested_under_its_file_name() {
        let service = Arc::new(StubRagService::new());
        let response = router(service.clone())
            .oneshot(multipart_request("file", "docs/guide.txt", "Some text."))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Successfully ingested 5 chunks from guide.txt.");
        assert_eq!(json["chunks"], 5);
        assert_eq!(*service.ingested.lock().await, vec!["guide.txt".to_string()]);
    }

    #[tokio::test]
    async fn upload_without_file_part_is_rejected() {
        let service = Arc::new(StubRagService::new());
        let response = router(service.clone())
            .oneshot(multipart_request("attachment", "guide.txt", "Some text."))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "No file part in the request");
        assert!(service.ingested.lock().await.is_empty());
    }

    #[tokio::test]
    async fn upload_with_empty_file_name_is_rejected() {
        let service = Arc::new(StubRagService::new());
        let response = router(service)
            .oneshot(multipart_request("file", "", "Some text."))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "No file selected");
    }

    #[tokio::test]
    async fn unsupported_upload_never_reaches_the_pipeline() {
        let service = Arc::new(StubRagService::new());
        let response = router(service.clone())
            .oneshot(multipart_request("file", "slides.pptx", "binary"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap_or_default().contains("Unsupported file type"));
        assert!(service.ingested.lock().await.is_empty());
    }

    #[tokio::test]
    async fn ingest_errors_map_to_status_codes() {
        let service = Arc::new(StubRagService {
            ingest: IngestBehavior::NoContent,
            ..StubRagService::new()
        });
        let response = router(service)
            .oneshot(json_request("/ingest/text", json!({ "text": "  ", "source": "blank.txt" })))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let service = Arc::new(StubRagService {
            ingest: IngestBehavior::EmbeddingDown,
            ..StubRagService::new()
        });
        let response = router(service)
            .oneshot(json_request("/ingest/text", json!({ "text": "Some text." })))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(
            body_json(response).await["error"]
                .as_str()
                .unwrap_or_default()
                .contains("model not loaded")
        );
    }

    #[tokio::test]
    async fn malformed_ingest_requests_get_json_errors() {
        let service = Arc::new(StubRagService::new());
        let not_multipart = Request::builder()
            .method(Method::POST)
            .uri("/ingest")
            .header("content-type", "text/plain")
            .body(Body::from("Some text."))
            .expect("request");
        let response = router(service.clone())
            .oneshot(not_multipart)
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());

        let broken_json = Request::builder()
            .method(Method::POST)
            .uri("/ingest/text")
            .header("content-type", "application/json")
            .body(Body::from("{\"text\": "))
            .expect("request");
        let response = router(service.clone())
            .oneshot(broken_json)
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());

        let response = router(service.clone())
            .oneshot(json_request("/ingest/text", json!({ "source": "a.txt" })))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_json(response).await["error"].is_string());

        assert!(service.ingested.lock().await.is_empty());
    }

    #[tokio::test]
    async fn text_ingest_defaults_the_source() {
        let service = Arc::new(StubRagService::new());
        let response = router(service.clone())
            .oneshot(json_request("/ingest/text", json!({ "text": "Some text." })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*service.ingested.lock().await, vec!["inline.txt".to_string()]);
    }

    #[tokio::test]
    async fn blank_query_is_rejected_without_a_stream() {
        let service = Arc::new(StubRagService::new());
        for payload in [json!({ "query": "   " }), json!({})] {
            let response = router(service.clone())
                .oneshot(json_request("/query", payload))
                .await
                .expect("router response");

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(response).await, json!({ "error": "No query provided" }));
        }
        assert!(service.questions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn query_streams_ndjson_with_citations_last() {
        let service = Arc::new(StubRagService::new());
        let response = router(service)
            .oneshot(json_request("/query", json!({ "query": "What is Rust?" })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/x-ndjson"
        );
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let lines: Vec<Value> = std::str::from_utf8(&body)
            .expect("utf8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], json!({ "type": "chunk", "data": "Rust is " }));
        assert_eq!(lines[2]["type"], "citations");
        assert_eq!(lines[2]["data"][0]["id"], 1);
        assert_eq!(lines[2]["data"][0]["source_text"], "Rust is fast.");
    }

    #[tokio::test]
    async fn health_reports_degraded_index() {
        let service = Arc::new(StubRagService {
            reachable: false,
            ..StubRagService::new()
        });
        let response = router(service)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("access-control-allow-origin"));
        assert_eq!(
            body_json(response).await,
            json!({ "status": "degraded", "index_reachable": false })
        );
    }

    #[tokio::test]
    async fn metrics_route_returns_counters() {
        let response = router(Arc::new(StubRagService::new()))
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        let json = body_json(response).await;
        assert_eq!(json["documents_ingested"], 2);
        assert_eq!(json["chunks_ingested"], 9);
    }
}
