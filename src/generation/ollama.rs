//! Ollama `/api/generate` newline-delimited JSON streaming.

use super::{FragmentStream, GenerationClient, GenerationError, ensure_success, lines::split_lines};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::{StreamExt, pin_mut};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Streaming client for a local Ollama runtime.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaGenerationClient {
    /// Construct a client for the given runtime URL and model.
    pub fn new(base_url: String, model: String, temperature: f32) -> Result<Self, GenerationError> {
        let http = Client::builder().user_agent("rusty-rag/generate").build()?;
        Ok(Self {
            http,
            base_url,
            model,
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn stream_complete(&self, prompt: String) -> Result<FragmentStream, GenerationError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": true,
            "options": {
                "temperature": self.temperature,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                tracing::error!(url = %self.base_url, error = %error, "Failed to reach Ollama");
                GenerationError::Http(error)
            })?;
        let response = ensure_success(response).await?;

        Ok(Box::pin(generate_fragments(split_lines(response.bytes_stream()))))
    }
}

fn generate_fragments<S>(lines: S) -> impl Stream<Item = Result<String, GenerationError>> + Send
where
    S: Stream<Item = Result<String, GenerationError>> + Send + 'static,
{
    try_stream! {
        pin_mut!(lines);
        while let Some(line) = lines.next().await {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let chunk: GenerateChunk = serde_json::from_str(&line)
                .map_err(|error| GenerationError::InvalidResponse(format!("{error}: {line}")))?;
            if let Some(message) = chunk.error {
                Err::<(), _>(GenerationError::Provider(message))?;
            }
            if !chunk.response.is_empty() {
                yield chunk.response;
            }
            if chunk.done {
                break;
            }
        }
    }
}
