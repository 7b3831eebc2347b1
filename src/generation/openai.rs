//! OpenAI-compatible chat completions over server-sent events.

use super::{FragmentStream, GenerationClient, GenerationError, ensure_success, lines::split_lines};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::{StreamExt, pin_mut};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

pub(crate) const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Streaming client for `/chat/completions` (OpenAI, Groq, vLLM, llama.cpp server, ...).
pub struct OpenAiGenerationClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Deserialize, Default)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerationClient {
    /// Construct a client; `base_url` includes the API version path (e.g. `.../v1`).
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        temperature: f32,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder().user_agent("rusty-rag/generate").build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationClient for OpenAiGenerationClient {
    async fn stream_complete(&self, prompt: String) -> Result<FragmentStream, GenerationError> {
        let mut request = self.http.post(self.endpoint()).json(&json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "stream": true,
        }));
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(key);
        }
        let response = ensure_success(request.send().await?).await?;
        tracing::debug!(model = %self.model, "Chat completion stream opened");

        Ok(Box::pin(sse_fragments(split_lines(response.bytes_stream()))))
    }
}

fn sse_fragments<S>(lines: S) -> impl Stream<Item = Result<String, GenerationError>> + Send
where
    S: Stream<Item = Result<String, GenerationError>> + Send + 'static,
{
    try_stream! {
        pin_mut!(lines);
        while let Some(line) = lines.next().await {
            match parse_sse_line(&line?)? {
                SseLine::Fragment(text) => yield text,
                SseLine::Done => break,
                SseLine::Skip => {}
            }
        }
    }
}

fn parse_sse_line(line: &str) -> Result<SseLine, GenerationError> {
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, comments, and `event:`/`id:` fields carry no text.
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|error| GenerationError::InvalidResponse(format!("{error}: {data}")))?;
    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(GenerationError::Provider(message));
    }

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .unwrap_or_default();
    if content.is_empty() {
        Ok(SseLine::Skip)
    } else {
        Ok(SseLine::Fragment(content))
    }
}
