//! Turning uploaded documents into plain text.
//!
//! Plain text passes through after UTF-8 validation. Structured formats are decoded by an
//! external extraction server speaking the Apache Tika `PUT /tika` protocol.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use std::path::Path;
use thiserror::Error;

/// Errors produced while extracting text from a document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File extension is not one of the supported formats.
    #[error("Unsupported file type '{0}'. Please upload a .txt, .md or .pdf file.")]
    UnsupportedFormat(String),
    /// Plain text upload was not valid UTF-8.
    #[error("Document is not valid UTF-8 text: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// Format is recognised but no extractor is configured for it.
    #[error("No extractor configured for {0} documents")]
    ExtractorUnavailable(&'static str),
    /// HTTP layer failed before the extractor answered.
    #[error("Extraction request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Extractor rejected the document.
    #[error("Error processing document ({status}): {body}")]
    Rejected {
        /// HTTP status returned by the extractor.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Native representation of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// UTF-8 text (`.txt`, `.md`).
    PlainText,
    /// Portable Document Format.
    Pdf,
}

impl DocumentFormat {
    /// Detect the format from a file name's extension.
    pub fn from_filename(name: &str) -> Option<Self> {
        let extension = Path::new(name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match extension.as_str() {
            "txt" | "text" | "md" | "markdown" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::PlainText => "plain text",
            Self::Pdf => "PDF",
        }
    }
}

/// A document awaiting ingestion. Exists only for the duration of one ingest call.
#[derive(Debug, Clone)]
pub struct Document {
    source: String,
    format: DocumentFormat,
    content: Vec<u8>,
}

impl Document {
    /// Wrap an uploaded file, rejecting unsupported extensions.
    pub fn from_upload(filename: &str, content: Vec<u8>) -> Result<Self, ExtractionError> {
        let format = DocumentFormat::from_filename(filename)
            .ok_or_else(|| ExtractionError::UnsupportedFormat(filename.to_string()))?;
        Ok(Self {
            source: filename.to_string(),
            format,
            content,
        })
    }

    /// Wrap text that is already decoded.
    pub fn from_text(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            format: DocumentFormat::PlainText,
            content: text.into().into_bytes(),
        }
    }

    /// Source identifier (file name or logical name).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Detected native format.
    pub fn format(&self) -> DocumentFormat {
        self.format
    }
}

/// Collaborator that turns a [`Document`] into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the document's text.
    async fn extract(&self, document: &Document) -> Result<String, ExtractionError>;
}

/// Decodes plain text locally and forwards PDFs to an optional Tika server.
pub struct DocumentExtractor {
    tika: Option<TikaClient>,
}

impl DocumentExtractor {
    /// Build an extractor from configuration.
    pub fn new(config: &Config) -> Result<Self, ExtractionError> {
        let tika = config
            .extractor_url
            .clone()
            .map(TikaClient::new)
            .transpose()?;
        Ok(Self { tika })
    }

    /// Extractor that only supports plain text.
    pub fn plain_text_only() -> Self {
        Self { tika: None }
    }
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract(&self, document: &Document) -> Result<String, ExtractionError> {
        match document.format {
            DocumentFormat::PlainText => Ok(String::from_utf8(document.content.clone())?),
            DocumentFormat::Pdf => match &self.tika {
                Some(tika) => tika.extract(document).await,
                None => Err(ExtractionError::ExtractorUnavailable(document.format.label())),
            },
        }
    }
}

struct TikaClient {
    http: Client,
    base_url: String,
}

impl TikaClient {
    fn new(base_url: String) -> Result<Self, ExtractionError> {
        let http = Client::builder().user_agent("rusty-rag/extract").build()?;
        Ok(Self { http, base_url })
    }

    async fn extract(&self, document: &Document) -> Result<String, ExtractionError> {
        let response = self
            .http
            .put(format!("{}/tika", self.base_url.trim_end_matches('/')))
            .header(header::ACCEPT, "text/plain")
            .header(header::CONTENT_TYPE, "application/pdf")
            .body(document.content.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(source = %document.source, %status, "Extractor rejected document");
            return Err(ExtractionError::Rejected { status, body });
        }

        let text = response.text().await?;
        tracing::debug!(source = %document.source, chars = text.chars().count(), "Extracted document text");
        Ok(text)
    }
}
