use std::env;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_COLLECTION_NAME: &str = "rag-app-index";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_RERANK_URL: &str = "https://api.cohere.com";
const DEFAULT_RERANK_MODEL: &str = "rerank-english-v3.0";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 100;
const DEFAULT_TOP_K: usize = 10;
const DEFAULT_TOP_N: usize = 3;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;
const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty RAG server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection holding the corpus.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Optional base URL override for the embedding API.
    pub embedding_url: Option<String>,
    /// Optional bearer token for the embedding API.
    pub embedding_api_key: Option<String>,
    /// Optional prefix applied to texts embedded in document mode.
    pub embedding_document_prefix: Option<String>,
    /// Optional prefix applied to texts embedded in query mode.
    pub embedding_query_prefix: Option<String>,
    /// Number of texts sent per embedding request during ingestion.
    pub embedding_batch_size: usize,
    /// Optional Ollama base URL shared by Ollama-backed collaborators.
    pub ollama_url: Option<String>,
    /// Reranking backend.
    pub rerank_provider: RerankProvider,
    /// Base URL of the Cohere-compatible rerank API.
    pub rerank_url: String,
    /// Optional bearer token for the rerank API.
    pub rerank_api_key: Option<String>,
    /// Rerank model identifier.
    pub rerank_model: String,
    /// Text generation backend.
    pub generation_provider: GenerationProvider,
    /// Optional base URL override for the generation API.
    pub generation_url: Option<String>,
    /// Optional bearer token for the generation API.
    pub generation_api_key: Option<String>,
    /// Generation model identifier.
    pub generation_model: String,
    /// Sampling temperature forwarded to the generation model.
    pub generation_temperature: f32,
    /// Optional Tika-compatible extraction server used for PDF uploads.
    pub extractor_url: Option<String>,
    /// Maximum chunk size in characters.
    pub text_splitter_chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub text_splitter_chunk_overlap: usize,
    /// Number of candidates fetched from the vector index per query.
    pub retrieval_top_k: usize,
    /// Number of candidates kept after reranking.
    pub rerank_top_n: usize,
    /// How re-ingestion treats records already in the index.
    pub ingest_mode: IngestMode,
    /// Request body limit applied to uploads.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// OpenAI-compatible embeddings API.
    OpenAI,
}

/// Supported reranking backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RerankProvider {
    /// Keep the vector index ordering and truncate to `top_n`.
    None,
    /// Cohere-compatible `/v1/rerank` endpoint.
    Cohere,
}

/// Supported text generation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationProvider {
    /// OpenAI-compatible chat completions API (OpenAI, Groq, vLLM, ...).
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// Policy applied to existing records when a document is ingested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestMode {
    /// Overwrite the records of the same source and trim its stale trailing chunks.
    Source,
    /// Clear the whole collection before writing the new document.
    Replace,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_COLLECTION_NAME.to_string()),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: parse_env("EMBEDDING_PROVIDER")?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: parse_env("EMBEDDING_DIMENSION")?,
            embedding_url: load_env_optional("EMBEDDING_URL"),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_document_prefix: load_env_raw("EMBEDDING_DOCUMENT_PREFIX"),
            embedding_query_prefix: load_env_raw("EMBEDDING_QUERY_PREFIX"),
            embedding_batch_size: parse_env_or("EMBEDDING_BATCH_SIZE", DEFAULT_EMBEDDING_BATCH_SIZE)?,
            ollama_url: load_env_optional("OLLAMA_URL"),
            rerank_provider: parse_env_or("RERANK_PROVIDER", RerankProvider::None)?,
            rerank_url: load_env_optional("RERANK_URL")
                .unwrap_or_else(|| DEFAULT_RERANK_URL.to_string()),
            rerank_api_key: load_env_optional("RERANK_API_KEY"),
            rerank_model: load_env_optional("RERANK_MODEL")
                .unwrap_or_else(|| DEFAULT_RERANK_MODEL.to_string()),
            generation_provider: parse_env("GENERATION_PROVIDER")?,
            generation_url: load_env_optional("GENERATION_URL"),
            generation_api_key: load_env_optional("GENERATION_API_KEY"),
            generation_model: load_env("GENERATION_MODEL")?,
            generation_temperature: parse_env_or("GENERATION_TEMPERATURE", DEFAULT_TEMPERATURE)?,
            extractor_url: load_env_optional("EXTRACTOR_URL"),
            text_splitter_chunk_size: parse_env_or("TEXT_SPLITTER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            text_splitter_chunk_overlap: parse_env_or(
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                DEFAULT_CHUNK_OVERLAP,
            )?,
            retrieval_top_k: parse_env_or("RETRIEVAL_TOP_K", DEFAULT_TOP_K)?,
            rerank_top_n: parse_env_or("RERANK_TOP_N", DEFAULT_TOP_N)?,
            ingest_mode: parse_env_or("INGEST_MODE", IngestMode::Source)?,
            max_upload_bytes: parse_env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that parsing alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".into()));
        }
        if self.text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        if self.text_splitter_chunk_overlap >= self.text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP (must be smaller than the chunk size)".into(),
            ));
        }
        if self.retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }
        if self.rerank_top_n == 0 {
            return Err(ConfigError::InvalidValue("RERANK_TOP_N".into()));
        }
        Ok(())
    }

    /// Base URL of the local Ollama runtime.
    pub fn ollama_base_url(&self) -> String {
        self.ollama_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

// Prefixes are meaningful with trailing whitespace, so they are read untrimmed.
fn load_env_raw(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<T, ConfigError> {
    load_env(key)?
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for RerankProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "cohere" => Ok(Self::Cohere),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "groq" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for IngestMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "source" => Ok(Self::Source),
            "replace" => Ok(Self::Replace),
            _ => Err(()),
        }
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
///
/// Call once from `main` before building any service. Subsequent calls return the cached value.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        embedding_provider = ?config.embedding_provider,
        rerank_provider = ?config.rerank_provider,
        generation_provider = ?config.generation_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        qdrant_url: "http://127.0.0.1:6333".into(),
        qdrant_collection_name: "test-collection".into(),
        qdrant_api_key: None,
        embedding_provider: EmbeddingProvider::Ollama,
        embedding_model: "nomic-embed-text".into(),
        embedding_dimension: 4,
        embedding_url: None,
        embedding_api_key: None,
        embedding_document_prefix: None,
        embedding_query_prefix: None,
        embedding_batch_size: 2,
        ollama_url: None,
        rerank_provider: RerankProvider::None,
        rerank_url: DEFAULT_RERANK_URL.into(),
        rerank_api_key: None,
        rerank_model: DEFAULT_RERANK_MODEL.into(),
        generation_provider: GenerationProvider::Ollama,
        generation_url: None,
        generation_api_key: None,
        generation_model: "llama3.1".into(),
        generation_temperature: DEFAULT_TEMPERATURE,
        extractor_url: None,
        text_splitter_chunk_size: DEFAULT_CHUNK_SIZE,
        text_splitter_chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        retrieval_top_k: DEFAULT_TOP_K,
        rerank_top_n: DEFAULT_TOP_N,
        ingest_mode: IngestMode::Source,
        max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        server_port: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!("Ollama".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Ollama));
        assert_eq!("groq".parse::<GenerationProvider>(), Ok(GenerationProvider::OpenAI));
        assert_eq!("COHERE".parse::<RerankProvider>(), Ok(RerankProvider::Cohere));
        assert_eq!("replace".parse::<IngestMode>(), Ok(IngestMode::Replace));
        assert!("pinecone".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn validate_rejects_overlap_not_smaller_than_chunk_size() {
        let mut config = test_config();
        config.text_splitter_chunk_overlap = config.text_splitter_chunk_size;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(message)) if message.starts_with("TEXT_SPLITTER_CHUNK_OVERLAP")
        ));
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let mut config = test_config();
        config.rerank_top_n = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.retrieval_top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn ollama_base_url_falls_back_to_local_runtime() {
        let mut config = test_config();
        assert_eq!(config.ollama_base_url(), DEFAULT_OLLAMA_URL);
        config.ollama_url = Some("http://gpu-box:11434".into());
        assert_eq!(config.ollama_base_url(), "http://gpu-box:11434");
    }
}
