#![deny(missing_docs)]

//! Core library for the Rusty RAG server: document ingestion and streamed, cited answers.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Document format detection and text extraction.
pub mod extraction;
/// Streaming text generation clients.
pub mod generation;
/// Vector index contract and record types.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Chunking, ingestion, and query pipelines.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Candidate reranking clients.
pub mod rerank;
