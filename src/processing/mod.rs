//! Retrieval-augmented answering: chunking, ingestion, and the streamed query pipeline.

pub mod chunking;
#[cfg(test)]
mod fakes;
pub mod ingest;
pub mod prompt;
pub mod query;
mod service;
pub mod types;

pub use chunking::{Chunk, Chunker};
pub use ingest::IngestionPipeline;
pub use query::{AnswerStream, QueryPipeline};
pub use service::{RagApi, RagService, SetupError};
pub use types::{
    ChunkingError, Citation, ErrorClass, HealthSnapshot, IngestError, IngestOutcome, QueryError,
    QueryEvent,
};
