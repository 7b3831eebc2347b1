//! Helpers for deriving point ids, hashes, and timestamps stored with each chunk.

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Batch-local chunk identifier.
pub fn chunk_id(position: usize) -> String {
    format!("chunk_{position}")
}

/// Point id for the chunk at `position` of `source`.
///
/// Qdrant only accepts integers and UUIDs as ids, so the `<source>#chunk_<i>` key is mapped to a
/// name-based UUID. Re-ingesting a source overwrites its points in place while other sources keep
/// theirs.
pub fn record_id(source: &str, position: usize) -> String {
    let key = format!("{source}#{}", chunk_id(position));
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
