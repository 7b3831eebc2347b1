//! Filter builders for Qdrant delete operations.

use serde_json::{Value, json};

/// Match every record of a source whose position is at or beyond `from_position`.
pub fn stale_chunks_filter(source: &str, from_position: usize) -> Value {
    json!({
        "must": [
            {
                "key": "source",
                "match": { "value": source }
            },
            {
                "key": "position",
                "range": { "gte": from_position }
            }
        ]
    })
}

/// Match every record in the collection.
pub fn match_all() -> Value {
    json!({ "must": [] })
}
