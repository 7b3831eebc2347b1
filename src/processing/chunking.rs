//! Character-budget chunking with boundary-aware cuts.
//!
//! Chunks are exact substrings of the input, produced lazily in document order:
//!
//! - Size: every chunk holds at most `chunk_size` characters (Unicode scalar values).
//! - Boundaries: a chunk ends after the last paragraph break, line break, sentence end or space
//!   inside its window, in that order of preference. A boundary is usable when the chunk ends past
//!   the previous chunk and is longer than the overlap; only without one is the cut a hard one.
//! - Overlap: the next chunk starts `overlap` characters before the previous end, moved back to
//!   the start of a word when that stays within twice the overlap.
//!
//! Dropping the first [`Chunk::overlap_len`] bytes of every chunk and concatenating the rest
//! yields the original text.

use super::types::ChunkingError;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Splits documents into overlapping, bounded-size chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker; `overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                overlap,
                chunk_size,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Maximum chunk length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap between consecutive chunks in characters.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily split `text`, tagging every chunk with `source`.
    ///
    /// Empty or whitespace-only text yields no chunks.
    pub fn split<'a>(&self, source: &'a str, text: &'a str) -> Chunks<'a> {
        Chunks {
            chunker: *self,
            source,
            text,
            cursor: 0,
            previous_end: 0,
            position: 0,
            finished: text.trim().is_empty(),
        }
    }
}

/// A contiguous, immutable segment of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    position: usize,
    source: String,
    text: String,
    start: usize,
    overlap_len: usize,
}

impl Chunk {
    /// Zero-based sequence position within the document.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Source identifier of the document.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Chunk text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Byte offset of the chunk within the document.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Length in bytes of the prefix shared with the previous chunk.
    pub fn overlap_len(&self) -> usize {
        self.overlap_len
    }

    /// The part of the chunk not already covered by its predecessor.
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap_len..]
    }

    /// Consume the chunk, returning its text.
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Iterator returned by [`Chunker::split`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    chunker: Chunker,
    source: &'a str,
    text: &'a str,
    cursor: usize,
    previous_end: usize,
    position: usize,
    finished: bool,
}

impl Chunks<'_> {
    fn cut_point(&self, start: usize, limit: usize) -> usize {
        let window = &self.text[start..limit];
        let min_chars = self.chunker.overlap + 1;
        for separator in SEPARATORS {
            if let Some(index) = window.rfind(separator) {
                let cut = start + index + separator.len();
                if cut > self.previous_end && self.text[start..cut].chars().count() >= min_chars {
                    return cut;
                }
            }
        }
        limit
    }

    fn next_start(&self, start: usize, end: usize) -> usize {
        let overlap = self.chunker.overlap;
        let next = retreat(self.text, end, overlap);
        if overlap == 0 {
            return next;
        }
        let at_word_start = self.text[..next]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if at_word_start {
            return next;
        }

        let max_overlap = (overlap * 2).min(self.chunker.chunk_size - 1);
        let floor = retreat(self.text, end, max_overlap).max(advance(self.text, start, 1));
        if floor >= next {
            return next;
        }
        self.text[floor..next]
            .char_indices()
            .rev()
            .find(|(_, character)| character.is_whitespace())
            .map_or(next, |(offset, character)| {
                floor + offset + character.len_utf8()
            })
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let start = self.cursor;
        let limit = advance(self.text, start, self.chunker.chunk_size);
        let end = if limit == self.text.len() {
            limit
        } else {
            self.cut_point(start, limit)
        };

        let chunk = Chunk {
            position: self.position,
            source: self.source.to_string(),
            text: self.text[start..end].to_string(),
            start,
            overlap_len: self.previous_end.saturating_sub(start),
        };

        if end == self.text.len() {
            self.finished = true;
        } else {
            self.cursor = self.next_start(start, end);
        }
        self.previous_end = end;
        self.position += 1;
        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

/// Byte offset `chars` characters after `from`, clamped to the end of `text`.
fn advance(text: &str, from: usize, chars: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(chars)
        .map_or(text.len(), |(offset, _)| from + offset)
}

/// Byte offset `chars` characters before `from`, clamped to the start of `text`.
fn retreat(text: &str, from: usize, chars: usize) -> usize {
    if chars == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .nth(chars - 1)
        .map_or(0, |(offset, _)| offset)
}
