//! Paragraph-boundary text chunker and token estimation.
//!
//! Splits source text into [`ContentChunk`]s of at most `max_tokens`
//! estimated tokens. Splitting prefers paragraph boundaries (`\n\n`) so each
//! chunk stays semantically coherent; a paragraph that is too large on its
//! own is re-flowed on word boundaries, and a single word larger than the
//! limit is cut on character boundaries.
//!
//! Each chunk carries a SHA-256 fingerprint of its text, used by the
//! retrieval engine to make re-ingestion idempotent.
//!
//! # Example
//!
//! ```rust
//! use research_harness_core::chunk::chunk_source;
//!
//! let chunks = chunk_source("notes.txt", "Hello world.\n\nSecond paragraph.", 250);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].source, "notes.txt");
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::ContentChunk;

/// Approximate characters-per-token ratio used for every budget in the
/// system (chunk sizes, context assembly).
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the model token count of `text` (`ceil(chars / 4)`).
///
/// Subadditive: the estimate of a concatenation never exceeds the sum of
/// the estimates of its parts, which is what lets context assembly budget
/// block by block.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Hex-encoded SHA-256 of `text`.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl ContentChunk {
    /// Build a chunk with a fresh UUID, fingerprint, and token estimate.
    pub fn new(source: &str, index: i64, text: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            index,
            text: text.to_string(),
            fingerprint: fingerprint(text),
            token_estimate: estimate_tokens(text),
        }
    }
}

/// Split `text` from `source` into chunks of at most `max_tokens`.
///
/// Whitespace-only input yields no chunks. Indices are contiguous from 0.
pub fn chunk_source(source: &str, text: &str, max_tokens: usize) -> Vec<ContentChunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_chars = para.chars().count();

        if para_chars > max_chars {
            flush(&mut pieces, &mut buf, &mut buf_chars);
            pieces.extend(reflow(para, max_chars));
            continue;
        }

        let joined = if buf.is_empty() {
            para_chars
        } else {
            buf_chars + 2 + para_chars
        };
        if joined > max_chars {
            flush(&mut pieces, &mut buf, &mut buf_chars);
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
            buf_chars += 2;
        }
        buf.push_str(para);
        buf_chars += para_chars;
    }
    flush(&mut pieces, &mut buf, &mut buf_chars);

    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| ContentChunk::new(source, i as i64, piece))
        .collect()
}

fn flush(pieces: &mut Vec<String>, buf: &mut String, buf_chars: &mut usize) {
    if !buf.is_empty() {
        pieces.push(std::mem::take(buf));
    }
    *buf_chars = 0;
}

/// Re-flow one oversized paragraph into word-boundary pieces.
fn reflow(para: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for word in para.split_whitespace() {
        let word_chars = word.chars().count();

        if word_chars > max_chars {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            out.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
            continue;
        }

        let needed = if current.is_empty() {
            word_chars
        } else {
            current_chars + 1 + word_chars
        };
        if needed > max_chars {
            out.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_chars += 1;
        }
        current.push_str(word);
        current_chars += word_chars;
    }

    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn estimate_counts_chars_not_bytes() {
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn fingerprint_depends_only_on_text() {
        let a = ContentChunk::new("a.txt", 0, "same text");
        let b = ContentChunk::new("b.txt", 3, "same text");
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.id, b.id);
        assert_ne!(a.fingerprint, fingerprint("other text"));
    }

    #[test]
    fn whitespace_only_yields_nothing() {
        assert!(chunk_source("doc", "", 100).is_empty());
        assert!(chunk_source("doc", "  \n\n\t\n\n ", 100).is_empty());
    }

    #[test]
    fn small_paragraphs_share_a_chunk() {
        let chunks = chunk_source("doc", "First.\n\nSecond.\n\nThird.", 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "First.\n\nSecond.\n\nThird.");
        assert_eq!(chunks[0].token_estimate, estimate_tokens(&chunks[0].text));
    }

    #[test]
    fn paragraphs_split_when_over_limit() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_source("doc", text, 7);
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i as i64);
            assert!(c.token_estimate <= 7);
        }
    }

    #[test]
    fn oversized_paragraph_is_reflowed_within_limit() {
        let text = (0..200).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let chunks = chunk_source("doc", &text, 10);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 40, "chunk too long: {}", c.text);
        }
    }

    #[test]
    fn giant_word_is_cut_on_char_boundaries() {
        let word = "┌".repeat(30);
        let chunks = chunk_source("doc", &word, 2);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 8));
    }

    #[test]
    fn chunking_is_deterministic_apart_from_ids() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let a = chunk_source("doc", text, 2);
        let b = chunk_source("doc", text, 2);
        let texts = |cs: &[ContentChunk]| cs.iter().map(|c| c.fingerprint.clone()).collect::<Vec<_>>();
        assert_eq!(texts(&a), texts(&b));
    }
}
