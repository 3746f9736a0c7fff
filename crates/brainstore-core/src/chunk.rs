//! Recursive text splitter with overlap.
//!
//! Splits decoded document text into bounded [`TextSpan`]s. Sizes are given
//! in approximate tokens and converted to characters at 4 chars/token.
//!
//! # Algorithm
//!
//! 1. Cut the text into *pieces* no longer than `max_chars`, trying the
//!    separators `"\n\n"`, `"\n"`, `" "` in order and falling back to a hard
//!    character split. Separators stay attached to the end of the piece they
//!    terminate, so the pieces tile the input with no gaps.
//! 2. Merge consecutive pieces greedily while the running length fits in
//!    `max_chars`. When a span is emitted, its trailing pieces totalling at
//!    most `overlap_chars` are carried over as the head of the next span.
//!
//! Every span records its byte range in the source, so the non-overlapping
//! parts of consecutive spans concatenate back to the original text.
//!
//! # Example
//!
//! ```rust
//! use brainstore_core::chunk::{split_text, ChunkParams};
//!
//! let spans = split_text("Hello world.\n\nSecond paragraph.", &ChunkParams::default());
//! assert_eq!(spans.len(), 1);
//! assert_eq!(spans[0].start, 0);
//! ```

use std::collections::VecDeque;

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 0;

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Chunking parameters, in approximate tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkParams {
    fn max_chars(&self) -> usize {
        (self.chunk_size * CHARS_PER_TOKEN).max(1)
    }

    fn overlap_chars(&self) -> usize {
        self.chunk_overlap * CHARS_PER_TOKEN
    }
}

/// A segment of source text and its byte range `[start, end)` in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Split `text` into ordered, overlapping spans of at most `chunk_size` tokens.
///
/// Returns an empty vector for empty input.
pub fn split_text(text: &str, params: &ChunkParams) -> Vec<TextSpan> {
    let max_chars = params.max_chars();
    let mut pieces = Vec::new();
    split_pieces(text, 0, &SEPARATORS, max_chars, &mut pieces);

    merge_pieces(text, &pieces, max_chars, params.overlap_chars())
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| TextSpan {
            index,
            start,
            end,
            text: text[start..end].to_string(),
        })
        .collect()
}

fn split_pieces(
    text: &str,
    base: usize,
    separators: &[&str],
    max_chars: usize,
    out: &mut Vec<(usize, usize)>,
) {
    if text.is_empty() {
        return;
    }
    if text.chars().count() <= max_chars {
        out.push((base, base + text.len()));
        return;
    }

    let Some((sep, rest)) = separators.split_first() else {
        hard_split(text, base, max_chars, out);
        return;
    };

    if !text.contains(sep) {
        split_pieces(text, base, rest, max_chars, out);
        return;
    }

    let mut offset = 0;
    for piece in text.split_inclusive(sep) {
        split_pieces(piece, base + offset, rest, max_chars, out);
        offset += piece.len();
    }
}

/// Cut on character boundaries every `max_chars` characters.
fn hard_split(text: &str, base: usize, max_chars: usize, out: &mut Vec<(usize, usize)>) {
    let mut start = 0;
    for (count, (byte_idx, _)) in text.char_indices().enumerate() {
        if count > 0 && count % max_chars == 0 {
            out.push((base + start, base + byte_idx));
            start = byte_idx;
        }
    }
    if start < text.len() {
        out.push((base + start, base + text.len()));
    }
}

fn merge_pieces(
    text: &str,
    pieces: &[(usize, usize)],
    max_chars: usize,
    overlap_chars: usize,
) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    // (start, end, char length) of the pieces in the current window
    let mut window: VecDeque<(usize, usize, usize)> = VecDeque::new();
    let mut window_chars = 0usize;

    for &(start, end) in pieces {
        let len = text[start..end].chars().count();

        if window_chars + len > max_chars {
            if let (Some(first), Some(last)) = (window.front(), window.back()) {
                spans.push((first.0, last.1));
            }
            while window_chars > overlap_chars
                || (window_chars > 0 && window_chars + len > max_chars)
            {
                match window.pop_front() {
                    Some((_, _, dropped)) => window_chars -= dropped,
                    None => break,
                }
            }
        }

        window.push_back((start, end, len));
        window_chars += len;
    }

    if let (Some(first), Some(last)) = (window.front(), window.back()) {
        spans.push((first.0, last.1));
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(chunk_size: usize, chunk_overlap: usize) -> ChunkParams {
        ChunkParams {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Concatenate the first span with the non-overlapping tail of each next one.
    fn reassemble(spans: &[TextSpan]) -> String {
        let mut out = String::new();
        let mut covered = 0;
        for span in spans {
            assert!(span.start <= covered, "gap before span {}", span.index);
            assert!(span.end > covered, "span {} adds nothing", span.index);
            out.push_str(&span.text[covered - span.start..]);
            covered = span.end;
        }
        out
    }

    fn sample_text() -> String {
        (0..40)
            .map(|i| {
                format!(
                    "Paragraph {} talks about embeddings, quotas and brains.\nIt has a second line.",
                    i
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn test_small_text_single_span() {
        let spans = split_text("Hello, world!", &ChunkParams::default());
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].index, 0);
        assert_eq!(spans[0].text, "Hello, world!");
        assert_eq!((spans[0].start, spans[0].end), (0, 13));
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(split_text("", &ChunkParams::default()).is_empty());
    }

    #[test]
    fn test_spans_respect_max_size() {
        let text = sample_text();
        let p = params(10, 3);
        for span in split_text(&text, &p) {
            assert!(span.text.chars().count() <= 40, "span {} too long", span.index);
        }
    }

    #[test]
    fn test_indices_contiguous() {
        let spans = split_text(&sample_text(), &params(10, 0));
        assert!(spans.len() > 1);
        for (i, s) in spans.iter().enumerate() {
            assert_eq!(s.index, i);
        }
    }

    #[test]
    fn test_reconstructs_without_overlap() {
        let text = sample_text();
        let spans = split_text(&text, &params(12, 0));
        assert_eq!(reassemble(&spans), text);
        // Without overlap spans tile the input exactly.
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_reconstructs_with_overlap_for_many_params() {
        let text = sample_text();
        for (size, overlap) in [(5, 1), (8, 4), (12, 6), (20, 19), (50, 10), (500, 0)] {
            let spans = split_text(&text, &params(size, overlap));
            assert_eq!(
                reassemble(&spans),
                text,
                "size={} overlap={}",
                size,
                overlap
            );
        }
    }

    #[test]
    fn test_overlap_duplicates_tail_of_previous_span() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        // 16 chars per span, up to 8 chars of overlap
        let spans = split_text(text, &params(4, 2));
        assert!(spans.len() > 2);
        let mut saw_overlap = false;
        for pair in spans.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.start < prev.end {
                saw_overlap = true;
                let shared = &text[next.start..prev.end];
                assert!(prev.text.ends_with(shared));
                assert!(next.text.starts_with(shared));
                assert!(shared.chars().count() <= 8);
            }
        }
        assert!(saw_overlap);
    }

    #[test]
    fn test_hard_split_without_separators() {
        let text = "x".repeat(101);
        let spans = split_text(&text, &params(5, 0));
        assert_eq!(spans.len(), 6);
        assert!(spans.iter().all(|s| s.text.len() <= 20));
        assert_eq!(reassemble(&spans), text);
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text = "héllo wörld ünïcödé ".repeat(20);
        let spans = split_text(&text, &params(3, 1));
        assert_eq!(reassemble(&spans), text);
        assert!(spans.iter().all(|s| s.text.chars().count() <= 12));
    }

    #[test]
    fn test_deterministic() {
        let text = sample_text();
        assert_eq!(
            split_text(&text, &params(9, 2)),
            split_text(&text, &params(9, 2))
        );
    }
}
