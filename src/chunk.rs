//! Language-aware text chunker with overlap.
//!
//! Splits document text into [`Chunk`]s of at most `max_chars` characters,
//! cutting at the most structural boundary the language offers (class and
//! function definitions first, then blank lines, lines, and spaces).
//!
//! # Algorithm
//!
//! 1. Text no longer than `max_chars` becomes a single chunk, verbatim.
//! 2. Otherwise the text is cut recursively into *units* of at most
//!    `max_chars - overlap_chars`, trying separators in priority order.
//!    Each separator stays at the start of the unit that follows it, so the
//!    units concatenate back to the original text.
//! 3. Units are packed greedily. Every chunk after the first starts with the
//!    last `overlap_chars` characters of its predecessor.
//! 4. A unit that no separator can cut (a run without whitespace) is kept
//!    whole. If it fits in `max_chars` but not after a full overlap, its
//!    chunk carries only as much overlap as still fits. Only a unit longer
//!    than `max_chars` itself yields a chunk over the limit.
//!
//! Sizes are counted in `char`s, never bytes, so multi-byte text is never
//! cut inside a code point.

use crate::config::ChunkingConfig;
use crate::language::Language;
use crate::models::{Chunk, Document};

#[derive(Debug, Clone)]
pub struct Splitter {
    separators: &'static [&'static str],
    max_chars: usize,
    overlap_chars: usize,
}

impl Splitter {
    /// `overlap_chars` must be smaller than `max_chars`; config validation
    /// guarantees this for configured splitters.
    pub fn new(language: Language, max_chars: usize, overlap_chars: usize) -> Self {
        let max_chars = max_chars.max(1);
        Self {
            separators: language.separators(),
            max_chars,
            overlap_chars: overlap_chars.min(max_chars - 1),
        }
    }

    pub fn from_config(language: Language, config: &ChunkingConfig) -> Self {
        Self::new(language, config.max_chars, config.overlap_chars)
    }

    /// Split every document, keeping document order and per-document chunk
    /// order.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.text)
                    .into_iter()
                    .enumerate()
                    .map(|(index, text)| Chunk {
                        text,
                        source_path: doc.source_path.clone(),
                        index,
                    })
            })
            .collect()
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        if char_len(text) <= self.max_chars {
            return vec![text.to_string()];
        }

        let unit_limit = self.max_chars - self.overlap_chars;
        let mut units = Vec::new();
        split_units(text, self.separators, unit_limit, &mut units);
        self.pack(&units)
    }

    fn pack(&self, units: &[&str]) -> Vec<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;
        // Byte length of the overlap prefix carried into `current`.
        let mut prefix_bytes = 0usize;

        for unit in units {
            let unit_len = char_len(unit);
            let has_units = current.len() > prefix_bytes;

            if has_units && current_len + unit_len > self.max_chars {
                // An indivisible unit that fits within max on its own takes
                // a shorter overlap instead of overflowing.
                let keep = if unit_len <= self.max_chars {
                    self.overlap_chars.min(self.max_chars - unit_len)
                } else {
                    self.overlap_chars
                };
                let tail = last_chars(&current, keep).to_string();
                chunks.push(std::mem::replace(&mut current, tail));
                current_len = char_len(&current);
                prefix_bytes = current.len();
            }

            current.push_str(unit);
            current_len += unit_len;
        }

        // A trailing run of whitespace is not worth a chunk of its own.
        let added = &current[prefix_bytes..];
        if !added.is_empty() && (chunks.is_empty() || !added.trim().is_empty()) {
            chunks.push(current);
        }

        chunks
    }
}

/// Recursively cut `text` into pieces of at most `limit` chars.
fn split_units<'a>(text: &'a str, separators: &[&str], limit: usize, out: &mut Vec<&'a str>) {
    if char_len(text) <= limit {
        out.push(text);
        return;
    }

    for (i, sep) in separators.iter().enumerate() {
        let pieces = split_keep_separator(text, sep);
        if pieces.len() > 1 {
            for piece in pieces {
                split_units(piece, &separators[i + 1..], limit, out);
            }
            return;
        }
    }

    // Indivisible
    out.push(text);
}

/// Split before every occurrence of `sep` (except at position 0), so each
/// separator leads the piece that follows it.
fn split_keep_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(sep) {
        if idx > start {
            pieces.push(&text[start..idx]);
            start = idx;
        }
    }
    pieces.push(&text[start..]);
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The last `n` chars of `s` (all of `s` when shorter).
fn last_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_source(functions: usize, body_lines: usize) -> String {
        (0..functions)
            .map(|i| {
                let body: String = (0..body_lines)
                    .map(|j| format!("    value_{j} = compute({i}, {j})\n"))
                    .collect();
                format!("def func_{i}(x):\n{body}    return x")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn head(s: &str, n: usize) -> String {
        s.chars().take(n).collect()
    }

    #[test]
    fn test_short_text_single_chunk() {
        let splitter = Splitter::new(Language::Python, 2000, 200);
        let text = "import os\n\ndef main():\n    print(os.getcwd())\n";
        let chunks = splitter.split_text(text);
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_text_exactly_max_is_single_chunk() {
        let splitter = Splitter::new(Language::Python, 50, 10);
        let text = "x".repeat(50);
        assert_eq!(splitter.split_text(&text), vec![text]);
    }

    #[test]
    fn test_empty_text_single_chunk() {
        let splitter = Splitter::new(Language::Python, 50, 10);
        assert_eq!(splitter.split_text(""), vec![String::new()]);
    }

    #[test]
    fn test_chunks_respect_max_and_overlap_exactly() {
        let (max, overlap) = (400, 60);
        let splitter = Splitter::new(Language::Python, max, overlap);
        let text = python_source(12, 6);
        let chunks = splitter.split_text(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= max, "chunk too long: {}", chunk.len());
        }
        for pair in chunks.windows(2) {
            assert_eq!(
                last_chars(&pair[0], overlap),
                head(&pair[1], overlap),
                "consecutive chunks must share exactly {} chars",
                overlap
            );
        }
    }

    #[test]
    fn test_chunks_reassemble_to_original() {
        let overlap = 40;
        let splitter = Splitter::new(Language::Python, 300, overlap);
        let text = python_source(8, 5);
        let chunks = splitter.split_text(&text);

        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(overlap));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_prefers_definition_boundaries() {
        let overlap = 50;
        let splitter = Splitter::new(Language::Python, 700, overlap);
        // Each function is well under the unit limit, so every cut should
        // land right before a `def`.
        let text = python_source(10, 4);
        let chunks = splitter.split_text(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks[1..] {
            let fresh: String = chunk.chars().skip(overlap).collect();
            assert!(
                fresh.starts_with("\n\ndef ") || fresh.starts_with("\ndef "),
                "chunk did not start at a definition: {:?}",
                head(&fresh, 20)
            );
        }
    }

    #[test]
    fn test_oversized_indivisible_unit_kept_whole() {
        let (max, overlap) = (200, 20);
        let splitter = Splitter::new(Language::Python, max, overlap);
        let blob = "x".repeat(500);
        let text = format!("alpha = 1\nbeta = 2\ngamma = 3\nDATA = \"{blob}\"\nc = 3\nd = 4");
        let chunks = splitter.split_text(&text);

        let oversized: Vec<&String> = chunks.iter().filter(|c| c.chars().count() > max).collect();
        assert_eq!(oversized.len(), 1);
        assert!(oversized[0].contains(&blob));
        for pair in chunks.windows(2) {
            assert_eq!(last_chars(&pair[0], overlap), head(&pair[1], overlap));
        }
    }

    #[test]
    fn test_indivisible_unit_under_max_shortens_overlap() {
        let (max, overlap) = (50, 10);
        let splitter = Splitter::new(Language::Python, max, overlap);
        let token = "k".repeat(45);
        let text = format!("alpha = 1\nbeta = 2\ngamma = 3\n{token}");
        let chunks = splitter.split_text(&text);

        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= max, "chunk too long: {:?}", chunk);
        }
        // The unit keeps its leading newline separator.
        let unit = format!("\n{token}");
        let carried = max - unit.chars().count();
        assert_eq!(
            chunks[1],
            format!("{}{}", last_chars(&chunks[0], carried), unit)
        );
    }

    #[test]
    fn test_no_chunk_over_max_without_oversized_unit() {
        let (max, overlap) = (60, 15);
        let splitter = Splitter::new(Language::Python, max, overlap);
        for len in (max - overlap)..max {
            let text = format!("x = 1\ny = 2\nz = 3\n{}\nw = 4\nv = 5", "q".repeat(len));
            for chunk in splitter.split_text(&text) {
                assert!(chunk.chars().count() <= max, "len {}: {:?}", len, chunk);
            }
        }
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let splitter = Splitter::new(Language::Python, 30, 5);
        let text = "# héllo wörld ünïcode çomment ".repeat(8);
        let chunks = splitter.split_text(text.trim_end());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 30);
        }
    }

    #[test]
    fn test_split_documents_keeps_paths_and_indices() {
        let splitter = Splitter::new(Language::Python, 200, 20);
        let docs = vec![
            Document {
                text: python_source(6, 3),
                source_path: "pkg/long.py".to_string(),
            },
            Document {
                text: "x = 1".to_string(),
                source_path: "short.py".to_string(),
            },
        ];
        let chunks = splitter.split_documents(&docs);

        let long: Vec<&Chunk> = chunks.iter().filter(|c| c.source_path == "pkg/long.py").collect();
        assert!(long.len() > 1);
        for (i, c) in long.iter().enumerate() {
            assert_eq!(c.index, i);
        }
        let last = chunks.last().unwrap();
        assert_eq!(last.source_path, "short.py");
        assert_eq!(last.index, 0);
        assert_eq!(last.text, "x = 1");
    }

    #[test]
    fn test_trailing_whitespace_not_a_chunk() {
        let splitter = Splitter::new(Language::Python, 40, 10);
        let text = format!("{}\n\n\n", "word ".repeat(20).trim_end());
        let chunks = splitter.split_text(&text);
        for chunk in &chunks {
            assert!(!chunk.chars().skip(10).collect::<String>().trim().is_empty() || chunks.len() == 1);
        }
    }

    #[test]
    fn test_split_keep_separator() {
        let pieces = split_keep_separator("a\ndef b\ndef c", "\ndef ");
        assert_eq!(pieces, vec!["a", "\ndef b", "\ndef c"]);
        assert_eq!(split_keep_separator("\ndef a", "\ndef "), vec!["\ndef a"]);
    }

    #[test]
    fn test_last_chars() {
        assert_eq!(last_chars("abcdef", 3), "def");
        assert_eq!(last_chars("ab", 5), "ab");
        assert_eq!(last_chars("ab", 0), "");
        assert_eq!(last_chars("añb", 2), "ñb");
    }
}
