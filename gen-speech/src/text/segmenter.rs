//! Sentence-aware segmentation of a document into request-sized chunks.

use super::TextChunk;
use once_cell::sync::Lazy;
use regex::Regex;

/// Default maximum chunk size in characters (the speech API input limit).
pub const DEFAULT_MAX_LENGTH: usize = 4096;

/// A period, whitespace, then an upper-case letter opening the next sentence.
static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.\s+\p{Lu}").expect("sentence boundary regex should compile"));

/// Split text into sentences.
///
/// Each sentence keeps the whitespace that follows its terminator, so the
/// pieces concatenate back to `text`. Text without a boundary is one sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_BOUNDARY.find_iter(text) {
        let capital_len = m.as_str().chars().last().map_or(0, char::len_utf8);
        let next = m.end() - capital_len;
        sentences.push(&text[start..next]);
        start = next;
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

/// Split a document into ordered chunks of at most `max_length` characters.
///
/// Sentences are packed greedily. A sentence longer than `max_length` is not
/// subdivided; it becomes a chunk of its own.
pub fn segment(text: &str, max_length: usize) -> Vec<TextChunk> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();

        if !current.is_empty() && current_len + len > max_length {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        current.push_str(sentence);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk::new(index, text))
        .collect()
}
