//! Text processing for TTS: sentence splitting and chunking.

pub mod segmenter;

pub use segmenter::segment;

/// A chunk of the document ready for one synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position of this chunk in the document (0-based)
    pub index: usize,
    /// The text content
    pub text: String,
}

impl TextChunk {
    /// Create a new text chunk.
    pub fn new(index: usize, text: String) -> Self {
        Self { index, text }
    }

    /// Length in characters, the unit the API limit is expressed in.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}
