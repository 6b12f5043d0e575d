//! Job-level error taxonomy.

use speech_client::SpeechError;
use thiserror::Error;

/// Errors that abort a speech generation job.
#[derive(Debug, Error)]
pub enum GenSpeechError {
    /// Invalid quota, empty document or nothing to synthesize.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A synthesis call failed; names the chunk so it can be diagnosed.
    #[error("Synthesis failed for chunk {index}: {source}")]
    Synthesis {
        index: usize,
        #[source]
        source: SpeechError,
    },

    /// The concatenation tool could not be run or exited non-zero.
    #[error("Concatenation failed ({status}): {stderr}")]
    Concatenation { status: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GenSpeechError>;
