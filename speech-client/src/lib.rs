//! Text-to-speech client library for the gen-speech workspace
//!
//! Provides a provider trait for turning text into an audio file, with:
//! - OpenAI speech API (streamed to disk)
//! - A mock provider for tests
//! - Opt-in retry with exponential backoff

pub mod config;
pub mod error;
pub mod provider;
pub mod providers;
pub mod retry;

pub use config::ClientConfig;
pub use error::{Result, SpeechError};
pub use provider::{AudioFormat, SpeechModel, SpeechProvider, SpeechRequest, Voice};
pub use providers::{MockProvider, OpenAiSpeechProvider, get_provider};
pub use retry::{RetryConfig, synthesize_with_retry};
