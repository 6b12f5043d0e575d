//! Document to audio: segment, dispatch, reassemble.

use crate::audio::{ConcatTool, reassemble};
use crate::dispatch::pacer::Pacer;
use crate::dispatch::{DispatchProgress, Dispatcher, VoiceSettings};
use crate::error::{GenSpeechError, Result};
use crate::job::Job;
use crate::text::segment;
use speech_client::{RetryConfig, SpeechProvider};
use std::path::{Path, PathBuf};

/// Everything the pipeline needs to know about one run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub settings: VoiceSettings,
    pub requests_per_minute: usize,
    pub max_chunk_length: usize,
    pub keep_intermediates: bool,
    pub retry: RetryConfig,
}

/// External collaborators of a run.
pub struct Collaborators<'a> {
    pub provider: &'a dyn SpeechProvider,
    pub pacer: &'a dyn Pacer,
    pub concat: &'a dyn ConcatTool,
}

/// Convert `text` into a single audio file at `output_path`.
///
/// Configuration problems are reported before any request is made. If
/// synthesis fails, part files already written are removed unless
/// intermediates are kept.
pub async fn generate_speech<F>(
    text: &str,
    job: &Job,
    output_path: &Path,
    options: &PipelineOptions,
    collaborators: &Collaborators<'_>,
    on_progress: F,
) -> Result<PathBuf>
where
    F: FnMut(DispatchProgress),
{
    if text.trim().is_empty() {
        return Err(GenSpeechError::Config("input document is empty".to_string()));
    }
    if options.requests_per_minute == 0 {
        return Err(GenSpeechError::Config(
            "requests per minute must be greater than zero".to_string(),
        ));
    }
    if options.max_chunk_length == 0 {
        return Err(GenSpeechError::Config(
            "maximum chunk length must be greater than zero".to_string(),
        ));
    }

    let chunks = segment(text, options.max_chunk_length);
    if chunks.is_empty() {
        return Err(GenSpeechError::Config("no text chunks to synthesize".to_string()));
    }
    log::info!("{} chunks (max {} characters)", chunks.len(), options.max_chunk_length);

    for chunk in chunks.iter().filter(|c| c.char_len() > options.max_chunk_length) {
        log::warn!(
            "chunk {} is a single {}-character sentence and exceeds the limit; sending it whole",
            chunk.index,
            chunk.char_len()
        );
    }

    let dispatcher = Dispatcher::new(
        collaborators.provider,
        collaborators.pacer,
        job,
        options.settings.clone(),
    )
    .with_retry(options.retry.clone());

    let results = match dispatcher
        .dispatch(&chunks, options.requests_per_minute, on_progress)
        .await
    {
        Ok(results) => results,
        Err(e) => {
            if !options.keep_intermediates {
                let removed = job.remove_parts(chunks.len());
                log::debug!("removed {} part files after failure", removed);
            }
            return Err(e);
        }
    };

    reassemble(
        results,
        &job.manifest_path(),
        output_path,
        options.keep_intermediates,
        collaborators.concat,
    )
}
