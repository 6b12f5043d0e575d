//! Quota-bounded batch dispatch of synthesis requests.
//!
//! Chunks are grouped into batches of `requests_per_minute`. Each batch's
//! requests run concurrently while the pacer waits for the next quota window;
//! the next batch starts once both are done. The final batch is not paced.

pub mod pacer;

use crate::error::{GenSpeechError, Result};
use crate::job::Job;
use crate::text::TextChunk;
use futures_util::StreamExt;
use futures_util::future::{Either, select};
use futures_util::stream::FuturesUnordered;
use pacer::Pacer;
use speech_client::{
    AudioFormat, RetryConfig, SpeechError, SpeechModel, SpeechProvider, SpeechRequest, Voice,
    synthesize_with_retry,
};
use std::path::PathBuf;

/// Audio produced for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisResult {
    /// Index of the chunk this audio was generated from
    pub chunk_index: usize,
    /// Where the audio was written
    pub audio_path: PathBuf,
}

/// Progress information reported after every completed chunk.
#[derive(Debug, Clone)]
pub struct DispatchProgress {
    /// Chunks synthesized so far.
    pub completed: usize,
    /// Total number of chunks.
    pub total: usize,
    /// 1-based number of the batch in flight.
    pub batch: usize,
    /// Total number of batches.
    pub total_batches: usize,
}

/// Voice settings applied to every request of a job.
#[derive(Debug, Clone, Default)]
pub struct VoiceSettings {
    pub voice: Voice,
    pub model: SpeechModel,
    pub format: AudioFormat,
}

/// Split chunks into consecutive batches of at most `size` chunks.
pub fn batches(chunks: &[TextChunk], size: usize) -> Vec<&[TextChunk]> {
    chunks.chunks(size.max(1)).collect()
}

/// Issues synthesis requests batch by batch under a per-minute quota.
pub struct Dispatcher<'a> {
    provider: &'a dyn SpeechProvider,
    pacer: &'a dyn Pacer,
    job: &'a Job,
    settings: VoiceSettings,
    retry: RetryConfig,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher writing parts into `job`'s work directory.
    pub fn new(
        provider: &'a dyn SpeechProvider,
        pacer: &'a dyn Pacer,
        job: &'a Job,
        settings: VoiceSettings,
    ) -> Self {
        Self {
            provider,
            pacer,
            job,
            settings,
            retry: RetryConfig::default(),
        }
    }

    /// Retry retryable failures at the client boundary.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Synthesize every chunk, returning results ordered by chunk index.
    ///
    /// The first failing batch ends the dispatch: its in-flight siblings are
    /// allowed to finish, no later batch starts, and the error names the
    /// lowest failing chunk index. The error is returned without sitting out
    /// the rest of the pacing window.
    pub async fn dispatch<F>(
        &self,
        chunks: &[TextChunk],
        requests_per_minute: usize,
        mut on_progress: F,
    ) -> Result<Vec<SynthesisResult>>
    where
        F: FnMut(DispatchProgress),
    {
        if requests_per_minute == 0 {
            return Err(GenSpeechError::Config(
                "requests per minute must be greater than zero".to_string(),
            ));
        }
        if chunks.is_empty() {
            return Err(GenSpeechError::Config("no text chunks to synthesize".to_string()));
        }

        let plan = batches(chunks, requests_per_minute);
        let total_batches = plan.len();
        log::info!(
            "total_batches={} ({} chunks, {} requests per minute)",
            total_batches,
            chunks.len(),
            requests_per_minute
        );

        let mut results = Vec::with_capacity(chunks.len());
        let mut completed = 0;

        for (j, batch) in plan.iter().enumerate() {
            let is_last = j + 1 == total_batches;
            log::debug!(
                "starting batch {}/{} (chunks {}..={})",
                j + 1,
                total_batches,
                batch[0].index,
                batch[batch.len() - 1].index
            );

            let mut in_flight: FuturesUnordered<_> =
                batch.iter().map(|chunk| self.synthesize_chunk(chunk)).collect();

            let drain = async {
                let mut outcomes = Vec::with_capacity(batch.len());
                while let Some((index, outcome)) = in_flight.next().await {
                    if outcome.is_ok() {
                        completed += 1;
                        log::debug!("chunk {} synthesized", index);
                        on_progress(DispatchProgress {
                            completed,
                            total: chunks.len(),
                            batch: j + 1,
                            total_batches,
                        });
                    }
                    outcomes.push((index, outcome));
                }
                outcomes
            };

            // The pacing wait runs while the batch drains; whatever is left of
            // it is only awaited once the batch is known to have succeeded.
            let pacing = (!is_last).then(|| self.pacer.wait());
            let (outcomes, remaining_wait) = match pacing {
                None => (drain.await, None),
                Some(wait) => match select(Box::pin(drain), wait).await {
                    Either::Left((outcomes, wait)) => (outcomes, Some(wait)),
                    Either::Right(((), drain)) => (drain.await, None),
                },
            };

            let mut failure: Option<(usize, SpeechError)> = None;
            for (index, outcome) in outcomes {
                match outcome {
                    Ok(audio_path) => results.push(SynthesisResult {
                        chunk_index: index,
                        audio_path,
                    }),
                    Err(e) => {
                        log::error!("chunk {} failed: {}", index, e);
                        if failure.as_ref().is_none_or(|(first, _)| index < *first) {
                            failure = Some((index, e));
                        }
                    }
                }
            }

            if let Some((index, source)) = failure {
                return Err(GenSpeechError::Synthesis { index, source });
            }

            if let Some(wait) = remaining_wait {
                wait.await;
            }
        }

        results.sort_by_key(|r| r.chunk_index);
        Ok(results)
    }

    async fn synthesize_chunk(
        &self,
        chunk: &TextChunk,
    ) -> (usize, std::result::Result<PathBuf, SpeechError>) {
        let request = SpeechRequest {
            input: chunk.text.clone(),
            voice: self.settings.voice,
            model: self.settings.model,
            format: self.settings.format,
        };
        let path = self.job.part_path(chunk.index);

        let outcome = synthesize_with_retry(self.provider, &request, &path, &self.retry)
            .await
            .map(|()| path);
        (chunk.index, outcome)
    }
}
