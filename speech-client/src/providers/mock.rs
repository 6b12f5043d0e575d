//! Mock speech provider for testing
//!
//! Writes deterministic bytes per request and can simulate slow requests,
//! failing requests and out-of-order completion.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Result, SpeechError};
use crate::provider::{SpeechProvider, SpeechRequest};

/// A mock provider whose "audio" is the request text itself
#[derive(Default)]
pub struct MockProvider {
    /// Per-input artificial latency
    delays: HashMap<String, Duration>,
    /// Inputs that fail instead of producing audio
    failing: HashSet<String>,
    /// Inputs that fail with a retryable error this many times first
    flaky: Mutex<HashMap<String, usize>>,
    call_count: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// Inputs in the order their audio finished writing
    completions: Mutex<Vec<String>>,
}

impl MockProvider {
    /// Create a provider that always succeeds immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay the response for `input` by `delay`
    pub fn with_delay(mut self, input: &str, delay: Duration) -> Self {
        self.delays.insert(input.to_string(), delay);
        self
    }

    /// Make every request for `input` fail
    pub fn failing_on(mut self, input: &str) -> Self {
        self.failing.insert(input.to_string());
        self
    }

    /// Make the first `times` requests for `input` fail with a rate limit
    pub fn flaky_on(self, input: &str, times: usize) -> Self {
        if let Ok(mut flaky) = self.flaky.lock() {
            flaky.insert(input.to_string(), times);
        }
        self
    }

    /// Bytes written for a given input
    pub fn audio_for(input: &str) -> Vec<u8> {
        input.as_bytes().to_vec()
    }

    /// Get the number of times synthesize_to_file() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Highest number of requests observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Inputs in completion order
    pub fn completion_order(&self) -> Vec<String> {
        self.completions
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn take_flaky_failure(&self, input: &str) -> bool {
        let Ok(mut flaky) = self.flaky.lock() else {
            return false;
        };
        match flaky.get_mut(input) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl SpeechProvider for MockProvider {
    async fn synthesize_to_file(&self, request: &SpeechRequest, output_path: &Path) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&request.input) {
            tokio::time::sleep(*delay).await;
        }

        let outcome = if self.failing.contains(&request.input) {
            Err(SpeechError::ApiError {
                message: format!("mock failure for {:?}", request.input),
                status_code: Some(500),
            })
        } else if self.take_flaky_failure(&request.input) {
            Err(SpeechError::RateLimited { retry_after: None })
        } else {
            tokio::fs::write(output_path, Self::audio_for(&request.input))
                .await
                .map_err(SpeechError::from)
        };

        if outcome.is_ok() {
            if let Ok(mut completions) = self.completions.lock() {
                completions.push(request.input.clone());
            }
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{AudioFormat, SpeechModel, Voice};
    use tempfile::TempDir;

    fn request(input: &str) -> SpeechRequest {
        SpeechRequest {
            input: input.to_string(),
            voice: Voice::Alloy,
            model: SpeechModel::Standard,
            format: AudioFormat::Mp3,
        }
    }

    #[tokio::test]
    async fn test_writes_input_as_audio() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.mp3");
        let provider = MockProvider::new();

        provider
            .synthesize_to_file(&request("Hello."), &path)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"Hello.");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.completion_order(), vec!["Hello.".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.mp3");
        let provider = MockProvider::new().failing_on("bad");

        let result = provider.synthesize_to_file(&request("bad"), &path).await;
        assert!(result.is_err());
        assert!(!path.exists());
        assert!(provider.completion_order().is_empty());
    }

    #[tokio::test]
    async fn test_flaky_input_recovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.mp3");
        let provider = MockProvider::new().flaky_on("flaky", 1);

        let first = provider.synthesize_to_file(&request("flaky"), &path).await;
        assert!(matches!(first, Err(SpeechError::RateLimited { .. })));
        provider
            .synthesize_to_file(&request("flaky"), &path)
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 2);
    }
}
