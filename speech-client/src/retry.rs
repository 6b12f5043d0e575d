//! Opt-in retry with exponential backoff around a single synthesis call.

use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::provider::{SpeechProvider, SpeechRequest};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f32,
}

impl Default for RetryConfig {
    /// One attempt, no retries.
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Allow `retries` additional attempts after the first one.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f32(
            (delay.as_secs_f32() * self.backoff_factor).min(self.max_delay.as_secs_f32()),
        )
    }
}

/// Run `provider.synthesize_to_file`, retrying retryable failures.
///
/// Non-retryable errors and the error of the final attempt are returned as-is.
pub async fn synthesize_with_retry(
    provider: &dyn SpeechProvider,
    request: &SpeechRequest,
    output_path: &Path,
    config: &RetryConfig,
) -> Result<()> {
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match provider.synthesize_to_file(request, output_path).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if attempt >= config.max_attempts || !e.is_retryable() {
                    return Err(e);
                }

                let wait = match e {
                    crate::error::SpeechError::RateLimited {
                        retry_after: Some(secs),
                    } => delay.max(Duration::from_secs(secs)),
                    _ => delay,
                };

                log::warn!(
                    "{} request failed (attempt {}/{}): {}; retrying in {:?}",
                    provider.name(),
                    attempt,
                    config.max_attempts,
                    e,
                    wait
                );

                tokio::time::sleep(wait).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpeechError;
    use crate::provider::{AudioFormat, SpeechModel, Voice};
    use crate::providers::MockProvider;
    use tempfile::TempDir;

    fn request(input: &str) -> SpeechRequest {
        SpeechRequest {
            input: input.to_string(),
            voice: Voice::Alloy,
            model: SpeechModel::Standard,
            format: AudioFormat::Aac,
        }
    }

    #[test]
    fn test_default_is_single_attempt() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(RetryConfig::with_retries(2).max_attempts, 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(5),
            ..RetryConfig::default()
        };
        assert_eq!(config.next_delay(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(config.next_delay(Duration::from_secs(4)), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rate_limited_request() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("part.m4a");
        let provider = MockProvider::new().flaky_on("Hi.", 2);

        synthesize_with_retry(&provider, &request("Hi."), &path, &RetryConfig::with_retries(2))
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 3);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("part.m4a");
        let provider = MockProvider::new().flaky_on("Hi.", 1);

        let result =
            synthesize_with_retry(&provider, &request("Hi."), &path, &RetryConfig::default())
                .await;

        assert!(matches!(result, Err(SpeechError::RateLimited { .. })));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("part.m4a");
        let provider = MockProvider::new().failing_on("Hi.");

        let result =
            synthesize_with_retry(&provider, &request("Hi."), &path, &RetryConfig::with_retries(5))
                .await;

        assert!(result.is_err());
        assert_eq!(provider.call_count(), 1);
    }
}
