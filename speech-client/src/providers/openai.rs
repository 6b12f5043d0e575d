//! OpenAI speech API provider
//!
//! Direct HTTP implementation of `POST /audio/speech`. The response body is
//! streamed to disk instead of being buffered in memory.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, SpeechError};
use crate::provider::{SpeechProvider, SpeechRequest};

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Provider for the OpenAI text-to-speech endpoint
pub struct OpenAiSpeechProvider {
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    client: Client,
}

impl OpenAiSpeechProvider {
    /// Create a new provider against `base_url` with a per-request timeout
    pub fn new(base_url: &str, api_key: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SpeechError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout_secs,
            client,
        })
    }

    fn request_error(&self, e: reqwest::Error) -> SpeechError {
        if e.is_timeout() {
            SpeechError::Timeout(self.timeout_secs)
        } else {
            SpeechError::ApiError {
                message: format!("Request failed: {}", e),
                status_code: None,
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Map a non-success response to the error taxonomy.
fn classify_failure(status: StatusCode, retry_after: Option<u64>, body: &str) -> SpeechError {
    let message = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.to_string(),
    };

    if status == StatusCode::TOO_MANY_REQUESTS {
        return SpeechError::RateLimited { retry_after };
    }
    if status.is_server_error() {
        return SpeechError::ServerOverloaded {
            message,
            status_code: status.as_u16(),
        };
    }
    SpeechError::ApiError {
        message,
        status_code: Some(status.as_u16()),
    }
}

#[async_trait]
impl SpeechProvider for OpenAiSpeechProvider {
    async fn synthesize_to_file(&self, request: &SpeechRequest, output_path: &Path) -> Result<()> {
        let body = SpeechBody {
            model: request.model.api_name(),
            voice: request.voice.as_str(),
            input: &request.input,
            response_format: request.format.api_name(),
        };

        let url = format!("{}/audio/speech", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, retry_after, &error_text));
        }

        log::debug!("started streaming to '{}'", output_path.display());

        let mut file = tokio::fs::File::create(output_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.request_error(e))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "OpenAI"
    }

    fn is_available(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(SpeechError::MissingApiKey {
                provider: self.name().to_string(),
                env_var: "OPENAI_API_KEY".to_string(),
            });
        }
        Ok(())
    }
}
