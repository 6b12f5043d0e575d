//! Speech provider implementations

pub mod mock;
mod openai;

pub use mock::MockProvider;
pub use openai::{OPENAI_API_URL, OpenAiSpeechProvider};

use crate::config::ClientConfig;
use crate::error::{Result, SpeechError};
use crate::provider::SpeechProvider;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Create the speech provider described by `config`
pub fn get_provider(config: &ClientConfig) -> Result<Box<dyn SpeechProvider>> {
    let api_key = get_api_key(config, OPENAI_API_KEY_ENV, "OpenAI")?;
    let base_url = config.base_url.as_deref().unwrap_or(OPENAI_API_URL);
    let provider = OpenAiSpeechProvider::new(base_url, api_key, config.timeout_secs)?;
    provider.is_available()?;
    Ok(Box::new(provider))
}

/// Get API key from config or environment variable
fn get_api_key(config: &ClientConfig, env_var: &str, provider_name: &str) -> Result<String> {
    // Check config first
    if let Some(key) = config.api_key.clone() {
        return Ok(key);
    }

    // Fall back to environment variable
    std::env::var(env_var).map_err(|_| SpeechError::MissingApiKey {
        provider: provider_name.to_string(),
        env_var: env_var.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_from_config_wins() {
        let config = ClientConfig {
            api_key: Some("sk-config".to_string()),
            ..ClientConfig::default()
        };
        let key = get_api_key(&config, "GEN_SPEECH_TEST_UNSET_KEY", "OpenAI").unwrap();
        assert_eq!(key, "sk-config");
    }

    #[test]
    fn test_missing_api_key() {
        let config = ClientConfig::default();
        let err = get_api_key(&config, "GEN_SPEECH_TEST_UNSET_KEY", "OpenAI").unwrap_err();
        assert!(err.to_string().contains("GEN_SPEECH_TEST_UNSET_KEY"));
    }

    #[test]
    fn test_get_provider_with_configured_key() {
        let config = ClientConfig {
            api_key: Some("sk-config".to_string()),
            base_url: Some("http://localhost:9999/v1".to_string()),
            ..ClientConfig::default()
        };
        let provider = get_provider(&config).unwrap();
        assert_eq!(provider.name(), "OpenAI");
    }
}
