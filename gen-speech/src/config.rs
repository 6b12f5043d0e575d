//! gen-speech configuration management.

use crate::dispatch::pacer::PacingStrategy;
use crate::text::segmenter::DEFAULT_MAX_LENGTH;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use speech_client::{AudioFormat, SpeechModel, Voice};
use std::fs;
use std::path::PathBuf;

/// Environment variable overriding the default requests-per-minute quota.
pub const RPM_ENV_VAR: &str = "OPENAI_SPEECH_RPM";

const DEFAULT_REQUESTS_PER_MINUTE: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenSpeechConfig {
    /// Default voice
    #[serde(default)]
    pub voice: Voice,

    /// Model tier (standard or high-definition)
    #[serde(default)]
    pub model: SpeechModel,

    /// Audio format requested from the API
    #[serde(default)]
    pub format: AudioFormat,

    /// Requests per minute allowed by the account's quota
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Maximum chunk length in characters
    #[serde(default = "default_max_chunk_length")]
    pub max_chunk_length: usize,

    /// How batches are spaced
    #[serde(default)]
    pub pacing: PacingStrategy,

    /// Extra attempts for rate-limited or timed-out requests
    #[serde(default)]
    pub retries: u32,
}

fn default_requests_per_minute() -> u32 {
    DEFAULT_REQUESTS_PER_MINUTE
}

fn default_max_chunk_length() -> usize {
    DEFAULT_MAX_LENGTH
}

impl Default for GenSpeechConfig {
    fn default() -> Self {
        Self {
            voice: Voice::default(),
            model: SpeechModel::default(),
            format: AudioFormat::default(),
            requests_per_minute: default_requests_per_minute(),
            max_chunk_length: default_max_chunk_length(),
            pacing: PacingStrategy::default(),
            retries: 0,
        }
    }
}

impl GenSpeechConfig {
    /// Get the config file path: ~/.config/cli-programs/gen-speech.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("cli-programs")
            .join("gen-speech.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: GenSpeechConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Resolve the requests-per-minute quota.
    ///
    /// An explicit flag wins, then a numeric environment override, then the
    /// config file.
    pub fn resolve_requests_per_minute(&self, flag: Option<u32>, env_value: Option<&str>) -> u32 {
        if let Some(rpm) = flag {
            return rpm;
        }
        env_value
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(self.requests_per_minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GenSpeechConfig::default();
        assert_eq!(config.voice, Voice::Alloy);
        assert_eq!(config.model, SpeechModel::Standard);
        assert_eq!(config.format, AudioFormat::Aac);
        assert_eq!(config.requests_per_minute, 3);
        assert_eq!(config.max_chunk_length, 4096);
        assert_eq!(config.pacing, PacingStrategy::Minute);
        assert_eq!(config.retries, 0);
    }

    #[test]
    fn test_config_path() {
        if let Ok(path) = GenSpeechConfig::config_path() {
            assert!(path.ends_with("cli-programs/gen-speech.toml"));
        }
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
voice = "onyx"
model = "high-definition"
format = "mp3"
requests_per_minute = 50
max_chunk_length = 1000
pacing = "interval"
retries = 2
"#;
        let config: GenSpeechConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.voice, Voice::Onyx);
        assert_eq!(config.model, SpeechModel::HighDefinition);
        assert_eq!(config.format, AudioFormat::Mp3);
        assert_eq!(config.requests_per_minute, 50);
        assert_eq!(config.max_chunk_length, 1000);
        assert_eq!(config.pacing, PacingStrategy::Interval);
        assert_eq!(config.retries, 2);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: GenSpeechConfig = toml::from_str("").unwrap();
        assert_eq!(config.requests_per_minute, 3);
        assert_eq!(config.max_chunk_length, 4096);
    }

    #[test]
    fn test_config_roundtrip_through_toml() {
        let config = GenSpeechConfig {
            voice: Voice::Nova,
            requests_per_minute: 7,
            ..GenSpeechConfig::default()
        };
        let parsed: GenSpeechConfig =
            toml::from_str(&toml::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(parsed.voice, Voice::Nova);
        assert_eq!(parsed.requests_per_minute, 7);
    }

    #[test]
    fn test_rpm_resolution() {
        let config = GenSpeechConfig::default();
        assert_eq!(config.resolve_requests_per_minute(Some(10), Some("50")), 10);
        assert_eq!(config.resolve_requests_per_minute(None, Some("50")), 50);
        assert_eq!(config.resolve_requests_per_minute(None, Some(" 7 ")), 7);
        assert_eq!(config.resolve_requests_per_minute(None, Some("lots")), 3);
        assert_eq!(config.resolve_requests_per_minute(None, None), 3);
    }
}
