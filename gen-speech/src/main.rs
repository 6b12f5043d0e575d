//! gen-speech - Convert text documents to audio with a rate-limited TTS API

mod audio;
mod config;
mod dispatch;
mod error;
mod job;
mod pipeline;
mod text;

use anyhow::{Context, Result};
use audio::FfmpegConcat;
use clap::{Parser, Subcommand};
use config::{GenSpeechConfig, RPM_ENV_VAR};
use dispatch::VoiceSettings;
use dispatch::pacer::PacingStrategy;
use indicatif::{ProgressBar, ProgressStyle};
use job::Job;
use pipeline::{Collaborators, PipelineOptions};
use speech_client::{AudioFormat, ClientConfig, RetryConfig, SpeechModel, Voice};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "gen-speech")]
#[command(about = "Convert a text file to audio using OpenAI's text-to-speech API", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the input text file
    input_file: Option<PathBuf>,

    /// Output file path (default: <input-name>.<format extension>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Voice for text-to-speech (alloy, ash, coral, echo, fable, onyx, nova, sage, shimmer)
    #[arg(long)]
    voice: Option<Voice>,

    /// Use the high definition model (tts-1-hd)
    #[arg(long)]
    hd: bool,

    /// Keep intermediate files
    #[arg(short, long)]
    keep: bool,

    /// Requests per minute (OPENAI_SPEECH_RPM overrides the configured default)
    #[arg(long)]
    rpm: Option<u32>,

    /// Audio format (mp3, opus, aac, flac, wav, pcm)
    #[arg(long)]
    format: Option<AudioFormat>,

    /// Maximum characters per request
    #[arg(long)]
    max_length: Option<usize>,

    /// Batch pacing: "minute" (wall-clock boundary) or "interval" (60s apart)
    #[arg(long)]
    pacing: Option<PacingStrategy>,

    /// Extra attempts for rate-limited or timed-out requests
    #[arg(long)]
    retries: Option<u32>,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set default voice
    SetVoice {
        /// Voice name
        voice: Voice,
    },
    /// Set default requests per minute
    SetRpm {
        /// Value (> 0)
        value: u32,
    },
    /// Set default audio format
    SetFormat {
        /// Format name
        format: AudioFormat,
    },
    /// Use the high definition model by default
    SetHd {
        /// true or false
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Store the API key in the speech client config
    SetKey {
        /// API key
        key: String,
    },
    /// Point the speech client at a compatible gateway
    SetBaseUrl {
        /// Base URL, e.g. https://api.openai.com/v1
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    load_env_file(Path::new(".env"));

    if let Some(Commands::Config { action }) = &args.command {
        return handle_config_command(action);
    }

    let input_path = args
        .input_file
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Input file path is required. Run 'gen-speech --help' for usage."))?;

    if !input_path.exists() {
        anyhow::bail!("Input file not found: {}", input_path.display());
    }

    let config = GenSpeechConfig::load().context("Failed to load configuration")?;
    let env_rpm = std::env::var(RPM_ENV_VAR).ok();
    let requests_per_minute = config.resolve_requests_per_minute(args.rpm, env_rpm.as_deref());

    let settings = VoiceSettings {
        voice: args.voice.unwrap_or(config.voice),
        model: if args.hd {
            SpeechModel::HighDefinition
        } else {
            config.model
        },
        format: args.format.unwrap_or(config.format),
    };

    let output_path = match args.output.clone() {
        Some(path) => path,
        None => default_output_path(&input_path, settings.format),
    };
    let work_dir = work_dir_for(&output_path)?;

    let options = PipelineOptions {
        settings,
        requests_per_minute: requests_per_minute as usize,
        max_chunk_length: args.max_length.unwrap_or(config.max_chunk_length),
        keep_intermediates: args.keep,
        retry: RetryConfig::with_retries(args.retries.unwrap_or(config.retries)),
    };

    log::debug!("Input: {}", input_path.display());
    log::debug!("Output: {}", output_path.display());
    log::debug!("Work dir: {}", work_dir.display());
    log::debug!("Options: {:?}", options);

    let text = std::fs::read_to_string(&input_path)
        .with_context(|| format!("Failed to read {}", input_path.display()))?;

    let client_config = ClientConfig::load().context("Failed to load speech client configuration")?;
    let provider =
        speech_client::get_provider(&client_config).context("Failed to initialize speech provider")?;

    let concat = FfmpegConcat::default();
    if !concat.is_available() {
        anyhow::bail!("ffmpeg not found on PATH; it is required to join the audio segments");
    }

    let pacer = args.pacing.unwrap_or(config.pacing).pacer();
    let job = Job::new(&input_path, &work_dir, options.settings.format.extension());

    eprintln!(
        "Converting {} with voice {} ({}), {} requests per minute",
        input_path.display(),
        options.settings.voice,
        options.settings.model,
        options.requests_per_minute
    );

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let collaborators = Collaborators {
        provider: provider.as_ref(),
        pacer: pacer.as_ref(),
        concat: &concat,
    };

    let result = pipeline::generate_speech(
        &text,
        &job,
        &output_path,
        &options,
        &collaborators,
        |progress| {
            pb.set_length(progress.total as u64);
            pb.set_position(progress.completed as u64);
            pb.set_message(format!("batch {}/{}", progress.batch, progress.total_batches));
        },
    )
    .await;

    match result {
        Ok(path) => {
            pb.finish_with_message("Synthesis complete!");
            let size_mb = std::fs::metadata(&path)?.len() as f64 / (1024.0 * 1024.0);
            eprintln!("Output: {} ({:.1} MB)", path.display(), size_mb);
            Ok(())
        }
        Err(e) => {
            pb.abandon();
            Err(e).context("Speech generation failed")
        }
    }
}

/// `<input stem>.<extension>` next to the input file.
fn default_output_path(input_path: &Path, format: AudioFormat) -> PathBuf {
    let stem = input_path.file_stem().unwrap_or_default();
    input_path.with_file_name(format!("{}.{}", stem.to_string_lossy(), format.extension()))
}

/// Absolute directory that will hold intermediates for `output_path`.
fn work_dir_for(output_path: &Path) -> Result<PathBuf> {
    let parent = match output_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::path::absolute(&parent)
        .with_context(|| format!("Failed to resolve output directory {}", parent.display()))
}

/// Load variables from a `.env` file. Variables already set in the process
/// environment are left alone. Returns whether the file was loaded.
fn load_env_file(path: &Path) -> bool {
    match dotenvy::from_path(path) {
        Ok(()) => {
            log::debug!("Loaded environment from {}", path.display());
            true
        }
        Err(e) if e.not_found() => {
            log::debug!("No {} file, using process environment only", path.display());
            false
        }
        Err(e) => {
            log::warn!("Ignoring {}: {}", path.display(), e);
            false
        }
    }
}

/// Show only the last four characters of a secret.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = GenSpeechConfig::load()?;
            println!("Configuration file: {:?}", GenSpeechConfig::config_path()?);
            println!();
            println!("voice = \"{}\"", config.voice);
            println!("model = \"{}\"", config.model);
            println!("format = \"{}\"", config.format);
            println!("requests_per_minute = {}", config.requests_per_minute);
            if let Ok(env_rpm) = std::env::var(RPM_ENV_VAR) {
                println!("  ({} = {} overrides this)", RPM_ENV_VAR, env_rpm);
            }
            println!("max_chunk_length = {}", config.max_chunk_length);
            println!("pacing = \"{}\"", config.pacing);
            println!("retries = {}", config.retries);

            let client = ClientConfig::load()?;
            println!();
            println!("Speech client file: {:?}", ClientConfig::config_path()?);
            println!();
            match &client.api_key {
                Some(key) => println!("api_key = \"{}\"", mask_key(key)),
                None => println!("api_key = (from {})", speech_client::providers::OPENAI_API_KEY_ENV),
            }
            if let Some(url) = &client.base_url {
                println!("base_url = \"{}\"", url);
            }
            println!("timeout_secs = {}", client.timeout_secs);
        }
        ConfigAction::SetVoice { voice } => {
            let mut config = GenSpeechConfig::load()?;
            config.voice = *voice;
            config.save()?;
            println!("Default voice set to: {}", voice);
        }
        ConfigAction::SetRpm { value } => {
            if *value == 0 {
                anyhow::bail!("Requests per minute must be greater than zero");
            }
            let mut config = GenSpeechConfig::load()?;
            config.requests_per_minute = *value;
            config.save()?;
            println!("Default requests per minute set to: {}", value);
        }
        ConfigAction::SetFormat { format } => {
            let mut config = GenSpeechConfig::load()?;
            config.format = *format;
            config.save()?;
            println!("Default format set to: {}", format);
        }
        ConfigAction::SetHd { enabled } => {
            let mut config = GenSpeechConfig::load()?;
            config.model = if *enabled {
                SpeechModel::HighDefinition
            } else {
                SpeechModel::Standard
            };
            config.save()?;
            println!("Default model set to: {}", config.model);
        }
        ConfigAction::SetKey { key } => {
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("API key must not be empty");
            }
            let mut client = ClientConfig::load()?;
            client.api_key = Some(key.to_string());
            client.save()?;
            println!("API key saved to {:?}", ClientConfig::config_path()?);
        }
        ConfigAction::SetBaseUrl { url } => {
            let mut client = ClientConfig::load()?;
            client.base_url = Some(url.trim_end_matches('/').to_string());
            client.save()?;
            println!("Base URL set to: {}", url.trim_end_matches('/'));
        }
    }
    Ok(())
}
