//! Client configuration
//!
//! `ClientConfig` holds every tunable of a connection: socket deadlines,
//! retry policy, queue sizes and where artifacts go. It is built once at
//! startup (defaults or a JSON file) and read-only afterwards.
//!
//! `SessionDescriptor` is the conversation setup sent to the server as the
//! first `session.update`.
//!
//! # Example
//!
//! ```no_run
//! use realtalk_lib::config::ClientConfig;
//!
//! let config = ClientConfig::load("realtalk.json").unwrap();
//! println!("artifacts go to {}", config.output_dir.display());
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::audio::wav::WavSpec;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Connection-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Deadline for one socket read; expiry only re-arms the read
    pub read_timeout_ms: u64,
    /// Deadline for one socket write attempt
    pub write_timeout_ms: u64,
    /// Keep-alive ping period
    pub ping_interval_ms: u64,
    /// Send attempts before giving up
    pub max_retries: u32,
    /// Backoff unit; the pause after failed attempt `n` is `n` units
    pub retry_backoff_ms: u64,
    /// Capacity of internal queues
    pub channel_capacity: usize,
    /// Upper bound on waiting for tasks during shutdown
    pub shutdown_timeout_ms: u64,
    /// Where finished WAV and transcript files are written
    pub output_dir: PathBuf,
    /// Where the JSON-lines event log is written
    pub log_dir: PathBuf,
    /// Raw bytes per outbound `input_audio_buffer.append`
    pub upload_chunk_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 90_000,
            write_timeout_ms: 30_000,
            ping_interval_ms: 20_000,
            max_retries: 3,
            retry_backoff_ms: 1_000,
            channel_capacity: 100,
            shutdown_timeout_ms: 5_000,
            output_dir: PathBuf::from("audio_output"),
            log_dir: PathBuf::from("logs"),
            upload_chunk_bytes: 16 * 1024,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults; missing fields take their default
    /// values.
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file exists but cannot be read
    /// - `ConfigError::Json` if it is not valid JSON
    /// - `ConfigError::Invalid` if a value fails [`ClientConfig::validate`]
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;

        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Write configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be at least 1".into(),
            ));
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.ping_interval_ms == 0 {
            return Err(ConfigError::Invalid("ping_interval_ms must be non-zero".into()));
        }
        let frame = usize::from(WavSpec::default().block_align());
        if self.upload_chunk_bytes == 0 || self.upload_chunk_bytes % frame != 0 {
            return Err(ConfigError::Invalid(format!(
                "upload_chunk_bytes must be a non-zero multiple of {frame}"
            )));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Conversation parameters negotiated once per connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDescriptor {
    /// Output modalities, e.g. `["text", "audio"]`
    pub modalities: Vec<String>,
    /// System instructions
    pub instructions: String,
    /// Voice name for audio output
    pub voice: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Token limit per response
    pub max_response_output_tokens: u32,
    /// Format of audio sent to the server
    pub input_audio_format: String,
    /// Format of audio received from the server
    pub output_audio_format: String,
}

const DEFAULT_INSTRUCTIONS: &str = "System settings:\n\
Instructions:\n\
- You are an artificial intelligence agent\n\
- Be kind, helpful, and courteous\n\
- It is okay to ask the user questions\n\
- Be open to exploration and conversation\n\
\n\
Personality:\n\
- Be upbeat and genuine\n\
- Try to be informative and engaging\n\
- Use a natural, conversational tone\n";

impl Default for SessionDescriptor {
    fn default() -> Self {
        Self {
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            voice: "alloy".to_string(),
            temperature: 0.8,
            max_response_output_tokens: 4096,
            input_audio_format: "pcm16".to_string(),
            output_audio_format: "pcm16".to_string(),
        }
    }
}

impl SessionDescriptor {
    /// Text-only conversation
    pub fn text_only() -> Self {
        Self {
            modalities: vec!["text".to_string()],
            ..Default::default()
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}
