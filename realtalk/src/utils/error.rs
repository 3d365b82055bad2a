//! Application-wide error handling
//!
//! `AppError` aggregates the module errors so the binary can report any of
//! them the same way: a stable [`ErrorCode`], a short message for the
//! terminal, and an optional hint on what to do next.
//!
//! # Example
//!
//! ```
//! use realtalk_lib::network::NetworkError;
//! use realtalk_lib::utils::error::{AppError, ErrorCode};
//!
//! let err = AppError::from(NetworkError::AuthenticationFailed);
//! assert_eq!(err.code(), ErrorCode::NetworkAuthFailed);
//! assert!(err.recovery_hint().is_some());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::error::{AudioError, WavError};
use crate::config::ConfigError;
use crate::network::error::NetworkError;
use crate::session::ClientError;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Client errors are unwrapped into the variants above where possible
    #[error("Client error: {0}")]
    Client(ClientError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Audio(e) => AppError::Audio(e),
            ClientError::Network(e) => AppError::Network(e),
            ClientError::Config(e) => AppError::Config(e),
            other => AppError::Client(other),
        }
    }
}

/// Stable error identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Audio
    AudioInvalidFile,
    AudioDecodeFailed,
    AudioStreamState,
    AudioIoFailed,

    // Network
    NetworkConnectionFailed,
    NetworkAuthFailed,
    NetworkTimeout,
    NetworkClosed,
    NetworkSendFailed,
    NetworkProtocolError,

    // Config
    ConfigLoadFailed,
    ConfigInvalid,

    // Client
    ClientNotRunning,

    // General
    OperationCancelled,
    InternalError,
}

/// Error details for display or structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub code: ErrorCode,
    /// Short message for the user
    pub message: String,
    /// Full error chain, for logs
    pub detail: Option<String>,
    pub recovery_hint: Option<String>,
    pub recoverable: bool,
}

impl ErrorContext {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            recovery_hint: None,
            recoverable: true,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_recovery_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }

    pub fn not_recoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Audio(AudioError::InvalidWav(_) | AudioError::InvalidChunkSize(_)) => {
                ErrorCode::AudioInvalidFile
            }
            AppError::Audio(
                AudioError::Decode(_) | AudioError::BadSentinel(_) | AudioError::SentinelTooLarge(_),
            ) => ErrorCode::AudioDecodeFailed,
            AppError::Audio(AudioError::StreamNotFound(_) | AudioError::EmptyStream(_)) => {
                ErrorCode::AudioStreamState
            }
            AppError::Audio(AudioError::Io(_)) => ErrorCode::AudioIoFailed,
            AppError::Audio(AudioError::Transport(e)) => network_code(e),

            AppError::Network(e) => network_code(e),

            AppError::Config(ConfigError::Invalid(_) | ConfigError::Json(_)) => {
                ErrorCode::ConfigInvalid
            }
            AppError::Config(ConfigError::Io(_)) => ErrorCode::ConfigLoadFailed,

            AppError::Client(ClientError::NotRunning) => ErrorCode::ClientNotRunning,
            AppError::Client(_) => ErrorCode::InternalError,

            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// One-line message suitable for the terminal
    pub fn user_message(&self) -> String {
        match self {
            AppError::Audio(AudioError::InvalidWav(WavError::ChannelMismatch { .. }))
            | AppError::Audio(AudioError::InvalidWav(WavError::SampleRateMismatch { .. }))
            | AppError::Audio(AudioError::InvalidWav(WavError::BitDepthMismatch { .. })) => {
                "The audio file has the wrong sample format".to_string()
            }
            AppError::Audio(AudioError::InvalidWav(_)) => "Not a usable WAV file".to_string(),
            AppError::Audio(AudioError::Io(e)) => format!("Could not access audio file: {e}"),
            AppError::Audio(AudioError::Transport(e)) => network_message(e),
            AppError::Audio(_) => "Audio processing failed".to_string(),

            AppError::Network(e) => network_message(e),

            AppError::Config(ConfigError::Invalid(msg)) => format!("Invalid configuration: {msg}"),
            AppError::Config(_) => "Could not load configuration".to_string(),

            AppError::Client(ClientError::NotRunning) => "The session has ended".to_string(),
            AppError::Client(e) => e.to_string(),

            AppError::Internal(msg) => format!("Internal error: {msg}"),
        }
    }

    pub fn recovery_hint(&self) -> Option<String> {
        match self {
            AppError::Network(NetworkError::AuthenticationFailed) => {
                Some("Check that OPENAI_API_KEY holds a valid key".to_string())
            }
            AppError::Network(NetworkError::ConnectionFailed(_) | NetworkError::Timeout(_)) => {
                Some("Check your network connection and try again".to_string())
            }
            AppError::Audio(AudioError::InvalidWav(_)) => {
                Some("Convert the file to 24 kHz mono 16-bit PCM WAV".to_string())
            }
            AppError::Client(ClientError::NotRunning) => {
                Some("Restart the client to open a new session".to_string())
            }
            _ => None,
        }
    }

    pub fn context(&self) -> ErrorContext {
        let mut ctx = ErrorContext::new(self.code(), self.user_message()).with_detail(self.to_string());
        ctx.recovery_hint = self.recovery_hint();

        if !self.is_recoverable() {
            ctx = ctx.not_recoverable();
        }
        ctx
    }

    /// Whether the session can keep going after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Network(e) => !e.is_fatal(),
            AppError::Config(_) | AppError::Internal(_) => false,
            AppError::Client(ClientError::NotRunning) => false,
            _ => true,
        }
    }
}

fn network_code(err: &NetworkError) -> ErrorCode {
    match err {
        NetworkError::ConnectionFailed(_) | NetworkError::InvalidConfig(_) => {
            ErrorCode::NetworkConnectionFailed
        }
        NetworkError::HttpError(_) => ErrorCode::NetworkConnectionFailed,
        NetworkError::AuthenticationFailed => ErrorCode::NetworkAuthFailed,
        NetworkError::Timeout(_) => ErrorCode::NetworkTimeout,
        NetworkError::ConnectionClosed | NetworkError::UnexpectedClose { .. } => {
            ErrorCode::NetworkClosed
        }
        NetworkError::RetriesExhausted { .. } => ErrorCode::NetworkSendFailed,
        NetworkError::WebSocketError(_) | NetworkError::SerializationError(_) => {
            ErrorCode::NetworkProtocolError
        }
        NetworkError::Cancelled => ErrorCode::OperationCancelled,
    }
}

fn network_message(err: &NetworkError) -> String {
    match err {
        NetworkError::AuthenticationFailed => "The API key was rejected".to_string(),
        NetworkError::ConnectionFailed(_) => "Could not reach the server".to_string(),
        NetworkError::Timeout(ms) => format!("The server did not answer within {ms}ms"),
        NetworkError::ConnectionClosed | NetworkError::UnexpectedClose { .. } => {
            "The connection was closed".to_string()
        }
        NetworkError::RetriesExhausted { attempts, .. } => {
            format!("Sending failed after {attempts} attempts")
        }
        NetworkError::Cancelled => "Cancelled by shutdown".to_string(),
        _ => "Network error".to_string(),
    }
}

/// Application result type
pub type AppResult<T> = Result<T, AppError>;

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}
