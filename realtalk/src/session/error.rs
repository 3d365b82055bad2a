//! Client-level error type

use thiserror::Error;

use crate::audio::error::AudioError;
use crate::config::ConfigError;
use crate::network::error::NetworkError;

/// Errors returned by [`RealtimeClient`](crate::session::RealtimeClient)
#[derive(Error, Debug)]
pub enum ClientError {
    /// Shutdown has started; the client accepts no more work
    #[error("Client is not running")]
    NotRunning,

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
