//! Audio-related error types
//!
//! Covers container validation, fragment decoding, stream buffer state and
//! artifact persistence.

use thiserror::Error;

use crate::audio::fragment::StreamKey;
use crate::audio::wav::WavSpec;
use crate::network::error::NetworkError;

/// Reasons a WAV container is rejected before upload
///
/// Every header field that the upload path depends on has its own variant so
/// the caller can tell the user exactly what is wrong with the file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WavError {
    /// Fewer bytes than a canonical header
    #[error("WAV header truncated: expected 44 bytes, got {0}")]
    Truncated(usize),

    /// Missing "RIFF" marker
    #[error("not a RIFF file")]
    NotRiff,

    /// Missing "WAVE" marker
    #[error("RIFF file is not WAVE")]
    NotWave,

    /// "fmt " chunk is missing or has an unexpected size
    #[error("missing or non-canonical fmt chunk")]
    MissingFmtChunk,

    /// "data" chunk does not follow the fmt chunk
    #[error("missing data chunk")]
    MissingDataChunk,

    /// Audio format code is not linear PCM
    #[error("unsupported audio format code {0} (expected 1, linear PCM)")]
    UnsupportedFormat(u16),

    /// Wrong number of channels
    #[error("unsupported channel count {actual} (expected {expected})")]
    ChannelMismatch { expected: u16, actual: u16 },

    /// Wrong sample rate
    #[error("unsupported sample rate {actual} Hz (expected {expected} Hz)")]
    SampleRateMismatch { expected: u32, actual: u32 },

    /// Wrong bit depth
    #[error("unsupported bit depth {actual} (expected {expected})")]
    BitDepthMismatch { expected: u16, actual: u16 },

    /// More PCM than a 32-bit RIFF size can describe
    #[error("audio data too large for a WAV file: {0} bytes")]
    DataTooLarge(usize),

    /// Block align or byte rate overflow their header fields
    #[error("sample format cannot be written to a WAV header: {0:?}")]
    UnrepresentableSpec(WavSpec),
}

/// Audio errors
#[derive(Error, Debug)]
pub enum AudioError {
    /// Invalid WAV container
    #[error("Invalid WAV file: {0}")]
    InvalidWav(#[from] WavError),

    /// Base64 payload could not be decoded
    #[error("Failed to decode audio payload: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Malformed "[trimmed: N bytes]" sentinel
    #[error("Malformed trimmed-audio sentinel: {0}")]
    BadSentinel(String),

    /// Trimmed sentinel asks for more silence than we are willing to allocate
    #[error("Trimmed-audio sentinel too large: {0} bytes")]
    SentinelTooLarge(usize),

    /// No buffer exists for the stream
    #[error("No audio buffer for stream {0}")]
    StreamNotFound(StreamKey),

    /// Buffer exists but holds no audio
    #[error("Empty audio buffer for stream {0}")]
    EmptyStream(StreamKey),

    /// File system failure while reading input or writing artifacts
    #[error("Audio I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid chunking configuration
    #[error("Invalid chunk size {0}")]
    InvalidChunkSize(usize),

    /// Sending an upload event failed
    #[error("Failed to send audio: {0}")]
    Transport(#[from] NetworkError),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
