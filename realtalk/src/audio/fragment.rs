//! Audio fragments and stream identity
//!
//! The server splits each spoken response into many `response.audio.delta`
//! events. Every delta carries the `(response_id, item_id)` pair that says
//! which stream it belongs to.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::audio::error::{AudioError, AudioResult};

/// Upper bound for the silence a trimmed-audio sentinel may expand to (16 MiB)
pub const MAX_TRIMMED_BYTES: usize = 16 * 1024 * 1024;

const TRIMMED_PREFIX: &str = "[trimmed: ";
const TRIMMED_SUFFIX: &str = " bytes]";

/// Identity of one in-flight audio stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    /// Server-issued response id
    pub response_id: String,
    /// Server-issued output item id
    pub item_id: String,
}

impl StreamKey {
    pub fn new(response_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            response_id: response_id.into(),
            item_id: item_id.into(),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.response_id, self.item_id)
    }
}

/// One ordered slice of a stream's raw PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFragment {
    /// Stream the payload belongs to
    pub key: StreamKey,
    /// Position of the item in the response output
    pub output_index: u32,
    /// Position of the content part inside the item
    pub content_index: u32,
    /// Raw PCM bytes
    pub payload: Vec<u8>,
}

/// Decode the `delta` field of an audio delta event
///
/// Deltas are normally base64. Some proxies and log replays replace the audio
/// with a `"[trimmed: N bytes]"` marker; that is expanded to N zero bytes so
/// the stream keeps its length and timing, at the cost of silence.
///
/// # Errors
/// - `AudioError::Decode` for invalid base64
/// - `AudioError::BadSentinel` if the marker's byte count does not parse
/// - `AudioError::SentinelTooLarge` above [`MAX_TRIMMED_BYTES`]
pub fn decode_delta(delta: &str) -> AudioResult<Vec<u8>> {
    if let Some(count) = delta
        .strip_prefix(TRIMMED_PREFIX)
        .and_then(|rest| rest.strip_suffix(TRIMMED_SUFFIX))
    {
        let size: usize = count
            .trim()
            .parse()
            .map_err(|_| AudioError::BadSentinel(delta.to_string()))?;
        if size > MAX_TRIMMED_BYTES {
            return Err(AudioError::SentinelTooLarge(size));
        }
        return Ok(vec![0u8; size]);
    }

    Ok(STANDARD.decode(delta)?)
}
