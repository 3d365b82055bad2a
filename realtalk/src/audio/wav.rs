//! Canonical 44-byte WAV container
//!
//! Raw PCM received from the server is wrapped in a RIFF/WAVE header so any
//! player can open it, and local files are checked against the same layout
//! before they are streamed to the server.
//!
//! # Layout
//!
//! ```text
//! offset  size  field
//!  0      4     "RIFF"
//!  4      4     data_len + 36
//!  8      4     "WAVE"
//! 12      4     "fmt "
//! 16      4     16 (fmt chunk size)
//! 20      2     1 (linear PCM)
//! 22      2     channels
//! 24      4     sample rate
//! 28      4     byte rate
//! 32      2     block align
//! 34      2     bits per sample
//! 36      4     "data"
//! 40      4     data_len
//! 44      ...   samples
//! ```

use crate::audio::error::WavError;

/// Size of the canonical header in bytes
pub const WAV_HEADER_LEN: usize = 44;

/// Largest data chunk the 32-bit RIFF size field can describe
pub const MAX_DATA_LEN: usize = (u32::MAX - 36) as usize;

/// Linear PCM format code
pub const PCM_FORMAT: u16 = 1;

/// Sample format of a PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// Samples per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl Default for WavSpec {
    /// 24 kHz, mono, 16-bit: the format the realtime API speaks
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

impl WavSpec {
    /// Bytes per sample for one channel
    pub fn bytes_per_sample(&self) -> u32 {
        u32::from(self.bits_per_sample) / 8
    }

    /// Bytes per sample frame (all channels), saturating at `u16::MAX`
    pub fn block_align(&self) -> u16 {
        u16::try_from(self.frame_bytes()).unwrap_or(u16::MAX)
    }

    /// Bytes of audio per second, saturating at `u32::MAX`
    pub fn byte_rate(&self) -> u32 {
        u32::try_from(self.rate_bytes()).unwrap_or(u32::MAX)
    }

    /// Playback duration of `len` bytes of raw PCM in milliseconds
    pub fn duration_ms(&self, len: usize) -> u64 {
        let rate = self.rate_bytes();
        if rate == 0 {
            return 0;
        }
        len as u64 * 1000 / rate
    }

    fn frame_bytes(&self) -> u64 {
        u64::from(self.channels) * u64::from(self.bits_per_sample) / 8
    }

    fn rate_bytes(&self) -> u64 {
        u64::from(self.sample_rate) * u64::from(self.channels) * u64::from(self.bits_per_sample) / 8
    }
}

/// Build the 44-byte header for `data_len` bytes of PCM
///
/// # Errors
/// - `WavError::DataTooLarge` above [`MAX_DATA_LEN`]
/// - `WavError::UnrepresentableSpec` if block align or byte rate do not fit
///   their header fields
pub fn wav_header(data_len: usize, spec: &WavSpec) -> Result<[u8; WAV_HEADER_LEN], WavError> {
    if data_len > MAX_DATA_LEN {
        return Err(WavError::DataTooLarge(data_len));
    }
    let data_len_u32 = data_len as u32;
    let block_align =
        u16::try_from(spec.frame_bytes()).map_err(|_| WavError::UnrepresentableSpec(*spec))?;
    let byte_rate =
        u32::try_from(spec.rate_bytes()).map_err(|_| WavError::UnrepresentableSpec(*spec))?;

    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(data_len_u32 + 36).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&PCM_FORMAT.to_le_bytes());
    header[22..24].copy_from_slice(&spec.channels.to_le_bytes());
    header[24..28].copy_from_slice(&spec.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&spec.bits_per_sample.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len_u32.to_le_bytes());

    Ok(header)
}

/// Wrap raw PCM in a canonical WAV header
///
/// The output is always `pcm.len() + 44` bytes and the header depends only
/// on `pcm.len()` and `spec`.
///
/// # Errors
/// Same as [`wav_header`]
///
/// # Example
/// ```
/// use realtalk_lib::audio::wav::{encode_wav, WavSpec};
///
/// let wav = encode_wav(&[0u8; 480], &WavSpec::default()).unwrap();
/// assert_eq!(wav.len(), 480 + 44);
/// assert_eq!(&wav[0..4], b"RIFF");
/// ```
pub fn encode_wav(pcm: &[u8], spec: &WavSpec) -> Result<Vec<u8>, WavError> {
    let header = wav_header(pcm.len(), spec)?;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(pcm);
    Ok(out)
}

/// Parsed canonical WAV header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    /// Audio format code (1 = PCM)
    pub format: u16,
    /// Channel count
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Declared size of the data chunk
    pub data_len: u32,
}

impl WavHeader {
    /// Parse the first 44 bytes of a WAV file
    ///
    /// Only the structure is checked here; use [`WavHeader::validate`] to
    /// compare the sample format with what the server expects.
    ///
    /// # Errors
    /// Returns a `WavError` naming the first structural problem found
    pub fn parse(bytes: &[u8]) -> Result<Self, WavError> {
        if bytes.len() < WAV_HEADER_LEN {
            return Err(WavError::Truncated(bytes.len()));
        }
        if &bytes[0..4] != b"RIFF" {
            return Err(WavError::NotRiff);
        }
        if &bytes[8..12] != b"WAVE" {
            return Err(WavError::NotWave);
        }
        if &bytes[12..16] != b"fmt " || read_u32(bytes, 16) != 16 {
            return Err(WavError::MissingFmtChunk);
        }
        if &bytes[36..40] != b"data" {
            return Err(WavError::MissingDataChunk);
        }

        Ok(Self {
            format: read_u16(bytes, 20),
            channels: read_u16(bytes, 22),
            sample_rate: read_u32(bytes, 24),
            bits_per_sample: read_u16(bytes, 34),
            data_len: read_u32(bytes, 40),
        })
    }

    /// Check the sample format against `expected`
    ///
    /// Format code, channel count, sample rate and bit depth are checked in
    /// that order, each with its own rejection reason.
    pub fn validate(&self, expected: &WavSpec) -> Result<(), WavError> {
        if self.format != PCM_FORMAT {
            return Err(WavError::UnsupportedFormat(self.format));
        }
        if self.channels != expected.channels {
            return Err(WavError::ChannelMismatch {
                expected: expected.channels,
                actual: self.channels,
            });
        }
        if self.sample_rate != expected.sample_rate {
            return Err(WavError::SampleRateMismatch {
                expected: expected.sample_rate,
                actual: self.sample_rate,
            });
        }
        if self.bits_per_sample != expected.bits_per_sample {
            return Err(WavError::BitDepthMismatch {
                expected: expected.bits_per_sample,
                actual: self.bits_per_sample,
            });
        }
        Ok(())
    }

    /// Sample format described by this header
    pub fn spec(&self) -> WavSpec {
        WavSpec {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
        }
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
