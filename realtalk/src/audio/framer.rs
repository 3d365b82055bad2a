//! Outbound audio framing
//!
//! Streams a local WAV file to the server as one user turn:
//!
//! 1. `conversation.item.create` referencing the file by name
//! 2. one `input_audio_buffer.append` per chunk of raw samples
//! 3. `input_audio_buffer.commit`
//! 4. `response.create`
//!
//! The header is validated before anything is sent, so a file in the wrong
//! format never produces partial traffic.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::audio::error::{AudioError, AudioResult};
use crate::audio::wav::{WAV_HEADER_LEN, WavHeader, WavSpec};
use crate::network::messages::{ClientEvent, ConversationItem};
use crate::network::transport::EventSender;

/// What an upload put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    /// Number of append events
    pub chunks: u64,
    /// Raw sample bytes sent (before base64)
    pub bytes: u64,
    /// Playback duration of the uploaded samples
    pub duration_ms: u64,
}

/// Splits WAV files into append-sized chunks
#[derive(Debug, Clone)]
pub struct AudioFramer {
    spec: WavSpec,
    chunk_size: usize,
}

impl AudioFramer {
    /// # Errors
    /// `AudioError::InvalidChunkSize` unless `chunk_size` is a non-zero
    /// multiple of the sample frame
    pub fn new(spec: WavSpec, chunk_size: usize) -> AudioResult<Self> {
        let frame = usize::from(spec.block_align());
        if chunk_size == 0 || frame == 0 || chunk_size % frame != 0 {
            return Err(AudioError::InvalidChunkSize(chunk_size));
        }
        Ok(Self { spec, chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Playback time covered by one full chunk
    pub fn chunk_duration_ms(&self) -> u64 {
        self.spec.duration_ms(self.chunk_size)
    }

    /// Upload one WAV file as a user turn
    ///
    /// Every chunk but the last is exactly `chunk_size` bytes, so a file with
    /// `S` sample bytes produces `ceil(S / chunk_size)` appends. Any failure
    /// stops the upload and is returned as is; nothing is resumed.
    ///
    /// # Errors
    /// - `AudioError::Io` if the file cannot be opened or read
    /// - `AudioError::InvalidWav` if the header is malformed or the sample
    ///   format differs from the configured one
    /// - `AudioError::Transport` if an event cannot be sent
    pub async fn upload<S: EventSender>(&self, sender: &S, path: &Path) -> AudioResult<UploadSummary> {
        let mut file = File::open(path).await?;

        let mut header = [0u8; WAV_HEADER_LEN];
        let read = read_full(&mut file, &mut header).await?;
        let header = WavHeader::parse(&header[..read])?;
        header.validate(&self.spec)?;

        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        info!(
            path = %path.display(),
            chunk_bytes = self.chunk_size,
            chunk_ms = self.chunk_duration_ms(),
            "Uploading audio file"
        );

        sender
            .send_event(&ClientEvent::ConversationItemCreate {
                item: ConversationItem::user_audio(source),
            })
            .await?;

        let mut buffer = vec![0u8; self.chunk_size];
        let mut chunks = 0u64;
        let mut bytes = 0u64;

        loop {
            let read = read_full(&mut file, &mut buffer).await?;
            if read == 0 {
                break;
            }

            chunks += 1;
            bytes += read as u64;
            let audio = STANDARD.encode(&buffer[..read]);
            sender
                .send_event(&ClientEvent::audio_append(chunks, audio))
                .await?;

            debug!(
                chunk = chunks,
                bytes = read,
                sent_ms = self.spec.duration_ms(bytes as usize),
                "Audio chunk sent"
            );

            if read < self.chunk_size {
                break;
            }
        }

        sender.send_event(&ClientEvent::InputAudioBufferCommit).await?;
        sender.send_event(&ClientEvent::ResponseCreate).await?;

        let summary = UploadSummary {
            chunks,
            bytes,
            duration_ms: self.spec.duration_ms(bytes as usize),
        };
        info!(
            chunks = summary.chunks,
            bytes = summary.bytes,
            duration_ms = summary.duration_ms,
            "Audio upload committed"
        );
        Ok(summary)
    }
}

/// Read until `buf` is full or the file ends; returns the bytes read
async fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
