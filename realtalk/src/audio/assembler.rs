//! Assembler task: the single consumer of inbound audio commands
//!
//! The dispatcher pushes fragments, completions and transcripts into one
//! bounded FIFO queue. Because one task consumes that queue in order, a
//! completion is always handled after every fragment that preceded it on the
//! wire, even when the queue is backed up.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::artifacts::ArtifactWriter;
use crate::audio::error::AudioResult;
use crate::audio::fragment::{AudioFragment, StreamKey};
use crate::audio::reassembler::AudioReassembler;

/// Work item for the assembler task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerCommand {
    /// Append a decoded fragment to its stream
    Fragment(AudioFragment),
    /// The stream is finished: drain, encode and persist it
    Complete(StreamKey),
    /// Attach a transcript to a persisted stream
    Transcript { key: StreamKey, text: String },
}

/// Something the assembler wrote to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactNotice {
    AudioSaved {
        key: StreamKey,
        path: PathBuf,
        bytes: usize,
        duration_ms: u64,
    },
    TranscriptSaved {
        key: StreamKey,
        path: PathBuf,
    },
}

/// Turns audio commands into buffered streams and finished artifacts
#[derive(Debug)]
pub struct StreamAssembler {
    reassembler: Arc<AudioReassembler>,
    artifacts: ArtifactWriter,
    saved: HashMap<StreamKey, PathBuf>,
}

impl StreamAssembler {
    pub fn new(reassembler: Arc<AudioReassembler>, artifacts: ArtifactWriter) -> Self {
        Self {
            reassembler,
            artifacts,
            saved: HashMap::new(),
        }
    }

    /// Apply one command
    ///
    /// On completion the buffer is drained before anything touches the
    /// disk, so a failed write still releases the stream. The artifact path
    /// is remembered only once the WAV file exists.
    ///
    /// # Errors
    /// - `AudioError::StreamNotFound` / `AudioError::EmptyStream` when a
    ///   completion has nothing to drain
    /// - `AudioError::Io` if the artifact cannot be written
    pub async fn handle(&mut self, command: AssemblerCommand) -> AudioResult<Option<ArtifactNotice>> {
        match command {
            AssemblerCommand::Fragment(fragment) => {
                self.reassembler.append(fragment);
                Ok(None)
            }
            AssemblerCommand::Complete(key) => {
                let pcm = self.reassembler.drain(&key)?;
                let path = self.artifacts.allocate_path().await?;
                let duration_ms = self.artifacts.write_wav(&path, &pcm).await?;

                self.saved.insert(key.clone(), path.clone());

                Ok(Some(ArtifactNotice::AudioSaved {
                    key,
                    path,
                    bytes: pcm.len(),
                    duration_ms,
                }))
            }
            AssemblerCommand::Transcript { key, text } => {
                let Some(wav_path) = self.saved.remove(&key) else {
                    debug!(key = %key, "No saved audio for transcript");
                    return Ok(None);
                };

                let path = self.artifacts.write_transcript(&wav_path, &text).await?;
                Ok(Some(ArtifactNotice::TranscriptSaved { key, path }))
            }
        }
    }

    /// Number of saved streams still waiting for a transcript
    pub fn awaiting_transcript(&self) -> usize {
        self.saved.len()
    }

    /// Consume commands until the queue closes or the session is cancelled
    ///
    /// Failures are logged and never end the task. Notices are delivered
    /// with `try_send`; a full or closed notice channel drops them.
    pub async fn run<N>(
        mut self,
        mut commands: mpsc::Receiver<AssemblerCommand>,
        notices: mpsc::Sender<N>,
        cancel: CancellationToken,
    ) where
        N: From<ArtifactNotice> + Send,
    {
        info!(output_dir = %self.artifacts.output_dir().display(), "Assembler task started");

        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match self.handle(command).await {
                Ok(Some(notice)) => {
                    if notices.try_send(N::from(notice)).is_err() {
                        debug!("Artifact notice dropped");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Audio assembly failed"),
            }
        }

        info!(
            awaiting_transcript = self.awaiting_transcript(),
            "Assembler task stopped"
        );
    }
}
