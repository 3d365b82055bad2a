//! Keyed reassembly of inbound audio fragments
//!
//! Fragments for several streams can interleave on the socket. The
//! reassembler keeps one growable buffer per [`StreamKey`] behind a single
//! map-wide mutex and hands the concatenated bytes out exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::audio::error::{AudioError, AudioResult};
use crate::audio::fragment::{AudioFragment, StreamKey};
use crate::utils::metrics::Metrics;

/// Initial capacity reserved for a new stream (1 MiB)
const INITIAL_STREAM_CAPACITY: usize = 1024 * 1024;

/// Accumulated audio for one open stream
#[derive(Debug, Default)]
struct StreamBuffer {
    audio: Vec<u8>,
    fragments: u64,
}

/// Concurrent keyed accumulator for audio fragments
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use realtalk_lib::audio::{AudioFragment, AudioReassembler, StreamKey};
/// use realtalk_lib::utils::metrics::Metrics;
///
/// let reassembler = AudioReassembler::new(Arc::new(Metrics::default()));
/// let key = StreamKey::new("resp_1", "item_1");
///
/// reassembler.append(AudioFragment {
///     key: key.clone(),
///     output_index: 0,
///     content_index: 0,
///     payload: vec![1, 2, 3],
/// });
///
/// assert_eq!(reassembler.drain(&key).unwrap(), vec![1, 2, 3]);
/// assert!(reassembler.drain(&key).is_err());
/// ```
#[derive(Debug)]
pub struct AudioReassembler {
    streams: Mutex<HashMap<StreamKey, StreamBuffer>>,
    metrics: Arc<Metrics>,
}

impl AudioReassembler {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Append a fragment to its stream, opening the stream if needed
    pub fn append(&self, fragment: AudioFragment) {
        let mut streams = self.lock();

        let buffer = streams.entry(fragment.key).or_insert_with_key(|key| {
            debug!(key = %key, "Opened audio stream");
            StreamBuffer {
                audio: Vec::with_capacity(INITIAL_STREAM_CAPACITY),
                fragments: 0,
            }
        });

        buffer.audio.extend_from_slice(&fragment.payload);
        buffer.fragments += 1;
        self.metrics.record_audio_fragment();
    }

    /// Remove a stream and return its audio
    ///
    /// # Errors
    /// - `AudioError::StreamNotFound` if the key was never written or was
    ///   already drained
    /// - `AudioError::EmptyStream` if the stream holds no bytes (the empty
    ///   entry is removed as well)
    pub fn drain(&self, key: &StreamKey) -> AudioResult<Vec<u8>> {
        let mut streams = self.lock();

        let buffer = streams
            .remove(key)
            .ok_or_else(|| AudioError::StreamNotFound(key.clone()))?;

        if buffer.audio.is_empty() {
            return Err(AudioError::EmptyStream(key.clone()));
        }

        debug!(
            key = %key,
            bytes = buffer.audio.len(),
            fragments = buffer.fragments,
            "Drained audio stream"
        );
        Ok(buffer.audio)
    }

    /// Number of streams currently open
    pub fn open_streams(&self) -> usize {
        self.lock().len()
    }

    /// Bytes buffered for a stream, if it is open
    pub fn buffered_len(&self, key: &StreamKey) -> Option<usize> {
        self.lock().get(key).map(|buffer| buffer.audio.len())
    }

    /// Drop every open stream, returning how many were discarded
    pub fn discard_all(&self) -> usize {
        let mut streams = self.lock();
        let count = streams.len();
        for (key, buffer) in streams.drain() {
            warn!(key = %key, bytes = buffer.audio.len(), "Discarding unfinished audio stream");
        }
        count
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StreamKey, StreamBuffer>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
