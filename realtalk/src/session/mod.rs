//! Realtime conversation session
//!
//! [`RealtimeClient`] owns one connection and everything running on it:
//!
//! ```text
//!                 ┌──────────────┐  Fragment/Complete/Transcript  ┌───────────┐
//!  socket ──────▶ │  dispatcher  │ ─────────── FIFO ────────────▶ │ assembler │ ──▶ .wav/.txt
//!                 └──────┬───────┘                                └─────┬─────┘
//!                        │ DisplayEvent                                 │ notices
//!                        ▼                                              ▼
//!                   display channel ◀───────────────────────────────────┘
//!
//!  keep-alive ── ping every interval ──▶ socket
//!  caller ── send_text / send_audio_file ──▶ socket
//! ```
//!
//! # Shutdown
//!
//! Whoever wins [`Lifecycle::begin_shutdown`] runs the whole sequence:
//!
//! 1. cancel the shared token so every task stops waiting
//! 2. best-effort close handshake on the socket
//! 3. close the event log
//! 4. join all tasks, bounded by `shutdown_timeout`; stragglers are aborted
//! 5. release the socket, drop held senders and discard unfinished audio
//!    streams
//!
//! Everyone else gets [`ShutdownOutcome::AlreadyRequested`] immediately.
//! Tasks never call `shutdown` themselves; they send a [`ShutdownReason`]
//! to a watcher task that is outside the joined set.
//!
//! # Example
//!
//! ```no_run
//! use realtalk_lib::config::{ClientConfig, SessionDescriptor};
//! use realtalk_lib::network::ConnectionConfig;
//! use realtalk_lib::session::{RealtimeClient, ShutdownReason};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RealtimeClient::connect(
//!         "api-key",
//!         &ConnectionConfig::new(),
//!         ClientConfig::default(),
//!         SessionDescriptor::default(),
//!     )
//!     .await?;
//!
//!     client.send_text("Hello!").await?;
//!     client.shutdown(ShutdownReason::UserRequested).await;
//!     Ok(())
//! }
//! ```

pub mod dispatcher;
pub mod error;
pub mod lifecycle;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::artifacts::ArtifactWriter;
use crate::audio::assembler::{ArtifactNotice, StreamAssembler};
use crate::audio::fragment::StreamKey;
use crate::audio::framer::{AudioFramer, UploadSummary};
use crate::audio::reassembler::AudioReassembler;
use crate::audio::wav::WavSpec;
use crate::config::{ClientConfig, SessionDescriptor};
use crate::network::connection::{ConnectionConfig, RealtimeConnection};
use crate::network::messages::{ClientEvent, ConversationItem};
use crate::network::tasks::keepalive_task;
use crate::network::transport::Transport;
use crate::utils::event_log::EventLog;
use crate::utils::metrics::{Metrics, MetricsSnapshot};

pub use dispatcher::{DispatchEnd, FrameRouter, dispatcher_task};
pub use error::{ClientError, ClientResult};
pub use lifecycle::{Lifecycle, LifecycleState};

/// Capacity of the shutdown request channel
const TRIGGER_CAPACITY: usize = 4;

/// Something worth showing to the user
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    /// The server accepted the connection
    SessionStarted { session_id: String, model: String },
    /// Text produced by a text-modality response
    AssistantText { text: String },
    /// Transcript of a spoken response
    Transcript { key: StreamKey, text: String },
    /// A response's audio was written to disk
    AudioSaved { path: PathBuf, duration_ms: u64 },
    /// A transcript file was written next to its audio
    TranscriptSaved { path: PathBuf },
    /// The server reported an error
    ServerError { message: String },
}

impl From<ArtifactNotice> for DisplayEvent {
    fn from(notice: ArtifactNotice) -> Self {
        match notice {
            ArtifactNotice::AudioSaved {
                path, duration_ms, ..
            } => DisplayEvent::AudioSaved { path, duration_ms },
            ArtifactNotice::TranscriptSaved { path, .. } => DisplayEvent::TranscriptSaved { path },
        }
    }
}

/// Why the session is ending
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The caller asked to stop
    UserRequested,
    /// The process received an interrupt
    Interrupted,
    /// The server closed the connection
    PeerClosed,
    /// An unrecoverable transport failure
    Fatal(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::UserRequested => write!(f, "user requested"),
            ShutdownReason::Interrupted => write!(f, "interrupted"),
            ShutdownReason::PeerClosed => write!(f, "server closed connection"),
            ShutdownReason::Fatal(message) => write!(f, "fatal error: {message}"),
        }
    }
}

/// Result of a [`RealtimeClient::shutdown`] call
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownOutcome {
    /// This call ran the shutdown sequence
    Completed {
        /// Some task had to be aborted after `shutdown_timeout`
        timed_out: bool,
        /// Unfinished audio streams that were dropped
        discarded_streams: usize,
        metrics: MetricsSnapshot,
    },
    /// Another caller is running (or ran) the shutdown
    AlreadyRequested,
}

struct ClientInner {
    config: ClientConfig,
    lifecycle: Lifecycle,
    transport: Arc<Transport>,
    reassembler: Arc<AudioReassembler>,
    framer: AudioFramer,
    metrics: Arc<Metrics>,
    event_log: Arc<EventLog>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    trigger_tx: Mutex<Option<mpsc::Sender<ShutdownReason>>>,
    display_rx: Mutex<Option<mpsc::Receiver<DisplayEvent>>>,
    reason: Mutex<Option<ShutdownReason>>,
    closed: Notify,
}

/// Handle to a running realtime session
///
/// Cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RealtimeClient {
    /// Connect and start a session
    ///
    /// # Errors
    /// - `ClientError::Config` if `config` fails validation
    /// - `ClientError::Network` if the connection or `session.update` fails
    pub async fn connect(
        api_key: &str,
        connection: &ConnectionConfig,
        config: ClientConfig,
        session: SessionDescriptor,
    ) -> ClientResult<Self> {
        config.validate()?;
        let connection = RealtimeConnection::connect(api_key, connection).await?;
        Self::start(connection, config, session).await
    }

    /// Start a session on an established connection
    ///
    /// Sends `session.update` first, then spawns the assembler, keep-alive,
    /// dispatcher and shutdown watcher tasks.
    pub async fn start(
        connection: RealtimeConnection,
        config: ClientConfig,
        session: SessionDescriptor,
    ) -> ClientResult<Self> {
        config.validate()?;
        let framer = AudioFramer::new(WavSpec::default(), config.upload_chunk_bytes)?;
        let metrics = Arc::new(Metrics::default());
        let event_log = Arc::new(EventLog::create(&config.log_dir).unwrap_or_else(|e| {
            warn!(dir = %config.log_dir.display(), error = %e, "Event log disabled");
            EventLog::disabled()
        }));
        let cancel = CancellationToken::new();

        let transport = Arc::new(Transport::new(
            connection,
            &config,
            metrics.clone(),
            event_log.clone(),
            cancel.clone(),
        ));

        if let Err(e) = transport
            .send_with_retry(&ClientEvent::SessionUpdate { session })
            .await
        {
            error!(error = %e, "Failed to configure session");
            cancel.cancel();
            transport.close().await;
            event_log.close();
            return Err(e.into());
        }

        let reassembler = Arc::new(AudioReassembler::new(metrics.clone()));
        let (audio_tx, audio_rx) = mpsc::channel(config.channel_capacity);
        let (display_tx, display_rx) = mpsc::channel(config.channel_capacity);
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_CAPACITY);

        let mut tasks = Vec::with_capacity(3);

        let assembler = StreamAssembler::new(
            reassembler.clone(),
            ArtifactWriter::new(&config.output_dir, WavSpec::default()),
        );
        tasks.push((
            "assembler",
            tokio::spawn(assembler.run(audio_rx, display_tx.clone(), cancel.clone())),
        ));

        let keepalive = {
            let transport = transport.clone();
            let trigger = trigger_tx.clone();
            let cancel = cancel.clone();
            let period = config.ping_interval();
            let max_failures = config.max_retries;
            tokio::spawn(async move {
                if let Err(e) = keepalive_task(transport, period, max_failures, cancel).await {
                    error!(error = %e, "Keep-alive gave up");
                    request_shutdown(&trigger, ShutdownReason::Fatal(e.to_string())).await;
                }
            })
        };
        tasks.push(("keepalive", keepalive));

        let dispatcher = {
            let router = FrameRouter::new(
                audio_tx,
                display_tx,
                metrics.clone(),
                event_log.clone(),
                cancel.clone(),
            );
            let transport = transport.clone();
            let trigger = trigger_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                match dispatcher_task(transport, router, cancel).await {
                    Ok(DispatchEnd::Cancelled) => {}
                    Ok(DispatchEnd::PeerClosed) => {
                        request_shutdown(&trigger, ShutdownReason::PeerClosed).await;
                    }
                    Err(e) => {
                        request_shutdown(&trigger, ShutdownReason::Fatal(e.to_string())).await;
                    }
                }
            })
        };
        tasks.push(("dispatcher", dispatcher));

        let client = Self {
            inner: Arc::new(ClientInner {
                config,
                lifecycle: Lifecycle::new(),
                transport,
                reassembler,
                framer,
                metrics,
                event_log,
                cancel,
                tasks: Mutex::new(tasks),
                trigger_tx: Mutex::new(Some(trigger_tx)),
                display_rx: Mutex::new(Some(display_rx)),
                reason: Mutex::new(None),
                closed: Notify::new(),
            }),
        };

        tokio::spawn(shutdown_watcher(client.clone(), trigger_rx));

        info!("Realtime session started");
        Ok(client)
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lifecycle.is_running()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Why the session ended, once shutdown has started
    ///
    /// Holds the reason of the call that won, which may differ from the one
    /// a losing caller passed.
    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        lock(&self.inner.reason).clone()
    }

    /// Path of the JSON-lines event log, if one is being written
    pub fn event_log_path(&self) -> Option<&Path> {
        self.inner.event_log.path()
    }

    /// Take the receiving end of the display channel
    ///
    /// Returns `None` after the first call.
    pub fn take_display_events(&self) -> Option<mpsc::Receiver<DisplayEvent>> {
        lock(&self.inner.display_rx).take()
    }

    /// Send a user text message and ask for a response
    ///
    /// The time both sends take is recorded as a latency sample.
    ///
    /// # Errors
    /// - `ClientError::NotRunning` once shutdown has started
    /// - `ClientError::Network` if either send fails
    pub async fn send_text(&self, text: &str) -> ClientResult<()> {
        self.ensure_running()?;

        let started = Instant::now();
        let transport = &self.inner.transport;
        transport
            .send_with_retry(&ClientEvent::ConversationItemCreate {
                item: ConversationItem::user_text(text),
            })
            .await?;
        transport.send_with_retry(&ClientEvent::ResponseCreate).await?;
        self.inner.metrics.record_latency(started);

        debug!(chars = text.len(), "Text message sent");
        Ok(())
    }

    /// Stream a local WAV file as one user turn and ask for a response
    ///
    /// # Errors
    /// - `ClientError::NotRunning` once shutdown has started
    /// - `ClientError::Audio` for unreadable or mismatched files and send
    ///   failures
    pub async fn send_audio_file(&self, path: impl AsRef<Path>) -> ClientResult<UploadSummary> {
        self.ensure_running()?;

        let summary = self
            .inner
            .framer
            .upload(self.inner.transport.as_ref(), path.as_ref())
            .await?;
        Ok(summary)
    }

    /// Stop the session
    ///
    /// Safe to call any number of times from any task; only the first call
    /// does the work.
    pub async fn shutdown(&self, reason: ShutdownReason) -> ShutdownOutcome {
        let inner = &self.inner;

        if !inner.lifecycle.begin_shutdown() {
            debug!(reason = %reason, "Shutdown already in progress");
            return ShutdownOutcome::AlreadyRequested;
        }

        info!(reason = %reason, "Shutting down session");
        *lock(&inner.reason) = Some(reason);

        inner.cancel.cancel();
        inner.transport.close().await;
        inner.event_log.close();

        let tasks = std::mem::take(&mut *lock(&inner.tasks));
        let deadline = tokio::time::Instant::now() + inner.config.shutdown_timeout();
        let mut timed_out = false;

        for (name, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!(task = name, "Task stopped"),
                Ok(Err(e)) => warn!(task = name, error = %e, "Task ended abnormally"),
                Err(_) => {
                    warn!(task = name, "Task did not stop in time, aborting");
                    handle.abort();
                    timed_out = true;
                }
            }
        }

        inner.transport.release().await;
        lock(&inner.trigger_tx).take();
        lock(&inner.display_rx).take();
        let discarded_streams = inner.reassembler.discard_all();

        let metrics = inner.metrics.snapshot();
        info!(
            sent = metrics.messages_sent,
            received = metrics.messages_received,
            errors = metrics.errors,
            audio_fragments = metrics.audio_fragments,
            mean_latency_ms = ?metrics.mean_latency_ms,
            discarded_streams,
            timed_out,
            "Session closed"
        );

        inner.lifecycle.finish();
        inner.closed.notify_waiters();

        ShutdownOutcome::Completed {
            timed_out,
            discarded_streams,
            metrics,
        }
    }

    /// Wait until shutdown has started, whoever triggered it
    pub async fn shutdown_requested(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Wait until the shutdown sequence has finished
    pub async fn closed(&self) {
        let notified = self.inner.closed.notified();
        if self.state() == LifecycleState::Closed {
            return;
        }
        notified.await;
    }

    fn ensure_running(&self) -> ClientResult<()> {
        if self.inner.lifecycle.is_running() {
            Ok(())
        } else {
            Err(ClientError::NotRunning)
        }
    }
}

/// Forward a task's shutdown request to the watcher
async fn request_shutdown(trigger: &mpsc::Sender<ShutdownReason>, reason: ShutdownReason) {
    if trigger.send(reason).await.is_err() {
        debug!("Shutdown watcher already gone");
    }
}

/// Runs shutdown on behalf of tasks, which cannot join themselves
async fn shutdown_watcher(client: RealtimeClient, mut trigger_rx: mpsc::Receiver<ShutdownReason>) {
    let cancel = client.inner.cancel.clone();

    tokio::select! {
        reason = trigger_rx.recv() => {
            if let Some(reason) = reason {
                client.shutdown(reason).await;
            }
        }
        _ = cancel.cancelled() => {}
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
