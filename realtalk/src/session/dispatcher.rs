//! Protocol dispatcher
//!
//! Reads frames from the transport and routes each event:
//!
//! - audio deltas, audio completions and audio transcripts go, in arrival
//!   order, into the assembler queue
//! - text, transcripts, session and error notices go to the display channel
//! - everything else is logged and ignored
//!
//! Frames that are not JSON objects with a string `type` are dropped before
//! they are counted or logged.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::assembler::AssemblerCommand;
use crate::audio::fragment::{AudioFragment, StreamKey, decode_delta};
use crate::network::error::NetworkResult;
use crate::network::messages::ServerEvent;
use crate::network::transport::{Inbound, Transport};
use crate::session::DisplayEvent;
use crate::utils::event_log::{Direction, EventLog};
use crate::utils::metrics::Metrics;

/// Why the dispatcher loop stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEnd {
    /// The session was cancelled
    Cancelled,
    /// The server closed the connection cleanly
    PeerClosed,
}

/// Routes one parsed frame at a time
#[derive(Debug, Clone)]
pub struct FrameRouter {
    audio_tx: mpsc::Sender<AssemblerCommand>,
    display_tx: mpsc::Sender<DisplayEvent>,
    metrics: Arc<Metrics>,
    event_log: Arc<EventLog>,
    cancel: CancellationToken,
}

impl FrameRouter {
    pub fn new(
        audio_tx: mpsc::Sender<AssemblerCommand>,
        display_tx: mpsc::Sender<DisplayEvent>,
        metrics: Arc<Metrics>,
        event_log: Arc<EventLog>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            audio_tx,
            display_tx,
            metrics,
            event_log,
            cancel,
        }
    }

    /// Parse and route one text frame
    pub async fn route(&self, frame: &str) {
        let value: Value = match serde_json::from_str(frame) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Dropping non-JSON frame");
                return;
            }
        };

        let Some(event_type) = value.get("type").and_then(Value::as_str).map(str::to_owned)
        else {
            debug!("Dropping frame without a type");
            return;
        };

        self.metrics.record_received();
        let event = ServerEvent::deserialize(&value);
        self.event_log.log(Direction::Received, &event_type, value);

        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(event = %event_type, error = %e, "Malformed event");
                self.metrics.record_error();
                return;
            }
        };

        self.dispatch(&event_type, event).await;
    }

    async fn dispatch(&self, event_type: &str, event: ServerEvent) {
        match event {
            ServerEvent::AudioDelta {
                response_id,
                item_id,
                output_index,
                content_index,
                delta,
            } => {
                let key = StreamKey::new(response_id, item_id);
                let payload = match decode_delta(&delta) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(key = %key, error = %e, "Dropping undecodable audio delta");
                        self.metrics.record_error();
                        return;
                    }
                };

                debug!(key = %key, bytes = payload.len(), "Audio delta");
                self.enqueue(AssemblerCommand::Fragment(AudioFragment {
                    key,
                    output_index,
                    content_index,
                    payload,
                }))
                .await;
            }

            ServerEvent::AudioDone {
                response_id,
                item_id,
            } => {
                let key = StreamKey::new(response_id, item_id);
                debug!(key = %key, "Audio stream done");
                self.enqueue(AssemblerCommand::Complete(key)).await;
            }

            ServerEvent::ResponseDone { response } => {
                debug!(response_id = %response.id, status = %response.status, "Response done");

                for (item_id, transcript) in response.audio_transcripts() {
                    let key = StreamKey::new(response.id.as_str(), item_id);
                    self.enqueue(AssemblerCommand::Transcript {
                        key: key.clone(),
                        text: transcript.to_string(),
                    })
                    .await;
                    self.display(DisplayEvent::Transcript {
                        key,
                        text: transcript.to_string(),
                    });
                }

                for text in response.texts() {
                    self.display(DisplayEvent::AssistantText {
                        text: text.to_string(),
                    });
                }
            }

            ServerEvent::SessionCreated { session } => {
                info!(session_id = %session.id, model = %session.model, "Session created");
                self.display(DisplayEvent::SessionStarted {
                    session_id: session.id,
                    model: session.model,
                });
            }

            ServerEvent::SessionUpdated { session } => {
                info!(session_id = %session.id, "Session updated");
            }

            ServerEvent::Error { error } => {
                warn!(
                    error_type = %error.error_type,
                    code = ?error.code,
                    message = %error.message,
                    "Server reported an error"
                );
                self.metrics.record_error();
                self.display(DisplayEvent::ServerError {
                    message: error.message,
                });
            }

            ServerEvent::RateLimitsUpdated { rate_limits } => {
                for limit in &rate_limits {
                    debug!(
                        name = %limit.name,
                        remaining = limit.remaining,
                        limit = limit.limit,
                        "Rate limit"
                    );
                }
            }

            ServerEvent::Other => {
                debug!(event = %event_type, "Ignoring event");
            }
        }
    }

    /// Hand a command to the assembler, giving up if shutdown starts first
    async fn enqueue(&self, command: AssemblerCommand) {
        tokio::select! {
            result = self.audio_tx.send(command) => {
                if result.is_err() {
                    warn!("Assembler queue closed, audio dropped");
                }
            }
            _ = self.cancel.cancelled() => {
                debug!("Shutdown during audio handoff");
            }
        }
    }

    fn display(&self, event: DisplayEvent) {
        match self.display_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(?event, "Display channel full, event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Display channel closed");
            }
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Receive loop: one read at a time, raced against cancellation
///
/// Read-timeout expiry just re-issues the read.
///
/// # Returns
/// - `Ok(DispatchEnd::Cancelled)` when the session is cancelled
/// - `Ok(DispatchEnd::PeerClosed)` when the server closes cleanly
/// - `Err` for any other transport failure
pub async fn dispatcher_task(
    transport: Arc<Transport>,
    router: FrameRouter,
    cancel: CancellationToken,
) -> NetworkResult<DispatchEnd> {
    info!("Dispatcher task started");

    loop {
        let inbound = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Dispatcher task cancelled");
                return Ok(DispatchEnd::Cancelled);
            }
            inbound = transport.receive() => inbound,
        };

        match inbound {
            Ok(Inbound::Text(frame)) => router.route(&frame).await,
            Ok(Inbound::Idle) => debug!("No traffic within read timeout"),
            Ok(Inbound::Closed) => {
                info!("Server closed the connection");
                return Ok(DispatchEnd::PeerClosed);
            }
            Err(e) => {
                router.metrics().record_error();
                error!(error = %e, "Receive failed");
                return Err(e);
            }
        }
    }
}
