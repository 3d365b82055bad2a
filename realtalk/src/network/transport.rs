//! Transport session over one WebSocket
//!
//! Owns both halves of the socket after the handshake. The write half sits
//! behind an async mutex so the sender path and the keep-alive task never
//! interleave inside one write; the read half is used by the dispatcher only.
//!
//! Every wait here is raced against the shared cancellation token, so
//! shutdown never depends on the peer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message, protocol::frame::coding::CloseCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::network::connection::{RealtimeConnection, WsReader, WsWriter};
use crate::network::error::{NetworkError, NetworkResult};
use crate::network::messages::ClientEvent;
use crate::utils::event_log::{Direction, EventLog};
use crate::utils::metrics::Metrics;

/// Bound on the best-effort close handshake
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of one [`Transport::receive`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame
    Text(String),
    /// The read deadline expired with nothing to read; read again
    Idle,
    /// The peer closed normally or the stream ended
    Closed,
}

/// Anything that can deliver a client event to the server
///
/// Implemented by [`Transport`]; test doubles implement it to capture the
/// outbound event sequence.
pub trait EventSender: Send + Sync {
    /// Deliver one event
    fn send_event(&self, event: &ClientEvent) -> impl Future<Output = NetworkResult<()>> + Send;
}

/// One bidirectional connection with deadlines and retry policy
#[derive(Debug)]
pub struct Transport {
    writer: Mutex<Option<WsWriter>>,
    reader: Mutex<Option<WsReader>>,
    read_timeout: Duration,
    write_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    metrics: Arc<Metrics>,
    event_log: Arc<EventLog>,
    cancel: CancellationToken,
}

impl Transport {
    /// Take ownership of an established connection
    pub fn new(
        connection: RealtimeConnection,
        config: &ClientConfig,
        metrics: Arc<Metrics>,
        event_log: Arc<EventLog>,
        cancel: CancellationToken,
    ) -> Self {
        let (writer, reader) = connection.split();

        Self {
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            max_retries: config.max_retries.max(1),
            retry_backoff: config.retry_backoff(),
            metrics,
            event_log,
            cancel,
        }
    }

    /// Send an event, retrying failed writes with linear backoff
    ///
    /// The event is serialized once and recorded in the event log. Attempt
    /// `n` that fails is followed by a pause of `n * retry_backoff` before
    /// attempt `n + 1`. Once the frame has been queued on the socket a retry
    /// only flushes it again, so the peer never sees it twice.
    ///
    /// # Errors
    /// - `NetworkError::SerializationError` if the event cannot be encoded
    /// - `NetworkError::ConnectionClosed` after [`Transport::close`]
    /// - `NetworkError::Cancelled` if shutdown starts while waiting
    /// - `NetworkError::RetriesExhausted` carrying the last write error
    pub async fn send_with_retry(&self, event: &ClientEvent) -> NetworkResult<()> {
        let payload = serde_json::to_value(event)?;
        let json = payload.to_string();
        self.event_log
            .log(Direction::Sent, event.event_type(), payload);

        let message = Message::text(json);
        let mut queued = false;
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.write(&message, &mut queued).await {
                Ok(()) => {
                    self.metrics.record_sent();
                    debug!(event = event.event_type(), attempt, "Event sent");
                    return Ok(());
                }
                Err(e @ (NetworkError::ConnectionClosed | NetworkError::Cancelled)) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        event = event.event_type(),
                        attempt,
                        max = self.max_retries,
                        error = %e,
                        "Send attempt failed"
                    );
                    self.metrics.record_error();
                    last_error = Some(e);
                }
            }

            if attempt < self.max_retries {
                let backoff = self.retry_backoff * attempt;
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = self.cancel.cancelled() => return Err(NetworkError::Cancelled),
                }
            }
        }

        Err(NetworkError::RetriesExhausted {
            attempts: self.max_retries,
            last: Box::new(last_error.unwrap_or(NetworkError::ConnectionClosed)),
        })
    }

    /// Send a keep-alive ping control frame
    ///
    /// Failures are returned to the caller and do not affect the session.
    pub async fn send_ping(&self) -> NetworkResult<()> {
        let mut queued = false;
        self.write(&Message::Ping(Vec::new().into()), &mut queued).await
    }

    /// Read the next text frame
    ///
    /// Control and binary frames are skipped. The whole call is bounded by
    /// the read timeout; expiry yields [`Inbound::Idle`] rather than an
    /// error.
    ///
    /// # Errors
    /// - `NetworkError::UnexpectedClose` for close codes other than
    ///   normal/going-away
    /// - `NetworkError::WebSocketError` for any other read failure
    pub async fn receive(&self) -> NetworkResult<Inbound> {
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return Ok(Inbound::Closed);
        };

        let deadline = Instant::now() + self.read_timeout;

        loop {
            let next = match tokio::time::timeout_at(deadline, reader.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(Inbound::Idle),
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Inbound::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(frame)
                            if frame.code != CloseCode::Normal
                                && frame.code != CloseCode::Away =>
                        {
                            Err(NetworkError::UnexpectedClose {
                                code: frame.code.into(),
                                reason: frame.reason.as_str().to_owned(),
                            })
                        }
                        frame => {
                            info!("Received close frame: {:?}", frame);
                            Ok(Inbound::Closed)
                        }
                    };
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pongs to server pings are queued by tungstenite itself.
                    debug!("Received control frame");
                }
                Some(Ok(other)) => {
                    warn!(len = other.len(), "Ignoring non-text frame");
                }
                Some(Err(tungstenite::Error::ConnectionClosed))
                | Some(Err(tungstenite::Error::AlreadyClosed))
                | None => {
                    info!("WebSocket stream ended");
                    return Ok(Inbound::Closed);
                }
                Some(Err(e)) => return Err(NetworkError::WebSocketError(e)),
            }
        }
    }

    /// Best-effort close handshake, then release the socket
    ///
    /// Bounded by one second and safe to call more than once. The read half
    /// is only dropped here if no receive is in flight; [`Transport::release`]
    /// drops it for certain once the reading task has stopped.
    pub async fn close(&self) {
        let handshake = async {
            let mut guard = self.writer.lock().await;
            if let Some(mut writer) = guard.take() {
                if let Err(e) = writer.close().await {
                    debug!(error = %e, "Close handshake failed");
                }
                info!("WebSocket connection closed");
            }
        };

        if tokio::time::timeout(CLOSE_TIMEOUT, handshake).await.is_err() {
            warn!("Close handshake timed out");
        }

        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
    }

    /// Drop both socket halves
    ///
    /// Meant to run after the tasks using this transport have been joined, so
    /// the locks are free. Bounded by one second. Returns whether a read half
    /// was still held.
    pub async fn release(&self) -> bool {
        let release = async {
            self.writer.lock().await.take();
            self.reader.lock().await.take().is_some()
        };

        match tokio::time::timeout(CLOSE_TIMEOUT, release).await {
            Ok(released) => {
                if released {
                    debug!("Read half released");
                }
                released
            }
            Err(_) => {
                warn!("Socket still in use, not released");
                false
            }
        }
    }

    /// Whether the write half is still open
    pub async fn is_open(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Queue `message` unless `queued` says it already is, then flush
    ///
    /// Feed and flush share one write deadline. A feed that times out drops
    /// the frame unsent; a flush that times out leaves it buffered in the
    /// sink, which is why the caller keeps `queued` across attempts.
    async fn write(&self, message: &Message, queued: &mut bool) -> NetworkResult<()> {
        let write_timeout_ms = self.write_timeout.as_millis() as u64;

        let attempt = async {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or(NetworkError::ConnectionClosed)?;
            let deadline = Instant::now() + self.write_timeout;

            if !*queued {
                tokio::time::timeout_at(deadline, writer.feed(message.clone()))
                    .await
                    .map_err(|_| NetworkError::Timeout(write_timeout_ms))?
                    .map_err(NetworkError::WebSocketError)?;
                *queued = true;
            }

            tokio::time::timeout_at(deadline, writer.flush())
                .await
                .map_err(|_| NetworkError::Timeout(write_timeout_ms))?
                .map_err(NetworkError::WebSocketError)
        };

        tokio::select! {
            result = attempt => result,
            _ = self.cancel.cancelled() => Err(NetworkError::Cancelled),
        }
    }
}

impl EventSender for Transport {
    async fn send_event(&self, event: &ClientEvent) -> NetworkResult<()> {
        self.send_with_retry(event).await
    }
}
