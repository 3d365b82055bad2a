//! Local WebSocket server standing in for the realtime API
#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use realtalk_lib::config::ClientConfig;
use realtalk_lib::network::{ConnectionConfig, RealtimeConnection};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy)]
enum Mode {
    Normal,
    Silent,
    Stalled(Duration),
}

enum Action {
    Text(String),
    Close(CloseCode, String),
}

/// One-connection mock server
pub struct MockServer {
    pub url: String,
    received: mpsc::UnboundedReceiver<String>,
    pings: mpsc::UnboundedReceiver<()>,
    actions: mpsc::UnboundedSender<Action>,
    headers: Option<oneshot::Receiver<Vec<(String, String)>>>,
}

impl MockServer {
    /// Server that records client frames and sends whatever the test asks
    pub async fn start() -> Self {
        Self::spawn(Mode::Normal).await
    }

    /// Server that completes the handshake and then never reads or writes
    pub async fn silent() -> Self {
        Self::spawn(Mode::Silent).await
    }

    /// Server that leaves the socket unread for `stall`, then behaves like
    /// [`MockServer::start`]
    pub async fn stalled(stall: Duration) -> Self {
        Self::spawn(Mode::Stalled(stall)).await
    }

    async fn spawn(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (received_tx, received) = mpsc::unbounded_channel();
        let (pings_tx, pings) = mpsc::unbounded_channel();
        let (actions, mut action_rx) = mpsc::unbounded_channel();
        let (headers_tx, headers) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();

            let callback = |request: &Request, response: Response| {
                let pairs = request
                    .headers()
                    .iter()
                    .map(|(name, value)| {
                        (
                            name.as_str().to_string(),
                            value.to_str().unwrap_or_default().to_string(),
                        )
                    })
                    .collect();
                let _ = headers_tx.send(pairs);
                Ok::<Response, ErrorResponse>(response)
            };
            let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();
            let (mut sink, mut stream) = ws.split();

            match mode {
                Mode::Silent => {
                    // Keep the socket open, unread, until the test drops the server.
                    while action_rx.recv().await.is_some() {}
                    drop((sink, stream));
                    return;
                }
                Mode::Stalled(stall) => tokio::time::sleep(stall).await,
                Mode::Normal => {}
            }

            loop {
                tokio::select! {
                    message = stream.next() => match message {
                        Some(Ok(Message::Text(text))) => {
                            let _ = received_tx.send(text.as_str().to_owned());
                        }
                        Some(Ok(Message::Ping(_))) => {
                            let _ = pings_tx.send(());
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    action = action_rx.recv() => match action {
                        Some(Action::Text(text)) => {
                            if sink.send(Message::text(text)).await.is_err() {
                                break;
                            }
                        }
                        Some(Action::Close(code, reason)) => {
                            let frame = CloseFrame { code, reason: reason.into() };
                            let _ = sink.send(Message::Close(Some(frame))).await;
                        }
                        None => break,
                    },
                }
            }
        });

        Self {
            url: format!("ws://{}/v1/realtime", addr),
            received,
            pings,
            actions,
            headers: Some(headers),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new()
            .with_endpoint(self.url.clone())
            .with_timeout(2000)
    }

    pub async fn connect(&self) -> RealtimeConnection {
        RealtimeConnection::connect("test-key", &self.connection_config())
            .await
            .unwrap()
    }

    pub fn send_json(&self, value: Value) {
        let _ = self.actions.send(Action::Text(value.to_string()));
    }

    pub fn send_text(&self, text: &str) {
        let _ = self.actions.send(Action::Text(text.to_string()));
    }

    pub fn close(&self, code: CloseCode, reason: &str) {
        let _ = self.actions.send(Action::Close(code, reason.to_string()));
    }

    /// Next text frame from the client, parsed as JSON
    pub async fn next_event(&mut self) -> Value {
        let text = tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("server connection ended");
        serde_json::from_str(&text).unwrap()
    }

    /// Next client event of the given type, skipping others
    pub async fn next_event_of_type(&mut self, event_type: &str) -> Value {
        loop {
            let event = self.next_event().await;
            if event["type"] == event_type {
                return event;
            }
        }
    }

    /// Client events already received and not yet taken
    pub fn drain_events(&mut self) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(text) = self.received.try_recv() {
            events.push(serde_json::from_str(&text).unwrap());
        }
        events
    }

    pub async fn next_ping(&mut self) {
        tokio::time::timeout(WAIT, self.pings.recv())
            .await
            .expect("timed out waiting for ping")
            .expect("server connection ended");
    }

    /// Handshake headers, lowercase names
    pub async fn headers(&mut self) -> Vec<(String, String)> {
        let headers = self.headers.take().expect("headers already taken");
        tokio::time::timeout(WAIT, headers)
            .await
            .expect("timed out waiting for handshake")
            .unwrap()
    }
}

/// Client configuration writing into `dir`, with short timeouts
pub fn test_config(dir: &Path) -> ClientConfig {
    ClientConfig {
        read_timeout_ms: 500,
        write_timeout_ms: 1_000,
        ping_interval_ms: 60_000,
        retry_backoff_ms: 10,
        shutdown_timeout_ms: 2_000,
        output_dir: dir.join("audio_output"),
        log_dir: dir.join("logs"),
        ..ClientConfig::default()
    }
}
