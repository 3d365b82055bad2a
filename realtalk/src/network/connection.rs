//! WebSocket connection to the realtime conversation API
//!
//! This module opens the socket: it builds the upgrade request, attaches the
//! bearer credential and the beta feature header, and bounds the handshake
//! with a timeout.

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
        Message,
    },
};
use tracing::{debug, info};

use crate::network::error::{NetworkError, NetworkResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the WebSocket stream
pub type WsWriter = SplitSink<WsStream, Message>;

/// Read half of the WebSocket stream
pub type WsReader = SplitStream<WsStream>;

/// Default API endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://api.openai.com/v1/realtime";

/// Default realtime model
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-10-01";

/// Configuration for the WebSocket connection
///
/// # Example
/// ```no_run
/// use realtalk_lib::network::ConnectionConfig;
///
/// let config = ConnectionConfig::new()
///     .with_model("gpt-4o-realtime-preview")
///     .with_timeout(5000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Base WebSocket URL
    pub endpoint: String,

    /// Model passed as the `model` query parameter
    pub model: String,

    /// Value of the `OpenAI-Beta` feature header, if any
    pub beta_header: Option<String>,

    /// Handshake timeout in milliseconds
    pub timeout_ms: u64,
}

impl ConnectionConfig {
    /// Create a configuration with the default endpoint and model
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            beta_header: Some("realtime=v1".to_string()),
            timeout_ms: 10000, // 10 seconds default
        }
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at a different server (e.g. a local test server)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Drop the beta feature header
    pub fn without_beta_header(mut self) -> Self {
        self.beta_header = None;
        self
    }

    /// Set handshake timeout in milliseconds
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Build the WebSocket URL with query parameters
    pub fn build_url(&self) -> NetworkResult<String> {
        if !self.endpoint.starts_with("ws://") && !self.endpoint.starts_with("wss://") {
            return Err(NetworkError::InvalidConfig(format!(
                "endpoint must be a ws:// or wss:// URL: {}",
                self.endpoint
            )));
        }

        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}model={}", self.endpoint, separator, self.model))
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// An established WebSocket connection
///
/// Consumed by [`RealtimeConnection::split`] once the session starts.
#[derive(Debug)]
pub struct RealtimeConnection {
    ws_stream: WsStream,
}

impl RealtimeConnection {
    /// Connect to the realtime API
    ///
    /// # Arguments
    /// * `api_key` - Bearer credential
    /// * `config` - Connection configuration
    ///
    /// # Errors
    /// - `NetworkError::AuthenticationFailed` on HTTP 401
    /// - `NetworkError::Timeout` if the handshake exceeds `timeout_ms`
    /// - `NetworkError::ConnectionFailed` for any other handshake failure
    pub async fn connect(api_key: &str, config: &ConnectionConfig) -> NetworkResult<Self> {
        let url = config.build_url()?;
        info!(url = %url, "Connecting to realtime API");

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| NetworkError::InvalidConfig(format!("Invalid URL: {}", e)))?;

        let headers = request.headers_mut();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))?,
        );
        if let Some(ref beta) = config.beta_header {
            headers.insert("openai-beta", HeaderValue::from_str(beta)?);
        }

        let timeout = tokio::time::Duration::from_millis(config.timeout_ms);
        let (ws_stream, response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| NetworkError::Timeout(config.timeout_ms))?
            .map_err(|e| {
                if let tokio_tungstenite::tungstenite::Error::Http(resp) = &e {
                    if resp.status() == 401 {
                        return NetworkError::AuthenticationFailed;
                    }
                }
                NetworkError::ConnectionFailed(e.to_string())
            })?;

        info!(status = %response.status(), "Connected to realtime API");
        debug!("Response headers: {:?}", response.headers());

        Ok(Self { ws_stream })
    }

    /// Split into independently usable write and read halves
    pub fn split(self) -> (WsWriter, WsReader) {
        self.ws_stream.split()
    }
}
