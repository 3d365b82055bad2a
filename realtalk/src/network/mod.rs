/// Network communication and WebSocket handling
///
/// This module provides types and utilities for talking to the realtime
/// conversation API over one WebSocket connection.

/// WebSocket connection management
pub mod connection;

/// Network error types
pub mod error;

/// WebSocket message type definitions
pub mod messages;

/// Background tasks (keep-alive)
pub mod tasks;

/// Deadline-bounded send/receive over an established connection
pub mod transport;

// Re-export commonly used types
pub use connection::{ConnectionConfig, RealtimeConnection, WsReader, WsWriter};
pub use error::{NetworkError, NetworkResult};
pub use messages::{
    ClientEvent, ContentPart, ConversationItem, RateLimit, ResponseBody, ServerErrorBody,
    ServerEvent, SessionInfo,
};
pub use transport::{EventSender, Inbound, Transport};
