/// Audio framing, reassembly and WAV artifacts
pub mod audio;

/// Client configuration
pub mod config;

/// WebSocket connection, wire types and transport
pub mod network;

/// Session coordination: dispatcher, lifecycle and the client handle
pub mod session;

/// Utility modules
pub mod utils;

pub use config::{ClientConfig, SessionDescriptor};
pub use session::{DisplayEvent, RealtimeClient, ShutdownOutcome, ShutdownReason};
