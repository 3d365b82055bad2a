/// Logging utilities
pub mod logging;

/// Global error handling
pub mod error;

/// JSON-lines protocol event log
pub mod event_log;

/// Connection counters and latency samples
pub mod metrics;

// Re-export commonly used types
pub use error::{AppError, AppResult, ErrorCode, ErrorContext};
pub use event_log::{Direction, EventLog};
pub use metrics::{Metrics, MetricsSnapshot};
