//! Connection counters
//!
//! Any task may bump these; nothing inside the client reads them back except
//! the final summary logged at shutdown.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Monotonic counters plus round-trip latency samples
#[derive(Debug, Default)]
pub struct Metrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    errors: AtomicU64,
    audio_fragments: AtomicU64,
    latencies: Mutex<Vec<Duration>>,
}

/// Point-in-time copy of [`Metrics`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub errors: u64,
    pub audio_fragments: u64,
    pub latency_samples: usize,
    /// Mean latency in milliseconds, if any samples were recorded
    pub mean_latency_ms: Option<u64>,
}

impl Metrics {
    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_fragment(&self) {
        self.audio_fragments.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the time elapsed since `start`
    pub fn record_latency(&self, start: Instant) {
        let elapsed = start.elapsed();
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.push(elapsed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (latency_samples, mean_latency_ms) = match self.latencies.lock() {
            Ok(latencies) if !latencies.is_empty() => {
                let total: Duration = latencies.iter().sum();
                let mean = total / latencies.len() as u32;
                (latencies.len(), Some(mean.as_millis() as u64))
            }
            _ => (0, None),
        };

        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            audio_fragments: self.audio_fragments.load(Ordering::Relaxed),
            latency_samples,
            mean_latency_ms,
        }
    }
}
