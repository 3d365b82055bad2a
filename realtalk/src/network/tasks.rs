//! Background tasks that run alongside the dispatcher
//!
//! Tasks return a `NetworkResult` and never trigger shutdown themselves;
//! the session coordinator turns an `Err` into a fatal shutdown request.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::network::error::{NetworkError, NetworkResult};
use crate::network::transport::Transport;

/// Keep-alive task that pings the server on a fixed period
///
/// The first ping goes out one full `period` after start. A failed ping is
/// logged and does not end the session; `max_failures` failures in a row
/// do, by returning the last error.
///
/// # Arguments
/// * `transport` - Shared transport session
/// * `period` - Ping interval
/// * `max_failures` - Consecutive failures tolerated before giving up
/// * `cancel` - Session cancellation token
///
/// # Returns
/// `Ok(())` when cancelled, or the last ping error after too many failures
pub async fn keepalive_task(
    transport: Arc<Transport>,
    period: Duration,
    max_failures: u32,
    cancel: CancellationToken,
) -> NetworkResult<()> {
    info!(period_ms = period.as_millis() as u64, "Keep-alive task started");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately.
    ticker.tick().await;

    let mut failures = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Keep-alive task cancelled");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        match transport.send_ping().await {
            Ok(()) => {
                failures = 0;
                debug!("Ping sent");
            }
            Err(NetworkError::Cancelled) => {
                info!("Keep-alive task cancelled");
                return Ok(());
            }
            Err(e) => {
                failures += 1;
                warn!(failures, error = %e, "Ping failed");

                if failures >= max_failures.max(1) {
                    return Err(e);
                }
            }
        }
    }
}
