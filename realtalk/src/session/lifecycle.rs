//! One-shot lifecycle of a client connection
//!
//! ```text
//! Running ──begin_shutdown()──▶ ShuttingDown ──finish()──▶ Closed
//! ```
//!
//! The transition out of `Running` is a single compare-and-swap, so exactly
//! one caller wins the right to run the shutdown sequence no matter how many
//! race for it.

use std::sync::atomic::{AtomicU8, Ordering};

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Running = 0,
    ShuttingDown = 1,
    Closed = 2,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Running,
            1 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Closed,
        }
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Running as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Claim the shutdown; `true` only for the first caller
    pub fn begin_shutdown(&self) -> bool {
        self.state
            .compare_exchange(
                LifecycleState::Running as u8,
                LifecycleState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Mark the shutdown sequence as finished
    pub fn finish(&self) {
        self.state
            .store(LifecycleState::Closed as u8, Ordering::Release);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
