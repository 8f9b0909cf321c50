//! Process-wide readiness gate for the render backend.
//!
//! The bootstrap sequence is the single writer; every job is a reader. The
//! gate is polled rather than awaited through a notification primitive: the
//! browser side of the boundary cannot push readiness into the host process,
//! so a bounded poll keeps the two sides uniform.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl ReadinessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug)]
pub struct ReadinessGate {
    state: Mutex<ReadinessState>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ReadinessState::Uninitialized),
        }
    }

    /// Transitions move only forward, except `Failed -> Initializing` on an
    /// explicit re-attempt. Anything else is ignored and logged.
    pub fn mark_initializing(&self) {
        self.transition(ReadinessState::Initializing, |state| {
            matches!(
                state,
                ReadinessState::Uninitialized | ReadinessState::Failed
            )
        });
    }

    pub fn mark_ready(&self) {
        self.transition(ReadinessState::Ready, |state| {
            matches!(state, ReadinessState::Initializing)
        });
    }

    pub fn mark_failed(&self) {
        self.transition(ReadinessState::Failed, |state| {
            matches!(state, ReadinessState::Initializing)
        });
    }

    fn transition(&self, next: ReadinessState, allowed: impl Fn(ReadinessState) -> bool) {
        let mut state = self.state.lock().expect("readiness state poisoned");
        if allowed(*state) {
            *state = next;
        } else {
            warn!(
                target = "schemat::render::readiness",
                from = state.as_str(),
                to = next.as_str(),
                "ignoring readiness transition"
            );
        }
    }

    pub fn state(&self) -> ReadinessState {
        *self.state.lock().expect("readiness state poisoned")
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ReadinessState::Ready
    }

    /// Poll until the gate opens or the timeout elapses. Returns `false` on
    /// timeout; the caller decides what error that becomes.
    pub async fn await_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_ready() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(POLL_INTERVAL.min(timeout)).await;
        }
    }
}
