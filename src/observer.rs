//! Status observers and their registry.
//!
//! Observers receive every confirmed status change in the order the
//! controller commits them. They run inside the controller's apply guard,
//! so they must not call operations that touch the device. An observer may
//! call `request_toggle`: it only records the request, which runs after the
//! current commit on a later scheduler tick.

use crate::audio::MuteState;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use thiserror::Error;

/// What subscribers are told about the microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MicStatus {
    Muted,
    Unmuted,
    /// No endpoint could be reached.
    NoDevice,
    /// A toggle exhausted its retries.
    ToggleFailed,
}

impl MicStatus {
    pub fn from_state(state: MuteState) -> Self {
        match state {
            MuteState::Muted => MicStatus::Muted,
            MuteState::Unmuted => MicStatus::Unmuted,
            MuteState::Unknown => MicStatus::NoDevice,
        }
    }

    /// Mute value if the status carries one.
    pub fn muted(&self) -> Option<bool> {
        match self {
            MicStatus::Muted => Some(true),
            MicStatus::Unmuted => Some(false),
            _ => None,
        }
    }
}

impl std::fmt::Display for MicStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MicStatus::Muted => write!(f, "Muted"),
            MicStatus::Unmuted => write!(f, "Unmuted"),
            MicStatus::NoDevice => write!(f, "Error (No audio device)"),
            MicStatus::ToggleFailed => write!(f, "Error (Toggle failed)"),
        }
    }
}

/// Observer failure.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("{observer}: delivery channel closed")]
    Disconnected { observer: String },

    #[error("{observer}: {message}")]
    Failed { observer: String, message: String },
}

/// A receiver of status changes.
pub trait MuteObserver: Send {
    /// Name used in log lines.
    fn name(&self) -> &str;

    fn on_status(&mut self, status: MicStatus) -> Result<(), ObserverError>;
}

/// Ordered set of observers.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<Vec<Box<dyn MuteObserver>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Box<dyn MuteObserver>) {
        tracing::debug!(observer = observer.name(), "Observer subscribed");
        self.lock().push(observer);
    }

    /// Deliver `status` to every observer in subscription order.
    ///
    /// Returns the number of observers that failed. A failing or panicking
    /// observer is logged and skipped; the rest still receive the status.
    pub fn notify(&self, status: MicStatus) -> usize {
        let mut observers = self.lock();
        let mut failures = 0;

        for observer in observers.iter_mut() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| observer.on_status(status)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!(observer = observer.name(), error = %e, "Observer failed");
                }
                Err(_) => {
                    failures += 1;
                    tracing::error!(observer = observer.name(), "Observer panicked during notify");
                }
            }
        }

        failures
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Box<dyn MuteObserver>>> {
        // Observer panics are caught in notify; the list survives poisoning.
        self.observers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
