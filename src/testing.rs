//! Scripted in-memory audio backend for tests.

use crate::audio::{AudioBackend, DeviceError};
use crate::observer::{MicStatus, MuteObserver, ObserverError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Connect,
    GetMute,
    SetMute(bool),
}

#[derive(Default)]
struct FakeState {
    muted: bool,
    present: bool,
    fail_get: u32,
    fail_set: u32,
    always_fail_set: bool,
    delay: Duration,
    calls: Vec<Call>,
}

/// Fake endpoint with a call log, failure injection and an optional delay
/// on every call. Clones share state.
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
    in_flight: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new(muted: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                muted,
                present: true,
                ..Default::default()
            })),
            in_flight: Arc::new(AtomicUsize::new(0)),
            overlaps: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn count(&self, call: Call) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }

    pub fn set_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::SetMute(_)))
            .count()
    }

    pub fn is_muted(&self) -> bool {
        self.lock().muted
    }

    /// Change the endpoint state behind the controller's back.
    pub fn set_external_mute(&self, muted: bool) {
        self.lock().muted = muted;
    }

    pub fn set_present(&self, present: bool) {
        self.lock().present = present;
    }

    pub fn fail_next_get(&self, times: u32) {
        self.lock().fail_get = times;
    }

    pub fn fail_next_set(&self, times: u32) {
        self.lock().fail_set = times;
    }

    pub fn always_fail_set(&self, fail: bool) {
        self.lock().always_fail_set = fail;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// Number of times two device calls were observed running at once.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn enter(&self, call: Call) -> Duration {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let mut state = self.lock();
        state.calls.push(call);
        state.delay
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AudioBackend for FakeBackend {
    type Handle = ();

    fn connect(&self) -> Result<(), DeviceError> {
        let delay = self.enter(Call::Connect);
        std::thread::sleep(delay);
        let present = self.lock().present;
        self.leave();
        if present {
            Ok(())
        } else {
            Err(DeviceError::Unavailable("fake device unplugged".to_string()))
        }
    }

    fn get_mute(&self, _handle: &()) -> Result<bool, DeviceError> {
        let delay = self.enter(Call::GetMute);
        std::thread::sleep(delay);
        let result = {
            let mut state = self.lock();
            if !state.present {
                Err(DeviceError::CallFailed("endpoint invalidated".to_string()))
            } else if state.fail_get > 0 {
                state.fail_get -= 1;
                Err(DeviceError::CallFailed("GetMute failed".to_string()))
            } else {
                Ok(state.muted)
            }
        };
        self.leave();
        result
    }

    fn set_mute(&self, _handle: &(), muted: bool) -> Result<(), DeviceError> {
        let delay = self.enter(Call::SetMute(muted));
        std::thread::sleep(delay);
        let result = {
            let mut state = self.lock();
            if !state.present || state.always_fail_set {
                Err(DeviceError::CallFailed("SetMute failed".to_string()))
            } else if state.fail_set > 0 {
                state.fail_set -= 1;
                Err(DeviceError::CallFailed("SetMute failed".to_string()))
            } else {
                state.muted = muted;
                Ok(())
            }
        };
        self.leave();
        result
    }
}

/// Observer that records every status it receives.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    received: Arc<Mutex<Vec<MicStatus>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<MicStatus> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl MuteObserver for RecordingObserver {
    fn name(&self) -> &str {
        "recorder"
    }

    fn on_status(&mut self, status: MicStatus) -> Result<(), ObserverError> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(status);
        Ok(())
    }
}
