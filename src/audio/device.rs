//! Audio device data models.
//!
//! Defines the mute state, the backend capability the controller talks to,
//! and the handle wrapper that owns the volatile endpoint connection.

use thiserror::Error;

/// Mute state of the microphone endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MuteState {
    Muted,
    Unmuted,
    /// Before the first successful query, or after the device was lost.
    Unknown,
}

impl MuteState {
    pub fn from_muted(muted: bool) -> Self {
        if muted {
            MuteState::Muted
        } else {
            MuteState::Unmuted
        }
    }
}

impl std::fmt::Display for MuteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MuteState::Muted => write!(f, "Muted"),
            MuteState::Unmuted => write!(f, "Unmuted"),
            MuteState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Audio device error types.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No capture endpoint could be acquired.
    #[error("No microphone device available: {0}")]
    Unavailable(String),

    /// A get/set call on an acquired endpoint failed.
    #[error("Device call failed: {0}")]
    CallFailed(String),

    #[cfg(windows)]
    #[error("COM initialization failed: {0}")]
    ComInitFailed(#[source] windows::core::Error),
}

impl DeviceError {
    /// True if the error means no endpoint exists, as opposed to a failed call.
    pub fn is_unavailable(&self) -> bool {
        match self {
            DeviceError::Unavailable(_) => true,
            #[cfg(windows)]
            DeviceError::ComInitFailed(_) => true,
            DeviceError::CallFailed(_) => false,
        }
    }
}

/// Capability exposed by an audio driver interface.
///
/// Implementations must tolerate `connect` being called repeatedly; each call
/// acquires a fresh handle to the current default capture endpoint. Any call
/// may fail at any time.
pub trait AudioBackend {
    type Handle;

    fn connect(&self) -> Result<Self::Handle, DeviceError>;

    fn get_mute(&self, handle: &Self::Handle) -> Result<bool, DeviceError>;

    fn set_mute(&self, handle: &Self::Handle, muted: bool) -> Result<(), DeviceError>;
}

/// Owns the connection to the active microphone endpoint.
///
/// The handle is dropped after every failed call, so the next call
/// reconnects instead of reusing an endpoint that may have been invalidated.
pub struct AudioDeviceHandle<B: AudioBackend> {
    backend: B,
    handle: Option<B::Handle>,
}

impl<B: AudioBackend> AudioDeviceHandle<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            handle: None,
        }
    }

    /// Acquire (or re-acquire) the default endpoint.
    pub fn connect(&mut self) -> Result<(), DeviceError> {
        self.handle = None;
        let handle = self.backend.connect()?;
        self.handle = Some(handle);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Drop the current handle.
    pub fn invalidate(&mut self) {
        self.handle = None;
    }

    pub fn get_mute(&mut self) -> Result<bool, DeviceError> {
        self.ensure_connected()?;
        let result = match self.handle.as_ref() {
            Some(handle) => self.backend.get_mute(handle),
            None => Err(Self::missing_handle()),
        };
        self.invalidate_on_error(result)
    }

    pub fn set_mute(&mut self, muted: bool) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        let result = match self.handle.as_ref() {
            Some(handle) => self.backend.set_mute(handle, muted),
            None => Err(Self::missing_handle()),
        };
        self.invalidate_on_error(result)
    }

    /// Query then set the inverse. Returns the new mute value.
    pub fn toggle(&mut self) -> Result<bool, DeviceError> {
        let current = self.get_mute()?;
        let new_state = !current;
        self.set_mute(new_state)?;
        Ok(new_state)
    }

    fn ensure_connected(&mut self) -> Result<(), DeviceError> {
        if self.handle.is_none() {
            self.connect()?;
        }
        Ok(())
    }

    fn missing_handle() -> DeviceError {
        DeviceError::Unavailable("endpoint handle missing".to_string())
    }

    fn invalidate_on_error<T>(&mut self, result: Result<T, DeviceError>) -> Result<T, DeviceError> {
        if result.is_err() {
            self.handle = None;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeBackend};

    #[test]
    fn mute_state_display() {
        assert_eq!(MuteState::Muted.to_string(), "Muted");
        assert_eq!(MuteState::from_muted(false), MuteState::Unmuted);
        assert_eq!(MuteState::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn get_mute_connects_lazily() {
        let fake = FakeBackend::new(true);
        let mut device = AudioDeviceHandle::new(fake.clone());
        assert!(!device.is_connected());

        assert!(device.get_mute().unwrap());
        assert!(device.is_connected());
        assert_eq!(fake.calls(), vec![Call::Connect, Call::GetMute]);
    }

    #[test]
    fn failed_call_drops_handle_and_next_call_reconnects() {
        let fake = FakeBackend::new(false);
        let mut device = AudioDeviceHandle::new(fake.clone());
        device.connect().unwrap();

        fake.fail_next_get(1);
        assert!(device.get_mute().is_err());
        assert!(!device.is_connected());

        assert!(!device.get_mute().unwrap());
        assert_eq!(
            fake.calls(),
            vec![Call::Connect, Call::GetMute, Call::Connect, Call::GetMute]
        );
    }

    #[test]
    fn toggle_sets_inverse() {
        let fake = FakeBackend::new(false);
        let mut device = AudioDeviceHandle::new(fake.clone());

        assert!(device.toggle().unwrap());
        assert!(fake.is_muted());
        assert_eq!(
            fake.calls(),
            vec![Call::Connect, Call::GetMute, Call::SetMute(true)]
        );
    }

    #[test]
    fn unavailable_device_reports_unavailable() {
        let fake = FakeBackend::new(false);
        fake.set_present(false);
        let mut device = AudioDeviceHandle::new(fake);

        let err = device.get_mute().unwrap_err();
        assert!(err.is_unavailable());
    }
}
