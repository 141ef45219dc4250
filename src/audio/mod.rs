//! Audio module for microphone endpoint access.
//!
//! This module provides the backend capability the mute controller talks to
//! and, on Windows, its Core Audio implementation.

pub mod device;
#[cfg(windows)]
pub mod endpoint;

pub use device::{AudioBackend, AudioDeviceHandle, DeviceError, MuteState};
#[cfg(windows)]
pub use endpoint::WasapiBackend;
