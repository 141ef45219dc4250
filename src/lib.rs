//! Mic Mute - Library
//!
//! A system tray utility that keeps the default microphone's mute state in
//! sync across a tray icon, a global hotkey and an on-screen overlay.
//!
//! ## Features
//!
//! - Toggle mute from the tray or a global hotkey, with debounce
//! - Pick up mute changes made by other applications
//! - Muted overlay, tray icon and status line kept consistent
//! - Optional mute/unmute sounds
//! - Start with Windows option

pub mod app;
pub mod audio;
pub mod controller;
pub mod observer;
pub mod platform;
pub mod scheduler;
pub mod ui;

#[cfg(test)]
mod testing;

pub use app::App;
pub use audio::{AudioBackend, AudioDeviceHandle, DeviceError, MuteState};
pub use controller::{ControllerConfig, MuteStateController, ToggleSource};
pub use observer::{MicStatus, MuteObserver, ObserverRegistry};
pub use platform::Settings;
pub use scheduler::PollLoop;
