//! Status observers and the Windows surfaces they drive.
//!
//! Observers run on whichever thread committed the status (normally the
//! poll loop). Window and tray handles live on the UI thread, so the
//! label, tray and overlay observers only forward a [`UiUpdate`] over a
//! channel. The UI thread drains it and applies the change.

pub mod hotkey;
pub mod overlay;
pub mod preferences;
pub mod sound;
pub mod status;
pub mod tray;

use crate::platform::icons::IconKind;

pub use hotkey::{CaptureStep, HotkeyCombo, HotkeyError};
pub use overlay::{overlay_origin, OverlayObserver};
pub use preferences::{PreferenceChange, PreferenceStore};
pub use sound::{SoundFiles, SoundObserver, SoundPlayer};
pub use status::StatusLabelObserver;
pub use tray::TrayObserver;

/// Change to apply on the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    /// New status line text.
    Status(String),
    /// New tray icon and tooltip.
    Tray { icon: IconKind, tooltip: String },
    /// Show or hide the muted overlay.
    Overlay { visible: bool },
}
