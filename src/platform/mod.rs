//! Settings persistence, generated artwork and Windows autostart.

pub mod icons;
#[cfg(windows)]
pub mod registry;
pub mod settings;

#[cfg(windows)]
pub use registry::{Autostart, PreferencesError};
pub use settings::{OverlayPosition, Settings, SettingsError};
