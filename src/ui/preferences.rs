//! Preference edits made from the tray while the app is running.
//!
//! Each menu pick becomes a [`PreferenceChange`]. The [`PreferenceStore`]
//! applies it to the in-memory settings and writes the file right away, so
//! the next start sees the same values.

use super::HotkeyCombo;
use crate::platform::settings::{OverlayPosition, Settings, SettingsError};
use std::path::PathBuf;

/// Margins offered in the tray menu, in pixels.
pub const MARGIN_CHOICES: [u32; 6] = [0, 5, 10, 20, 30, 50];

/// Opacities offered in the tray menu.
pub const OPACITY_CHOICES: [f32; 5] = [0.3, 0.5, 0.7, 0.85, 1.0];

/// Menu label for an opacity choice, e.g. "70%".
pub fn opacity_label(opacity: f32) -> String {
    format!("{}%", (opacity * 100.0).round() as u32)
}

/// A single user edit.
#[derive(Debug, Clone, PartialEq)]
pub enum PreferenceChange {
    OverlayPosition(OverlayPosition),
    /// One of the "NxN" sizes.
    OverlaySize(String),
    OverlayMargin(u32),
    OverlayOpacity(f32),
    /// `None` clears the sound.
    MuteSound(Option<PathBuf>),
    UnmuteSound(Option<PathBuf>),
    Hotkey(HotkeyCombo),
    StartWithWindows(bool),
}

impl PreferenceChange {
    /// Whether the overlay window has to be redrawn.
    pub fn affects_overlay(&self) -> bool {
        matches!(
            self,
            PreferenceChange::OverlayPosition(_)
                | PreferenceChange::OverlaySize(_)
                | PreferenceChange::OverlayMargin(_)
                | PreferenceChange::OverlayOpacity(_)
        )
    }

    pub fn affects_sounds(&self) -> bool {
        matches!(
            self,
            PreferenceChange::MuteSound(_) | PreferenceChange::UnmuteSound(_)
        )
    }

    /// Whether `settings` already hold this value. Drives the menu checks.
    pub fn is_current(&self, settings: &Settings) -> bool {
        !self.apply(&mut settings.clone())
    }

    /// Apply to `settings`, clamping out-of-range values. Returns true if
    /// anything changed.
    pub fn apply(&self, settings: &mut Settings) -> bool {
        let before = settings.clone();
        match self {
            PreferenceChange::OverlayPosition(position) => {
                settings.overlay_position = position.label().to_string();
            }
            PreferenceChange::OverlaySize(size) => settings.overlay_size = size.clone(),
            PreferenceChange::OverlayMargin(margin) => settings.overlay_margin = *margin,
            PreferenceChange::OverlayOpacity(opacity) => settings.overlay_opacity = *opacity,
            PreferenceChange::MuteSound(path) => settings.mute_sound_file = path.clone(),
            PreferenceChange::UnmuteSound(path) => settings.unmute_sound_file = path.clone(),
            PreferenceChange::Hotkey(combo) => settings.hotkey = combo.to_string(),
            PreferenceChange::StartWithWindows(enabled) => {
                settings.start_with_windows = *enabled;
            }
        }
        settings.clamp();
        *settings != before
    }
}

/// Settings plus the file they are saved to.
pub struct PreferenceStore {
    settings: Settings,
    path: PathBuf,
}

impl PreferenceStore {
    /// Load from `path`, creating the file with defaults if it is missing.
    pub fn load(path: PathBuf) -> Self {
        let settings = Settings::load_or_create(&path);
        Self { settings, path }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Apply `change` and save. Returns false, without writing, if the
    /// change was a no-op.
    ///
    /// On a failed save the change stays applied for this session.
    pub fn update(&mut self, change: &PreferenceChange) -> Result<bool, SettingsError> {
        if !change.apply(&mut self.settings) {
            return Ok(false);
        }
        tracing::info!(?change, "Preference changed");
        self.settings.save_to(&self.path)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn overlay_changes_are_applied_and_clamped() {
        let mut settings = Settings::default();

        let change = PreferenceChange::OverlayPosition(OverlayPosition::BottomLeft);
        assert!(change.apply(&mut settings));
        assert_eq!(settings.position(), OverlayPosition::BottomLeft);
        assert!(change.affects_overlay());
        assert!(!change.apply(&mut settings));

        assert!(PreferenceChange::OverlayMargin(80).apply(&mut settings));
        assert_eq!(settings.overlay_margin, 50);

        assert!(PreferenceChange::OverlaySize("64x64".into()).apply(&mut settings));
        assert_eq!(settings.overlay_size_px(), 64);
        assert!(PreferenceChange::OverlaySize("7x7".into()).apply(&mut settings));
        assert_eq!(settings.overlay_size, "48x48");

        assert!(PreferenceChange::OverlayOpacity(0.3).apply(&mut settings));
        assert_eq!(settings.overlay_opacity, 0.3);
    }

    #[test]
    fn hotkey_is_stored_in_canonical_form() {
        let mut settings = Settings::default();
        let combo = HotkeyCombo::parse("Shift + Ctrl + F9").unwrap();

        let change = PreferenceChange::Hotkey(combo);
        assert!(!change.affects_overlay() && !change.affects_sounds());
        assert!(change.apply(&mut settings));
        assert_eq!(settings.hotkey, "ctrl+shift+f9");
    }

    #[test]
    fn store_saves_each_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut store = PreferenceStore::load(path.clone());

        let mute = PathBuf::from("C:/sounds/mute.wav");
        let change = PreferenceChange::MuteSound(Some(mute.clone()));
        assert!(change.affects_sounds());
        assert!(store.update(&change).unwrap());
        assert!(store
            .update(&PreferenceChange::OverlayPosition(OverlayPosition::MiddleRight))
            .unwrap());

        let saved = Settings::load_from(&path).unwrap();
        assert_eq!(saved.mute_sound_file, Some(mute));
        assert_eq!(saved.position(), OverlayPosition::MiddleRight);
        assert_eq!(&saved, store.settings());
    }

    #[test]
    fn no_op_change_does_not_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut store = PreferenceStore::load(path.clone());
        std::fs::remove_file(&path).unwrap();

        let unchanged = PreferenceChange::StartWithWindows(false);
        assert!(!store.update(&unchanged).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn current_value_is_detected() {
        let settings = Settings::default();

        assert!(PreferenceChange::OverlayPosition(OverlayPosition::TopMid).is_current(&settings));
        assert!(!PreferenceChange::OverlayPosition(OverlayPosition::TopLeft).is_current(&settings));
        assert!(PreferenceChange::OverlayMargin(10).is_current(&settings));
        assert!(PreferenceChange::OverlayOpacity(0.7).is_current(&settings));
        assert!(!PreferenceChange::OverlaySize("32x32".into()).is_current(&settings));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn opacity_labels() {
        let labels: Vec<_> = OPACITY_CHOICES.iter().map(|o| opacity_label(*o)).collect();
        assert_eq!(labels, vec!["30%", "50%", "70%", "85%", "100%"]);
    }
}
