//! User settings persisted as JSON.
//!
//! Layout:
//!
//!   Windows: %APPDATA%\mic-mute\config.json
//!   Linux:   ~/.config/mic-mute/config.json
//!
//! Every key is optional in the file. Missing keys take their defaults and
//! out-of-range values are clamped when the file is loaded.

use crate::controller::ControllerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const APP_DIR: &str = "mic-mute";
const FILE_NAME: &str = "config.json";

pub const DEFAULT_HOTKEY: &str = "ctrl+alt+m";
pub const MAX_OVERLAY_MARGIN: u32 = 50;

const MIN_INTERVAL_MS: u64 = 10;
const MAX_INTERVAL_MS: u64 = 5_000;

/// Settings error types.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("No configuration directory available on this platform")]
    NoConfigDir,

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where the overlay sits on the primary screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayPosition {
    TopLeft,
    #[default]
    TopMid,
    TopRight,
    MiddleLeft,
    MiddleRight,
    BottomLeft,
    BottomMid,
    BottomRight,
}

impl OverlayPosition {
    pub const ALL: [OverlayPosition; 8] = [
        OverlayPosition::TopLeft,
        OverlayPosition::TopMid,
        OverlayPosition::TopRight,
        OverlayPosition::MiddleLeft,
        OverlayPosition::MiddleRight,
        OverlayPosition::BottomLeft,
        OverlayPosition::BottomMid,
        OverlayPosition::BottomRight,
    ];

    /// Parse a label such as "Top Mid". Unknown labels fall back to Top Mid.
    pub fn from_label(label: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(label.trim()))
            .unwrap_or_default()
    }

    pub fn label(&self) -> &'static str {
        match self {
            OverlayPosition::TopLeft => "Top Left",
            OverlayPosition::TopMid => "Top Mid",
            OverlayPosition::TopRight => "Top Right",
            OverlayPosition::MiddleLeft => "Middle Left",
            OverlayPosition::MiddleRight => "Middle Right",
            OverlayPosition::BottomLeft => "Bottom Left",
            OverlayPosition::BottomMid => "Bottom Mid",
            OverlayPosition::BottomRight => "Bottom Right",
        }
    }
}

/// Supported overlay icon sizes.
pub const OVERLAY_SIZES: [&str; 3] = ["32x32", "48x48", "64x64"];

/// Persisted application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub overlay_position: String,
    pub overlay_size: String,
    pub overlay_margin: u32,
    pub overlay_opacity: f32,
    pub mute_sound_file: Option<PathBuf>,
    pub unmute_sound_file: Option<PathBuf>,
    pub start_with_windows: bool,
    pub hotkey: String,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overlay_position: OverlayPosition::default().label().to_string(),
            overlay_size: "48x48".to_string(),
            overlay_margin: 10,
            overlay_opacity: 0.7,
            mute_sound_file: None,
            unmute_sound_file: None,
            start_with_windows: false,
            hotkey: DEFAULT_HOTKEY.to_string(),
            poll_interval_ms: ControllerConfig::DEFAULT_POLL_INTERVAL.as_millis() as u64,
            debounce_ms: ControllerConfig::DEFAULT_DEBOUNCE.as_millis() as u64,
        }
    }
}

impl Settings {
    /// Default settings file location.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(FILE_NAME))
            .ok_or(SettingsError::NoConfigDir)
    }

    /// Load settings from `path`.
    ///
    /// A missing file is created with defaults. A file that cannot be read
    /// or parsed is left alone and defaults are used for this session.
    pub fn load_or_create(path: &Path) -> Self {
        if !path.exists() {
            let settings = Self::default();
            match settings.save_to(path) {
                Ok(()) => tracing::info!(path = %path.display(), "Created default settings"),
                Err(e) => tracing::warn!(error = %e, "Failed to write default settings"),
            }
            return settings;
        }

        match Self::load_from(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "Using default settings");
                Self::default()
            }
        }
    }

    /// Load and clamp settings from an existing file.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Self =
            serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.clamp();
        tracing::debug!(?settings, "Loaded settings");
        Ok(settings)
    }

    /// Write settings as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, content).map_err(io_err)
    }

    /// Bring every value into its accepted range.
    pub fn clamp(&mut self) {
        self.overlay_position = self.position().label().to_string();
        if !OVERLAY_SIZES.contains(&self.overlay_size.as_str()) {
            tracing::warn!(size = %self.overlay_size, "Unsupported overlay size, using 48x48");
            self.overlay_size = "48x48".to_string();
        }
        self.overlay_margin = self.overlay_margin.min(MAX_OVERLAY_MARGIN);
        self.overlay_opacity = if self.overlay_opacity.is_finite() {
            self.overlay_opacity.clamp(0.0, 1.0)
        } else {
            0.7
        };
        self.poll_interval_ms = self.poll_interval_ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS);
        self.debounce_ms = self.debounce_ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS);
        if self.hotkey.trim().is_empty() {
            self.hotkey = DEFAULT_HOTKEY.to_string();
        }
    }

    pub fn position(&self) -> OverlayPosition {
        OverlayPosition::from_label(&self.overlay_position)
    }

    /// Overlay edge length in pixels, taken from the "NxN" size string.
    pub fn overlay_size_px(&self) -> u32 {
        self.overlay_size
            .split('x')
            .next()
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(48)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            debounce: Duration::from_millis(self.debounce_ms),
            ..ControllerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.json");

        let settings = Settings::load_or_create(&path);

        assert_eq!(settings, Settings::default());
        assert!(path.exists());
        assert_eq!(Settings::load_from(&path).expect("load"), Settings::default());
    }

    #[test]
    fn partial_file_takes_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"overlay_position": "Bottom Right", "overlay_margin": 25}"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).expect("load");
        assert_eq!(settings.position(), OverlayPosition::BottomRight);
        assert_eq!(settings.overlay_margin, 25);
        assert_eq!(settings.overlay_size, "48x48");
        assert_eq!(settings.hotkey, DEFAULT_HOTKEY);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "overlay_position": "Somewhere",
                "overlay_size": "100x100",
                "overlay_margin": 400,
                "overlay_opacity": 3.5,
                "poll_interval_ms": 0,
                "hotkey": "  "
            }"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).expect("load");
        assert_eq!(settings.overlay_position, "Top Mid");
        assert_eq!(settings.overlay_size, "48x48");
        assert_eq!(settings.overlay_margin, MAX_OVERLAY_MARGIN);
        assert_eq!(settings.overlay_opacity, 1.0);
        assert_eq!(settings.poll_interval_ms, MIN_INTERVAL_MS);
        assert_eq!(settings.hotkey, DEFAULT_HOTKEY);
    }

    #[test]
    fn corrupt_file_falls_back_without_overwriting() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::Parse { .. })
        ));
        assert_eq!(Settings::load_or_create(&path), Settings::default());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn save_round_trips_sound_paths() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.json");
        let settings = Settings {
            mute_sound_file: Some(PathBuf::from("C:/sounds/mute.wav")),
            start_with_windows: true,
            ..Settings::default()
        };

        settings.save_to(&path).expect("save");
        assert_eq!(Settings::load_from(&path).expect("load"), settings);
    }

    #[test]
    fn controller_config_uses_intervals() {
        let settings = Settings {
            poll_interval_ms: 250,
            debounce_ms: 50,
            ..Settings::default()
        };
        let config = settings.controller_config();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.max_attempts, ControllerConfig::default().max_attempts);
    }

    #[test]
    fn size_and_position_parsing() {
        let mut settings = Settings::default();
        assert_eq!(settings.overlay_size_px(), 48);
        settings.overlay_size = "64x64".to_string();
        assert_eq!(settings.overlay_size_px(), 64);

        assert_eq!(OverlayPosition::from_label("middle left"), OverlayPosition::MiddleLeft);
        assert_eq!(OverlayPosition::from_label(""), OverlayPosition::TopMid);
    }
}
