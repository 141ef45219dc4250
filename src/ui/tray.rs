//! System tray icon.
//!
//! [`TrayObserver`] turns statuses into icon and tooltip updates. On Windows,
//! [`TrayManager`] owns the icon and its context menu and translates clicks
//! and menu picks into [`TrayEvent`]s.

use super::preferences::PreferenceChange;
use super::UiUpdate;
use crate::controller::ToggleSource;
use crate::observer::{MicStatus, MuteObserver, ObserverError};
use crate::platform::icons::IconKind;
use std::sync::mpsc::Sender;

/// Icon for a status.
pub fn icon_for(status: MicStatus) -> IconKind {
    match status {
        MicStatus::Muted => IconKind::Muted,
        MicStatus::Unmuted => IconKind::Live,
        MicStatus::NoDevice | MicStatus::ToggleFailed => IconKind::Error,
    }
}

pub fn tooltip_for(status: MicStatus) -> String {
    format!("Microphone: {status}")
}

/// Forwards icon and tooltip changes to the UI thread.
pub struct TrayObserver {
    updates: Sender<UiUpdate>,
}

impl TrayObserver {
    pub fn new(updates: Sender<UiUpdate>) -> Self {
        Self { updates }
    }
}

impl MuteObserver for TrayObserver {
    fn name(&self) -> &str {
        "tray"
    }

    fn on_status(&mut self, status: MicStatus) -> Result<(), ObserverError> {
        let update = UiUpdate::Tray {
            icon: icon_for(status),
            tooltip: tooltip_for(status),
        };
        self.updates
            .send(update)
            .map_err(|_| ObserverError::Disconnected {
                observer: self.name().to_string(),
            })
    }
}

/// User actions coming from the tray.
#[derive(Debug, Clone, PartialEq)]
pub enum TrayEvent {
    /// Left click on the icon (`Manual`) or "Toggle Mute" (`Tray`).
    ToggleMute(ToggleSource),
    RefreshDevice,
    /// "Start with Windows" was clicked; carries the new check state.
    StartWithWindows(bool),
    /// An overlay choice was picked.
    Preference(PreferenceChange),
    /// Ask the user for a mute (`true`) or unmute sound file.
    ChooseSound { muted: bool },
    ClearSounds,
    /// Listen for a new hotkey.
    CaptureHotkey,
    Exit,
}

/// Label of the hotkey menu item.
pub fn hotkey_label(hotkey: &str) -> String {
    format!("Set Hotkey ({hotkey})...")
}

#[cfg(windows)]
pub use manager::{TrayError, TrayManager};

#[cfg(windows)]
mod manager {
    use super::{hotkey_label, TrayEvent};
    use crate::controller::ToggleSource;
    use crate::platform::icons::{self, IconKind};
    use crate::platform::settings::{OverlayPosition, Settings, OVERLAY_SIZES};
    use crate::ui::preferences::{
        opacity_label, PreferenceChange, MARGIN_CHOICES, OPACITY_CHOICES,
    };
    use thiserror::Error;
    use tray_icon::{
        menu::{
            CheckMenuItem, IsMenuItem, Menu, MenuEvent, MenuId, MenuItem, PredefinedMenuItem,
            Submenu,
        },
        Icon, MouseButton, MouseButtonState, TrayIcon, TrayIconBuilder, TrayIconEvent,
    };

    /// Tray service error types.
    #[derive(Debug, Error)]
    pub enum TrayError {
        #[error("Failed to create tray icon: {0}")]
        CreateFailed(String),

        #[error("Failed to build icon image: {0}")]
        IconLoadFailed(String),

        #[error("Tray icon not initialized")]
        NotInitialized,

        #[error("Failed to create menu: {0}")]
        MenuFailed(String),
    }

    struct MenuIds {
        toggle: MenuId,
        refresh: MenuId,
        hotkey: MenuId,
        mute_sound: MenuId,
        unmute_sound: MenuId,
        clear_sounds: MenuId,
        startup: MenuId,
        exit: MenuId,
    }

    /// A check item standing for one value of a preference.
    struct Choice {
        item: CheckMenuItem,
        change: PreferenceChange,
    }

    /// One submenu of mutually exclusive choices.
    fn choice_menu(
        title: &str,
        options: Vec<(String, PreferenceChange)>,
        settings: &Settings,
        choices: &mut Vec<Choice>,
    ) -> Result<Submenu, TrayError> {
        let submenu = Submenu::new(title, true);
        for (label, change) in options {
            let item = CheckMenuItem::new(label, true, change.is_current(settings), None);
            submenu
                .append(&item)
                .map_err(|e| TrayError::MenuFailed(e.to_string()))?;
            choices.push(Choice { item, change });
        }
        Ok(submenu)
    }

    /// System tray manager.
    pub struct TrayManager {
        tray_icon: Option<TrayIcon>,
        status_item: MenuItem,
        hotkey_item: MenuItem,
        startup_item: CheckMenuItem,
        choices: Vec<Choice>,
        ids: MenuIds,
        menu: Option<Menu>,
    }

    impl TrayManager {
        pub fn new(settings: &Settings) -> Result<Self, TrayError> {
            let status_item = MenuItem::new("Status: Unknown", false, None);
            let toggle_item = MenuItem::new("Toggle Mute", true, None);
            let refresh_item = MenuItem::new("Refresh Device", true, None);
            let hotkey_item = MenuItem::new(hotkey_label(&settings.hotkey), true, None);
            let startup_item =
                CheckMenuItem::new("Start with Windows", true, settings.start_with_windows, None);
            let exit_item = MenuItem::new("Exit", true, None);

            let mut choices = Vec::new();
            let position_menu = choice_menu(
                "Overlay Position",
                OverlayPosition::ALL
                    .into_iter()
                    .map(|p| (p.label().to_string(), PreferenceChange::OverlayPosition(p)))
                    .collect(),
                settings,
                &mut choices,
            )?;
            let size_menu = choice_menu(
                "Overlay Size",
                OVERLAY_SIZES
                    .into_iter()
                    .map(|s| (s.to_string(), PreferenceChange::OverlaySize(s.to_string())))
                    .collect(),
                settings,
                &mut choices,
            )?;
            let margin_menu = choice_menu(
                "Overlay Margin",
                MARGIN_CHOICES
                    .into_iter()
                    .map(|m| (format!("{m} px"), PreferenceChange::OverlayMargin(m)))
                    .collect(),
                settings,
                &mut choices,
            )?;
            let opacity_menu = choice_menu(
                "Overlay Opacity",
                OPACITY_CHOICES
                    .into_iter()
                    .map(|o| (opacity_label(o), PreferenceChange::OverlayOpacity(o)))
                    .collect(),
                settings,
                &mut choices,
            )?;

            let mute_sound_item = MenuItem::new("Choose Mute Sound...", true, None);
            let unmute_sound_item = MenuItem::new("Choose Unmute Sound...", true, None);
            let clear_sounds_item = MenuItem::new("Clear Sounds", true, None);
            let sounds_menu = Submenu::new("Sounds", true);
            sounds_menu
                .append_items(&[&mute_sound_item, &unmute_sound_item, &clear_sounds_item])
                .map_err(|e| TrayError::MenuFailed(e.to_string()))?;

            let ids = MenuIds {
                toggle: toggle_item.id().clone(),
                refresh: refresh_item.id().clone(),
                hotkey: hotkey_item.id().clone(),
                mute_sound: mute_sound_item.id().clone(),
                unmute_sound: unmute_sound_item.id().clone(),
                clear_sounds: clear_sounds_item.id().clone(),
                startup: startup_item.id().clone(),
                exit: exit_item.id().clone(),
            };

            let items: [&dyn IsMenuItem; 14] = [
                &status_item,
                &PredefinedMenuItem::separator(),
                &toggle_item,
                &refresh_item,
                &PredefinedMenuItem::separator(),
                &position_menu,
                &size_menu,
                &margin_menu,
                &opacity_menu,
                &sounds_menu,
                &hotkey_item,
                &startup_item,
                &PredefinedMenuItem::separator(),
                &exit_item,
            ];
            let menu = Menu::new();
            menu.append_items(&items)
                .map_err(|e| TrayError::MenuFailed(e.to_string()))?;

            Ok(Self {
                tray_icon: None,
                status_item,
                hotkey_item,
                startup_item,
                choices,
                ids,
                menu: Some(menu),
            })
        }

        /// Create and show the tray icon.
        pub fn create(&mut self) -> Result<(), TrayError> {
            let menu = self
                .menu
                .take()
                .ok_or_else(|| TrayError::MenuFailed("menu unavailable".to_string()))?;

            let tray_icon = TrayIconBuilder::new()
                .with_icon(Self::create_icon(IconKind::Error)?)
                .with_tooltip("Microphone: Unknown")
                .with_menu(Box::new(menu))
                .with_menu_on_left_click(false)
                .build()
                .map_err(|e| TrayError::CreateFailed(e.to_string()))?;

            self.tray_icon = Some(tray_icon);
            Ok(())
        }

        /// Drain pending tray and menu events.
        pub fn poll_events(&self) -> Vec<TrayEvent> {
            let mut events = Vec::new();

            while let Ok(event) = TrayIconEvent::receiver().try_recv() {
                if let TrayIconEvent::Click {
                    button: MouseButton::Left,
                    button_state: MouseButtonState::Up,
                    ..
                } = event
                {
                    events.push(TrayEvent::ToggleMute(ToggleSource::Manual));
                }
            }

            while let Ok(event) = MenuEvent::receiver().try_recv() {
                let id = event.id();
                let ids = &self.ids;
                let action = if id == &ids.toggle {
                    TrayEvent::ToggleMute(ToggleSource::Tray)
                } else if id == &ids.refresh {
                    TrayEvent::RefreshDevice
                } else if id == &ids.hotkey {
                    TrayEvent::CaptureHotkey
                } else if id == &ids.mute_sound {
                    TrayEvent::ChooseSound { muted: true }
                } else if id == &ids.unmute_sound {
                    TrayEvent::ChooseSound { muted: false }
                } else if id == &ids.clear_sounds {
                    TrayEvent::ClearSounds
                } else if id == &ids.startup {
                    TrayEvent::StartWithWindows(self.startup_item.is_checked())
                } else if id == &ids.exit {
                    TrayEvent::Exit
                } else if let Some(choice) = self.choices.iter().find(|c| c.item.id() == id) {
                    TrayEvent::Preference(choice.change.clone())
                } else {
                    continue;
                };
                events.push(action);
            }

            events
        }

        /// Re-check the menu against `settings`. Clicking a check item flips
        /// it on its own, so this runs after every choice.
        pub fn sync_choices(&self, settings: &Settings) {
            for choice in &self.choices {
                choice.item.set_checked(choice.change.is_current(settings));
            }
            self.startup_item.set_checked(settings.start_with_windows);
        }

        pub fn set_icon(&mut self, kind: IconKind) -> Result<(), TrayError> {
            let icon = Self::create_icon(kind)?;
            let tray = self.tray_icon.as_mut().ok_or(TrayError::NotInitialized)?;
            tray.set_icon(Some(icon))
                .map_err(|e| TrayError::CreateFailed(e.to_string()))
        }

        pub fn set_tooltip(&mut self, text: &str) -> Result<(), TrayError> {
            let tray = self.tray_icon.as_mut().ok_or(TrayError::NotInitialized)?;
            tray.set_tooltip(Some(text))
                .map_err(|e| TrayError::CreateFailed(e.to_string()))
        }

        pub fn set_status_text(&self, text: &str) {
            self.status_item.set_text(text);
        }

        pub fn set_hotkey_text(&self, text: &str) {
            self.hotkey_item.set_text(text);
        }

        /// Grey out the hotkey item while a capture runs.
        pub fn set_hotkey_enabled(&self, enabled: bool) {
            self.hotkey_item.set_enabled(enabled);
        }

        fn create_icon(kind: IconKind) -> Result<Icon, TrayError> {
            let image = icons::tray_icon(kind);
            Icon::from_rgba(image.pixels, image.size, image.size)
                .map_err(|e| TrayError::IconLoadFailed(e.to_string()))
        }

        /// Remove the tray icon.
        pub fn destroy(&mut self) {
            self.tray_icon = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn tray_update_per_status() {
        let (tx, rx) = channel();
        let mut tray = TrayObserver::new(tx);

        for status in [MicStatus::Unmuted, MicStatus::Muted, MicStatus::ToggleFailed] {
            tray.on_status(status).unwrap();
        }

        let updates: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            updates,
            vec![
                UiUpdate::Tray {
                    icon: IconKind::Live,
                    tooltip: "Microphone: Unmuted".into()
                },
                UiUpdate::Tray {
                    icon: IconKind::Muted,
                    tooltip: "Microphone: Muted".into()
                },
                UiUpdate::Tray {
                    icon: IconKind::Error,
                    tooltip: "Microphone: Error (Toggle failed)".into()
                },
            ]
        );
    }

    #[test]
    fn hotkey_label_shows_combo() {
        assert_eq!(hotkey_label("ctrl+alt+m"), "Set Hotkey (ctrl+alt+m)...");
    }
}
