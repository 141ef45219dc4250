#![cfg_attr(windows, windows_subsystem = "windows")]

use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn main() -> Result<()> {
    init_logging();
    desktop::run()
}

#[cfg(not(windows))]
mod desktop {
    pub fn run() -> anyhow::Result<()> {
        anyhow::bail!("mic-mute only runs on Windows")
    }
}

#[cfg(windows)]
mod desktop {
    use anyhow::{Context, Result};
    use mic_mute_rs::audio::WasapiBackend;
    use mic_mute_rs::platform::{Autostart, Settings};
    use mic_mute_rs::ui::hotkey::{HotkeyBinding, HotkeyCapture};
    use mic_mute_rs::ui::overlay::OverlayWindow;
    use mic_mute_rs::ui::sound::RodioPlayer;
    use mic_mute_rs::ui::tray::{hotkey_label, TrayEvent, TrayManager};
    use mic_mute_rs::ui::{CaptureStep, HotkeyCombo, PreferenceChange, PreferenceStore, UiUpdate};
    use mic_mute_rs::{App, ToggleSource};
    use std::time::Duration;
    use windows::core::PCWSTR;
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, GetMessageW, KillTimer, MessageBoxW, SetTimer, TranslateMessage,
        MB_ICONERROR, MB_OK, MSG,
    };

    /// UI pump interval.
    const PUMP_INTERVAL_MS: u32 = 30;

    /// How long "Set Hotkey" listens before giving up.
    const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

    fn show_error(msg: &str) {
        unsafe {
            let msg_wide: Vec<u16> = msg.encode_utf16().chain(std::iter::once(0)).collect();
            let title_wide: Vec<u16> =
                "Mic Mute Error".encode_utf16().chain(std::iter::once(0)).collect();
            MessageBoxW(
                None,
                PCWSTR(msg_wide.as_ptr()),
                PCWSTR(title_wide.as_ptr()),
                MB_OK | MB_ICONERROR,
            );
        }
    }

    /// Everything that has to live on the UI thread.
    struct Desktop {
        app: App<WasapiBackend>,
        tray: TrayManager,
        overlay: Option<OverlayWindow>,
        hotkey: Option<HotkeyBinding>,
        capture: Option<HotkeyCapture>,
        autostart: Autostart,
        prefs: PreferenceStore,
    }

    impl Desktop {
        fn new() -> Result<Self> {
            let prefs = PreferenceStore::load(Settings::default_path()?);
            let settings = prefs.settings();

            let autostart = Autostart::new();
            if autostart.is_enabled() != settings.start_with_windows {
                if let Err(e) = autostart.set_enabled(settings.start_with_windows) {
                    tracing::warn!(error = %e, "Failed to sync Start with Windows");
                }
            }

            let player = RodioPlayer::spawn()
                .map_err(|e| tracing::warn!(error = %e, "Sound thread unavailable"))
                .ok();

            let mut tray = TrayManager::new(settings).context("building tray menu")?;
            tray.create().context("creating tray icon")?;

            let overlay = OverlayWindow::new(settings)
                .map_err(|e| tracing::warn!(error = %e, "Overlay unavailable"))
                .ok();

            let hotkey = HotkeyBinding::register(HotkeyCombo::from_setting(&settings.hotkey))
                .map_err(|e| tracing::warn!(error = %e, "Hotkey unavailable"))
                .ok();

            let app = App::start(WasapiBackend::new(), settings, player)
                .context("starting poll loop")?;

            Ok(Self {
                app,
                tray,
                overlay,
                hotkey,
                capture: None,
                autostart,
                prefs,
            })
        }

        /// Apply pending updates and route user input. Returns false on exit.
        fn pump(&mut self) -> bool {
            for update in self.app.drain_updates() {
                self.apply(update);
            }

            if let Some(hotkey) = &self.hotkey {
                for _ in 0..hotkey.drain_presses() {
                    self.app.request_toggle(ToggleSource::Hotkey);
                }
            }

            self.poll_capture();

            for event in self.tray.poll_events() {
                match event {
                    TrayEvent::ToggleMute(source) => {
                        self.app.request_toggle(source);
                    }
                    TrayEvent::RefreshDevice => self.app.refresh_device(),
                    TrayEvent::StartWithWindows(enabled) => self.set_autostart(enabled),
                    TrayEvent::Preference(change) => self.change_preference(change),
                    TrayEvent::ChooseSound { muted } => self.choose_sound(muted),
                    TrayEvent::ClearSounds => {
                        self.change_preference(PreferenceChange::MuteSound(None));
                        self.change_preference(PreferenceChange::UnmuteSound(None));
                    }
                    TrayEvent::CaptureHotkey => self.start_capture(),
                    TrayEvent::Exit => return false,
                }
            }

            true
        }

        fn apply(&mut self, update: UiUpdate) {
            match update {
                UiUpdate::Status(text) => self.tray.set_status_text(&text),
                UiUpdate::Tray { icon, tooltip } => {
                    if let Err(e) = self.tray.set_icon(icon) {
                        tracing::warn!(error = %e, "Failed to update tray icon");
                    }
                    if let Err(e) = self.tray.set_tooltip(&tooltip) {
                        tracing::warn!(error = %e, "Failed to update tray tooltip");
                    }
                }
                UiUpdate::Overlay { visible } => {
                    if let Some(overlay) = self.overlay.as_mut() {
                        overlay.set_visible(visible);
                    }
                }
            }
        }

        /// Save a preference and apply it to the running surfaces.
        fn change_preference(&mut self, change: PreferenceChange) {
            let changed = match self.prefs.update(&change) {
                Ok(changed) => changed,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to save settings");
                    true
                }
            };

            let settings = self.prefs.settings();
            if changed && change.affects_overlay() {
                if let Some(overlay) = self.overlay.as_mut() {
                    overlay.reconfigure(settings);
                }
            }
            if changed && change.affects_sounds() {
                self.app.set_sound_files(
                    settings.mute_sound_file.clone(),
                    settings.unmute_sound_file.clone(),
                );
            }
            self.tray.sync_choices(settings);
        }

        fn choose_sound(&mut self, muted: bool) {
            let title = if muted {
                "Select Mute Sound"
            } else {
                "Select Unmute Sound"
            };
            let Some(path) = rfd::FileDialog::new()
                .set_title(title)
                .add_filter("WAV files", &["wav"])
                .pick_file()
            else {
                return;
            };

            let change = if muted {
                PreferenceChange::MuteSound(Some(path))
            } else {
                PreferenceChange::UnmuteSound(Some(path))
            };
            self.change_preference(change);
        }

        fn start_capture(&mut self) {
            if self.capture.is_some() {
                return;
            }
            match HotkeyCapture::start(CAPTURE_TIMEOUT) {
                Ok(capture) => {
                    self.tray.set_hotkey_text("Press the new hotkey (Esc cancels)...");
                    self.tray.set_hotkey_enabled(false);
                    self.capture = Some(capture);
                }
                Err(e) => tracing::warn!(error = %e, "Failed to start hotkey capture"),
            }
        }

        fn poll_capture(&mut self) {
            let step = match &self.capture {
                Some(capture) => capture.poll(),
                None => return,
            };
            match step {
                CaptureStep::Waiting => return,
                CaptureStep::Cancelled => tracing::info!("Hotkey capture cancelled"),
                CaptureStep::Captured(combo) => self.rebind_hotkey(combo),
            }

            self.capture = None;
            self.tray.set_hotkey_enabled(true);
            self.tray
                .set_hotkey_text(&hotkey_label(&self.prefs.settings().hotkey));
        }

        fn rebind_hotkey(&mut self, combo: HotkeyCombo) {
            // Unregister first so the same combo can be picked again.
            self.hotkey = None;

            match HotkeyBinding::register(combo) {
                Ok(binding) => {
                    self.hotkey = Some(binding);
                    self.change_preference(PreferenceChange::Hotkey(combo));
                }
                Err(e) => {
                    show_error(&format!("Failed to set hotkey {combo}: {e}"));
                    let previous = HotkeyCombo::from_setting(&self.prefs.settings().hotkey);
                    self.hotkey = HotkeyBinding::register(previous)
                        .map_err(|e| tracing::warn!(error = %e, "Hotkey unavailable"))
                        .ok();
                }
            }
        }

        fn set_autostart(&mut self, enabled: bool) {
            if let Err(e) = self.autostart.set_enabled(enabled) {
                tracing::error!(error = %e, "Failed to update Start with Windows");
                self.tray.sync_choices(self.prefs.settings());
                return;
            }
            self.change_preference(PreferenceChange::StartWithWindows(enabled));
        }

        fn shutdown(mut self) {
            self.app.shutdown();
            self.tray.destroy();
            self.overlay.take();
            self.hotkey.take();
            tracing::info!("Exited");
        }
    }

    pub fn run() -> Result<()> {
        let mut desktop = match Desktop::new() {
            Ok(desktop) => desktop,
            Err(e) => {
                show_error(&format!("Startup failed: {e:#}"));
                return Err(e);
            }
        };

        unsafe {
            let timer = SetTimer(None, 0, PUMP_INTERVAL_MS, None);

            let mut msg = MSG::default();
            while GetMessageW(&mut msg, None, 0, 0).into() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);

                if !desktop.pump() {
                    break;
                }
            }

            let _ = KillTimer(None, timer);
        }

        desktop.shutdown();
        Ok(())
    }
}
