//! Application wiring.
//!
//! Builds the controller from settings, subscribes the status observers in
//! display order and starts the poll loop. The UI thread owns the [`App`]
//! and drains [`UiUpdate`]s from it on each pass of its event loop.

use crate::audio::AudioBackend;
use crate::controller::{MuteStateController, RequestOutcome, ToggleSource};
use crate::observer::MicStatus;
use crate::platform::Settings;
use crate::scheduler::PollLoop;
use crate::ui::{
    OverlayObserver, SoundFiles, SoundObserver, SoundPlayer, StatusLabelObserver, TrayObserver,
    UiUpdate,
};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;

/// Running mute engine plus the channel its observers report on.
pub struct App<B: AudioBackend> {
    controller: Arc<MuteStateController<B>>,
    poll_loop: Option<PollLoop>,
    updates: Receiver<UiUpdate>,
    sounds: SoundFiles,
}

impl<B> App<B>
where
    B: AudioBackend + Send + 'static,
    B::Handle: Send,
{
    /// Start the engine. `sound` is optional; without it mute changes are
    /// silent.
    pub fn start<P>(backend: B, settings: &Settings, sound: Option<P>) -> std::io::Result<Self>
    where
        P: SoundPlayer + 'static,
    {
        let controller = Arc::new(MuteStateController::new(
            backend,
            settings.controller_config(),
        ));

        let sounds = SoundFiles::new(
            settings.mute_sound_file.clone(),
            settings.unmute_sound_file.clone(),
        );

        let (tx, updates) = channel();
        controller.subscribe(Box::new(StatusLabelObserver::new(tx.clone())));
        controller.subscribe(Box::new(TrayObserver::new(tx.clone())));
        controller.subscribe(Box::new(OverlayObserver::new(tx)));
        if let Some(player) = sound {
            controller.subscribe(Box::new(SoundObserver::new(player, sounds.clone())));
        }

        let poll_loop = PollLoop::spawn(Arc::clone(&controller))?;
        tracing::info!("Mute engine started");

        Ok(Self {
            controller,
            poll_loop: Some(poll_loop),
            updates,
            sounds,
        })
    }

    pub fn request_toggle(&self, source: ToggleSource) -> RequestOutcome {
        self.controller.request_toggle(source)
    }

    /// Re-acquire the default capture device on the poll thread.
    pub fn refresh_device(&self) {
        if let Some(poll_loop) = &self.poll_loop {
            poll_loop.refresh();
        }
    }

    /// Use new mute and unmute sounds from the next transition on.
    pub fn set_sound_files(&self, mute: Option<PathBuf>, unmute: Option<PathBuf>) {
        self.sounds.set(mute, unmute);
    }

    pub fn status(&self) -> Option<MicStatus> {
        self.controller.status()
    }

    pub fn controller(&self) -> &MuteStateController<B> {
        &self.controller
    }

    /// Updates published since the last call, oldest first.
    pub fn drain_updates(&self) -> Vec<UiUpdate> {
        self.updates.try_iter().collect()
    }

    /// Stop the poll loop and wait for it to finish.
    pub fn shutdown(&mut self) {
        if let Some(poll_loop) = self.poll_loop.take() {
            poll_loop.shutdown();
            tracing::info!("Mute engine stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MuteState;
    use crate::platform::icons::IconKind;
    use crate::testing::{Call, FakeBackend};
    use std::path::Path;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Played(Arc<Mutex<Vec<PathBuf>>>);

    impl SoundPlayer for Played {
        fn play(&self, path: &Path) -> Result<(), String> {
            self.0.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn fast_settings() -> Settings {
        Settings {
            poll_interval_ms: 10,
            debounce_ms: 20,
            ..Settings::default()
        }
    }

    #[test]
    fn initial_status_reaches_every_surface() {
        let fake = FakeBackend::new(false);
        let mut app = App::start(fake, &fast_settings(), None::<Played>).unwrap();
        thread::sleep(Duration::from_millis(50));

        assert_eq!(
            app.drain_updates(),
            vec![
                UiUpdate::Status("Status: Unmuted".into()),
                UiUpdate::Tray {
                    icon: IconKind::Live,
                    tooltip: "Microphone: Unmuted".into()
                },
                UiUpdate::Overlay { visible: false },
            ]
        );
        app.shutdown();
    }

    #[test]
    fn tray_toggle_mutes_and_plays_sound() {
        let dir = tempfile::tempdir().unwrap();
        let mute = dir.path().join("mute.wav");
        std::fs::write(&mute, b"RIFF").unwrap();
        let settings = Settings {
            mute_sound_file: Some(mute.clone()),
            ..fast_settings()
        };

        let fake = FakeBackend::new(false);
        let played = Played::default();
        let mut app = App::start(fake.clone(), &settings, Some(played.clone())).unwrap();
        thread::sleep(Duration::from_millis(40));
        app.drain_updates();

        app.request_toggle(ToggleSource::Tray);
        app.request_toggle(ToggleSource::Hotkey);
        thread::sleep(Duration::from_millis(120));
        app.shutdown();

        assert_eq!(fake.count(Call::SetMute(true)), 1);
        assert_eq!(app.controller().get_display_state(), MuteState::Muted);
        assert_eq!(*played.0.lock().unwrap(), vec![mute]);
        assert!(app
            .drain_updates()
            .contains(&UiUpdate::Overlay { visible: true }));
    }

    #[test]
    fn sound_change_applies_without_restart() {
        let dir = tempfile::tempdir().unwrap();
        let unmute = dir.path().join("unmute.wav");
        std::fs::write(&unmute, b"RIFF").unwrap();

        let fake = FakeBackend::new(true);
        let played = Played::default();
        let mut app = App::start(fake.clone(), &fast_settings(), Some(played.clone())).unwrap();
        thread::sleep(Duration::from_millis(40));

        app.set_sound_files(None, Some(unmute.clone()));
        app.request_toggle(ToggleSource::Manual);
        thread::sleep(Duration::from_millis(120));
        app.shutdown();

        assert_eq!(app.status(), Some(MicStatus::Unmuted));
        assert_eq!(*played.0.lock().unwrap(), vec![unmute]);
    }

    #[test]
    fn refresh_recovers_missing_device() {
        let fake = FakeBackend::new(true);
        fake.set_present(false);
        let mut app = App::start(fake.clone(), &fast_settings(), None::<Played>).unwrap();
        // Three connect attempts with the default retry pause.
        thread::sleep(Duration::from_millis(700));
        assert_eq!(app.status(), Some(MicStatus::NoDevice));

        fake.set_present(true);
        app.refresh_device();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(app.status(), Some(MicStatus::Muted));
        app.shutdown();
    }
}
