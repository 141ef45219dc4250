//! Audible mute/unmute feedback.

use crate::observer::{MicStatus, MuteObserver, ObserverError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Something that can play a sound file without blocking the caller.
pub trait SoundPlayer: Send {
    fn play(&self, path: &Path) -> Result<(), String>;
}

#[derive(Debug, Default)]
struct Paths {
    mute: Option<PathBuf>,
    unmute: Option<PathBuf>,
}

/// Mute and unmute sound paths. Clones share the same paths, so the UI
/// thread can swap them while the observer runs on the poll thread.
#[derive(Debug, Clone, Default)]
pub struct SoundFiles {
    paths: Arc<Mutex<Paths>>,
}

impl SoundFiles {
    pub fn new(mute: Option<PathBuf>, unmute: Option<PathBuf>) -> Self {
        let files = Self::default();
        files.set(mute, unmute);
        files
    }

    /// Replace both paths. Empty paths count as unset.
    pub fn set(&self, mute: Option<PathBuf>, unmute: Option<PathBuf>) {
        let mut paths = self.lock();
        paths.mute = mute.filter(|p| !p.as_os_str().is_empty());
        paths.unmute = unmute.filter(|p| !p.as_os_str().is_empty());
    }

    fn for_state(&self, muted: bool) -> Option<PathBuf> {
        let paths = self.lock();
        if muted {
            paths.mute.clone()
        } else {
            paths.unmute.clone()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Paths> {
        self.paths.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Plays the configured sound on each Muted/Unmuted transition.
///
/// The first published status and every error status are silent. An error
/// in between does not reset the transition: Muted, NoDevice, Unmuted still
/// plays the unmute sound.
pub struct SoundObserver<P: SoundPlayer> {
    player: P,
    files: SoundFiles,
    last: Option<bool>,
}

impl<P: SoundPlayer> SoundObserver<P> {
    pub fn new(player: P, files: SoundFiles) -> Self {
        Self {
            player,
            files,
            last: None,
        }
    }
}

impl<P: SoundPlayer> MuteObserver for SoundObserver<P> {
    fn name(&self) -> &str {
        "sound"
    }

    fn on_status(&mut self, status: MicStatus) -> Result<(), ObserverError> {
        let Some(muted) = status.muted() else {
            return Ok(());
        };
        let previous = self.last.replace(muted);
        if previous.is_none() || previous == Some(muted) {
            return Ok(());
        }

        let Some(path) = self.files.for_state(muted) else {
            return Ok(());
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Sound file missing, skipping");
            return Ok(());
        }

        self.player
            .play(&path)
            .map_err(|message| ObserverError::Failed {
                observer: "sound".to_string(),
                message,
            })
    }
}

/// Newest of the requests queued behind `first`. The older ones would be
/// cut off as soon as they started.
#[cfg_attr(not(windows), allow(dead_code))]
fn newest(first: PathBuf, queued: impl Iterator<Item = PathBuf>) -> PathBuf {
    queued.last().unwrap_or(first)
}

#[cfg(windows)]
pub use player::RodioPlayer;

#[cfg(windows)]
mod player {
    use super::{newest, SoundPlayer};
    use rodio::{Decoder, OutputStream, Sink};
    use std::fs::File;
    use std::io::BufReader;
    use std::path::{Path, PathBuf};
    use std::sync::mpsc::{channel, Sender};

    /// Decodes and plays files on a dedicated thread that owns the output
    /// stream. A new sound cuts off the one still playing.
    pub struct RodioPlayer {
        requests: Sender<PathBuf>,
    }

    impl RodioPlayer {
        pub fn spawn() -> std::io::Result<Self> {
            let (requests, receiver) = channel::<PathBuf>();

            std::thread::Builder::new()
                .name("sound".to_string())
                .spawn(move || {
                    let (_stream, handle) = match OutputStream::try_default() {
                        Ok(output) => output,
                        Err(e) => {
                            tracing::warn!(error = %e, "No audio output, sounds disabled");
                            return;
                        }
                    };
                    let sink = match Sink::try_new(&handle) {
                        Ok(sink) => sink,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to create audio sink");
                            return;
                        }
                    };

                    while let Ok(first) = receiver.recv() {
                        let path = newest(first, receiver.try_iter());
                        let source = match File::open(&path)
                            .map_err(|e| e.to_string())
                            .and_then(|f| Decoder::new(BufReader::new(f)).map_err(|e| e.to_string()))
                        {
                            Ok(source) => source,
                            Err(e) => {
                                tracing::warn!(path = %path.display(), error = %e, "Failed to decode sound");
                                continue;
                            }
                        };

                        sink.stop();
                        sink.append(source);
                        sink.play();
                    }
                })?;

            Ok(Self { requests })
        }
    }

    impl SoundPlayer for RodioPlayer {
        fn play(&self, path: &Path) -> Result<(), String> {
            self.requests
                .send(path.to_path_buf())
                .map_err(|_| "sound thread stopped".to_string())
        }
    }
}
