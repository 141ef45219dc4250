//! Poll loop.
//!
//! A dedicated worker thread that drives `poll()` on a fixed cadence and
//! fires debounce expiry for pending toggles. Every device call of the
//! running application happens on this thread, which also keeps COM
//! apartment rules simple on Windows.

use crate::audio::AudioBackend;
use crate::controller::{ControllerPhase, MuteStateController, PollOutcome};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Poll delay multiplier cap while the device is unavailable.
const MAX_BACKOFF_FACTOR: u32 = 16;

/// Commands accepted by the loop thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Re-evaluate deadlines now (a debounce window was armed).
    Wake,
    /// Run `refresh_device` on the loop thread.
    Refresh,
    Shutdown,
}

/// Handle to the running poll loop. Dropping it stops the thread.
pub struct PollLoop {
    commands: Sender<SchedulerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl PollLoop {
    /// Start the loop thread.
    ///
    /// The controller is initialized on the loop thread if that has not
    /// happened yet.
    pub fn spawn<B>(controller: Arc<MuteStateController<B>>) -> std::io::Result<Self>
    where
        B: AudioBackend + Send + 'static,
        B::Handle: Send,
    {
        let (commands, receiver) = channel();

        let waker = commands.clone();
        controller.set_waker(move || {
            let _ = waker.send(SchedulerCommand::Wake);
        });

        let thread = std::thread::Builder::new()
            .name("mute-poll".to_string())
            .spawn(move || {
                if controller.phase() == ControllerPhase::Uninitialized {
                    controller.initialize();
                }

                let base = controller.config().poll_interval;
                let mut backoff = Backoff::new(base);
                let mut next_poll = Instant::now() + base;

                loop {
                    let now = Instant::now();

                    controller.fire_debounce(now);

                    if now >= next_poll {
                        let outcome = controller.poll();
                        next_poll = now + backoff.record(outcome);
                    }

                    let now = Instant::now();
                    let toggling = controller.phase() == ControllerPhase::Toggling;
                    let wake_at =
                        wake_time(now, controller.debounce_deadline(), next_poll, toggling);
                    let timeout = wake_at.saturating_duration_since(now);

                    match receiver.recv_timeout(timeout) {
                        Ok(SchedulerCommand::Wake) | Err(RecvTimeoutError::Timeout) => {}
                        Ok(SchedulerCommand::Refresh) => {
                            controller.refresh_device();
                            backoff.reset();
                        }
                        Ok(SchedulerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                            break;
                        }
                    }
                }

                // Release COM objects on the thread that created them.
                controller.disconnect();
                controller.clear_waker();
                tracing::debug!("Poll loop stopped");
            })?;

        Ok(Self {
            commands,
            thread: Some(thread),
        })
    }

    /// Queue a device refresh on the loop thread.
    pub fn refresh(&self) {
        let _ = self.commands.send(SchedulerCommand::Refresh);
    }

    /// Stop the loop and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.commands.send(SchedulerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Poll loop thread panicked");
            }
        }
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// When the loop should next wake up.
///
/// An expired deadline is due now, unless a running toggle holds it. That
/// toggle wakes the loop when it finishes, so until then the loop sleeps
/// until the next poll.
fn wake_time(
    now: Instant,
    deadline: Option<Instant>,
    next_poll: Instant,
    toggling: bool,
) -> Instant {
    match deadline {
        Some(deadline) if deadline > now => deadline.min(next_poll),
        Some(_) if !toggling => now,
        _ => next_poll,
    }
}

/// Doubles the poll delay for each consecutive unavailable poll.
#[derive(Debug)]
struct Backoff {
    base: Duration,
    factor: u32,
}

impl Backoff {
    fn new(base: Duration) -> Self {
        Self { base, factor: 1 }
    }

    fn record(&mut self, outcome: PollOutcome) -> Duration {
        match outcome {
            PollOutcome::Unavailable => {
                let delay = self.base * self.factor;
                self.factor = (self.factor * 2).min(MAX_BACKOFF_FACTOR);
                delay
            }
            PollOutcome::Skipped => self.base,
            PollOutcome::Unchanged | PollOutcome::Changed(_) => {
                self.reset();
                self.base
            }
        }
    }

    fn reset(&mut self) {
        self.factor = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MuteState;
    use crate::controller::{ControllerConfig, ToggleSource};
    use crate::observer::MicStatus;
    use crate::testing::{Call, FakeBackend, RecordingObserver};
    use std::thread;

    fn fast_config() -> ControllerConfig {
        ControllerConfig {
            poll_interval: Duration::from_millis(10),
            debounce: Duration::from_millis(20),
            retry_backoff: Duration::ZERO,
            ..ControllerConfig::default()
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        let mut backoff = Backoff::new(base);

        let delays: Vec<_> = (0..7)
            .map(|_| backoff.record(PollOutcome::Unavailable))
            .collect();
        assert_eq!(delays[0], base);
        assert_eq!(delays[1], base * 2);
        assert_eq!(delays[4], base * 16);
        assert_eq!(delays[6], base * 16);

        assert_eq!(backoff.record(PollOutcome::Unchanged), base);
        assert_eq!(backoff.record(PollOutcome::Unavailable), base);
    }

    #[test]
    fn wake_time_follows_deadline_and_poll() {
        let now = Instant::now();
        let next_poll = now + Duration::from_millis(100);

        assert_eq!(wake_time(now, None, next_poll, false), next_poll);
        let soon = now + Duration::from_millis(30);
        assert_eq!(wake_time(now, Some(soon), next_poll, false), soon);
        let late = now + Duration::from_millis(300);
        assert_eq!(wake_time(now, Some(late), next_poll, false), next_poll);
    }

    #[test]
    fn expired_deadline_held_by_toggle_does_not_spin() {
        let now = Instant::now();
        let next_poll = now + Duration::from_millis(100);
        let expired = now.checked_sub(Duration::from_millis(5)).unwrap_or(now);

        assert_eq!(wake_time(now, Some(expired), next_poll, true), next_poll);
        assert_eq!(wake_time(now, Some(expired), next_poll, false), now);
    }

    #[test]
    fn loop_initializes_and_picks_up_external_changes() {
        let fake = FakeBackend::new(false);
        let ctrl = Arc::new(MuteStateController::new(fake.clone(), fast_config()));
        let recorder = RecordingObserver::new();
        ctrl.subscribe(Box::new(recorder.clone()));

        let poll_loop = PollLoop::spawn(Arc::clone(&ctrl)).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ctrl.get_display_state(), MuteState::Unmuted);

        fake.set_external_mute(true);
        thread::sleep(Duration::from_millis(80));
        assert_eq!(ctrl.get_display_state(), MuteState::Muted);

        poll_loop.shutdown();
        assert_eq!(recorder.received(), vec![MicStatus::Unmuted, MicStatus::Muted]);
    }

    #[test]
    fn loop_fires_debounced_toggle_once() {
        let fake = FakeBackend::new(false);
        let ctrl = Arc::new(MuteStateController::new(fake.clone(), fast_config()));
        let poll_loop = PollLoop::spawn(Arc::clone(&ctrl)).unwrap();
        thread::sleep(Duration::from_millis(30));

        for _ in 0..4 {
            ctrl.request_toggle(ToggleSource::Hotkey);
        }
        thread::sleep(Duration::from_millis(150));
        poll_loop.shutdown();

        assert_eq!(fake.set_calls(), 1);
        assert_eq!(fake.count(Call::SetMute(true)), 1);
        assert_eq!(ctrl.get_display_state(), MuteState::Muted);
    }

    #[test]
    fn refresh_runs_on_loop_thread() {
        let fake = FakeBackend::new(true);
        fake.set_present(false);
        let ctrl = Arc::new(MuteStateController::new(fake.clone(), fast_config()));
        let poll_loop = PollLoop::spawn(Arc::clone(&ctrl)).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(ctrl.status(), Some(MicStatus::NoDevice));

        fake.set_present(true);
        poll_loop.refresh();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ctrl.get_display_state(), MuteState::Muted);
        drop(poll_loop);
    }
}
