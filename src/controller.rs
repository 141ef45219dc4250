//! Mute state controller.
//!
//! Owns the single source of truth for the microphone's mute state and
//! serializes every device access behind one apply guard. Toggle requests
//! from the tray and the hotkey are debounced and coalesced, polls pick up
//! changes made by other applications, and every confirmed status change is
//! fanned out to the observer registry in commit order.
//!
//! Two locks are involved:
//!
//! - the apply guard (`slot`) owns the device handle, `last_known` and the
//!   published status. Device calls and observer notification happen while
//!   it is held.
//! - `control` holds toggle bookkeeping and a read-only copy of the state for
//!   display. It is never held across a device call, so `request_toggle` and
//!   `get_display_state` return immediately even while a toggle is running.
//!
//! Lock order is always `slot` then `control`.

use crate::audio::{AudioBackend, AudioDeviceHandle, MuteState};
use crate::observer::{MicStatus, MuteObserver, ObserverRegistry};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

/// Timing and retry parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Interval between external-change polls.
    pub poll_interval: Duration,
    /// Window during which repeated toggle requests collapse into one.
    pub debounce: Duration,
    /// Attempts for initialization and for each toggle.
    pub max_attempts: u32,
    /// Pause between failed attempts.
    pub retry_backoff: Duration,
}

impl ControllerConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            debounce: Self::DEFAULT_DEBOUNCE,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Self::DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Where a toggle request came from. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleSource {
    /// A direct click on the tray icon.
    Manual,
    Hotkey,
    Tray,
}

impl std::fmt::Display for ToggleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToggleSource::Manual => write!(f, "manual"),
            ToggleSource::Hotkey => write!(f, "hotkey"),
            ToggleSource::Tray => write!(f, "tray"),
        }
    }
}

/// Controller state machine as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Uninitialized,
    Ready(MuteState),
    /// Device unreachable; the last known state is kept but stale.
    Degraded,
    /// A toggle is being applied.
    Toggling,
}

/// Result of `request_toggle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A debounce window was started.
    Scheduled,
    /// Folded into a toggle that is already pending or running.
    Coalesced,
}

/// Result of `apply_toggle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Toggled(MuteState),
    /// Another toggle was running; this one is remembered as pending.
    Coalesced,
    /// Every attempt failed.
    Failed,
}

/// Result of `poll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A toggle holds the device; nothing was queried.
    Skipped,
    Unchanged,
    /// Observers were notified of a new state.
    Changed(MuteState),
    /// The device could not be queried.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Health {
    Uninitialized,
    Ready,
    Degraded,
}

struct DeviceSlot<B: AudioBackend> {
    device: AudioDeviceHandle<B>,
    last_known: MuteState,
    health: Health,
    published: Option<MicStatus>,
}

struct ControlState {
    toggling: bool,
    pending: bool,
    debounce_deadline: Option<Instant>,
    // Mirror of the slot, written only while the slot is locked.
    health: Health,
    last_known: MuteState,
    status: Option<MicStatus>,
}

type Waker = Box<dyn Fn() + Send>;

/// Serializes toggles and polls against one audio endpoint.
pub struct MuteStateController<B: AudioBackend> {
    config: ControllerConfig,
    slot: Mutex<DeviceSlot<B>>,
    control: Mutex<ControlState>,
    observers: ObserverRegistry,
    waker: Mutex<Option<Waker>>,
}

impl<B: AudioBackend> MuteStateController<B> {
    pub fn new(backend: B, config: ControllerConfig) -> Self {
        Self {
            config,
            slot: Mutex::new(DeviceSlot {
                device: AudioDeviceHandle::new(backend),
                last_known: MuteState::Unknown,
                health: Health::Uninitialized,
                published: None,
            }),
            control: Mutex::new(ControlState {
                toggling: false,
                pending: false,
                debounce_deadline: None,
                health: Health::Uninitialized,
                last_known: MuteState::Unknown,
                status: None,
            }),
            observers: ObserverRegistry::new(),
            waker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Add an observer. It receives every status change from now on.
    pub fn subscribe(&self, observer: Box<dyn MuteObserver>) {
        self.observers.subscribe(observer);
    }

    /// Register a callback run whenever a debounce window is armed, so the
    /// scheduler can wake before its next poll tick.
    pub fn set_waker<F>(&self, waker: F)
    where
        F: Fn() + Send + 'static,
    {
        *self.waker.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(waker));
    }

    pub fn clear_waker(&self) {
        *self.waker.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Connect and read the initial state, retrying a few times.
    ///
    /// Ends in `Ready` or `Degraded`; failure is never fatal, later polls
    /// and toggles keep trying to reconnect.
    pub fn initialize(&self) -> MuteState {
        let mut slot = self.lock_slot();
        self.initialize_locked(&mut slot)
    }

    /// Drop the current endpoint and run `initialize` again.
    pub fn refresh_device(&self) -> MuteState {
        tracing::info!("Refreshing audio device");
        let mut slot = self.lock_slot();
        slot.device.invalidate();
        self.initialize_locked(&mut slot)
    }

    /// Release the endpoint handle; the next device call reconnects.
    pub fn disconnect(&self) {
        self.lock_slot().device.invalidate();
    }

    /// Ask for the mute state to be flipped.
    ///
    /// Never blocks on the device. The first request arms a debounce window;
    /// requests arriving while that window is open or while a toggle is
    /// running only set the pending flag.
    pub fn request_toggle(&self, source: ToggleSource) -> RequestOutcome {
        let outcome = {
            let mut control = self.lock_control();
            control.pending = true;
            if control.toggling || control.debounce_deadline.is_some() {
                RequestOutcome::Coalesced
            } else {
                control.debounce_deadline = Some(Instant::now() + self.config.debounce);
                RequestOutcome::Scheduled
            }
        };

        match outcome {
            RequestOutcome::Scheduled => {
                tracing::debug!(%source, "Toggle request queued");
                self.wake();
            }
            RequestOutcome::Coalesced => {
                tracing::debug!(%source, "Toggle request coalesced");
            }
        }
        outcome
    }

    /// Deadline of the armed debounce window, if any.
    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.lock_control().debounce_deadline
    }

    /// Run the pending toggle if its debounce window ended before `now`.
    ///
    /// Returns `None` when nothing was due.
    pub fn fire_debounce(&self, now: Instant) -> Option<ToggleOutcome> {
        {
            let mut control = self.lock_control();
            match control.debounce_deadline {
                Some(deadline) if deadline <= now && !control.toggling => {}
                _ => return None,
            }
            control.debounce_deadline = None;
            if !control.pending {
                return None;
            }
            control.pending = false;
            control.toggling = true;
        }
        Some(self.run_claimed_toggle())
    }

    /// Flip the mute state now, bypassing the debounce window.
    pub fn apply_toggle(&self) -> ToggleOutcome {
        {
            let mut control = self.lock_control();
            if control.toggling {
                control.pending = true;
                tracing::debug!("Toggle already in flight, remembering request");
                return ToggleOutcome::Coalesced;
            }
            control.toggling = true;
        }
        self.run_claimed_toggle()
    }

    /// Check the device for changes made outside this application.
    ///
    /// Returns immediately without touching the device if a toggle is in
    /// flight.
    pub fn poll(&self) -> PollOutcome {
        if self.lock_control().toggling {
            tracing::trace!("Poll skipped: toggle in progress");
            return PollOutcome::Skipped;
        }

        let mut slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::WouldBlock) => {
                tracing::trace!("Poll skipped: device busy");
                return PollOutcome::Skipped;
            }
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };

        let was_connected = slot.device.is_connected();
        match slot.device.get_mute() {
            Ok(muted) => {
                let state = MuteState::from_muted(muted);
                let previous_health = slot.health;
                let previous_state = slot.last_known;
                let notified = self.commit(&mut slot, state);

                if previous_health != Health::Ready {
                    tracing::info!(%state, "Audio device available");
                } else if previous_state != state {
                    tracing::info!(%state, "External mute change detected");
                }

                if notified {
                    PollOutcome::Changed(state)
                } else {
                    PollOutcome::Unchanged
                }
            }
            Err(e) if was_connected => {
                // Live handle went bad. Stay quiet; next tick reconnects.
                tracing::debug!(error = %e, "Polling failed");
                self.degrade(&mut slot, None);
                PollOutcome::Unavailable
            }
            Err(e) => {
                tracing::debug!(error = %e, "Reconnect during poll failed");
                self.degrade(&mut slot, Some(MicStatus::NoDevice));
                PollOutcome::Unavailable
            }
        }
    }

    /// State to render: the last confirmed value while the device is
    /// reachable, `Unknown` otherwise.
    pub fn get_display_state(&self) -> MuteState {
        let control = self.lock_control();
        match control.health {
            Health::Ready => control.last_known,
            Health::Uninitialized | Health::Degraded => MuteState::Unknown,
        }
    }

    /// Last status delivered to observers.
    pub fn status(&self) -> Option<MicStatus> {
        self.lock_control().status
    }

    pub fn phase(&self) -> ControllerPhase {
        let control = self.lock_control();
        if control.toggling {
            return ControllerPhase::Toggling;
        }
        match control.health {
            Health::Uninitialized => ControllerPhase::Uninitialized,
            Health::Ready => ControllerPhase::Ready(control.last_known),
            Health::Degraded => ControllerPhase::Degraded,
        }
    }

    fn initialize_locked(&self, slot: &mut DeviceSlot<B>) -> MuteState {
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            match slot.device.connect().and_then(|()| slot.device.get_mute()) {
                Ok(muted) => {
                    let state = MuteState::from_muted(muted);
                    tracing::info!(%state, attempt, "Audio device initialized");
                    self.commit(slot, state);
                    return state;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Audio device initialization failed");
                    slot.device.invalidate();
                    if attempt < attempts {
                        std::thread::sleep(self.config.retry_backoff);
                    }
                }
            }
        }

        tracing::error!(attempts, "No audio device after retries");
        self.degrade(slot, Some(MicStatus::NoDevice));
        MuteState::Unknown
    }

    /// Toggle body. The caller has already set `toggling`.
    fn run_claimed_toggle(&self) -> ToggleOutcome {
        let outcome = {
            let mut slot = self.lock_slot();
            self.toggle_locked(&mut slot)
        };

        // A window that expired while we held `toggling` is still armed and
        // can fire now, so wake the scheduler either way.
        let pending = {
            let mut control = self.lock_control();
            control.toggling = false;
            if control.pending && control.debounce_deadline.is_none() {
                control.debounce_deadline = Some(Instant::now() + self.config.debounce);
            }
            control.pending
        };
        if pending {
            tracing::debug!("Running toggle requested during previous toggle");
            self.wake();
        }

        outcome
    }

    fn toggle_locked(&self, slot: &mut DeviceSlot<B>) -> ToggleOutcome {
        let attempts = self.config.max_attempts.max(1);
        let mut no_device = false;

        for attempt in 1..=attempts {
            match slot.device.toggle() {
                Ok(muted) => {
                    let state = MuteState::from_muted(muted);
                    tracing::info!(%state, attempt, "Microphone toggled");
                    self.commit(slot, state);
                    return ToggleOutcome::Toggled(state);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Toggle attempt failed");
                    no_device = e.is_unavailable();
                    slot.device.invalidate();
                    if attempt < attempts {
                        std::thread::sleep(self.config.retry_backoff);
                    }
                }
            }
        }

        // Classified by the last attempt's error.
        let status = if no_device {
            MicStatus::NoDevice
        } else {
            MicStatus::ToggleFailed
        };
        tracing::error!(attempts, %status, "All toggle attempts failed");
        self.degrade(slot, Some(status));
        ToggleOutcome::Failed
    }

    /// Record a confirmed device state. Returns true if observers were
    /// notified.
    fn commit(&self, slot: &mut DeviceSlot<B>, state: MuteState) -> bool {
        slot.last_known = state;
        slot.health = Health::Ready;
        self.publish(slot, Some(MicStatus::from_state(state)))
    }

    fn degrade(&self, slot: &mut DeviceSlot<B>, status: Option<MicStatus>) {
        slot.device.invalidate();
        slot.health = Health::Degraded;
        self.publish(slot, status);
    }

    fn publish(&self, slot: &mut DeviceSlot<B>, status: Option<MicStatus>) -> bool {
        let changed = match status {
            Some(status) if slot.published != Some(status) => {
                slot.published = Some(status);
                true
            }
            _ => false,
        };

        {
            let mut control = self.lock_control();
            control.health = slot.health;
            control.last_known = slot.last_known;
            control.status = slot.published;
        }

        if let (true, Some(status)) = (changed, status) {
            self.observers.notify(status);
        }
        changed
    }

    fn wake(&self) {
        if let Some(waker) = self.waker.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            waker();
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, DeviceSlot<B>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_control(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }
}
