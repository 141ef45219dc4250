//! Global hotkey parsing and registration.
//!
//! Combos are written as `+`-separated tokens, e.g. `ctrl+alt+m`. Modifiers
//! are `ctrl`, `alt`, `shift` and `win`; exactly one other token names the
//! key.

use crate::platform::settings::DEFAULT_HOTKEY;
use std::fmt;
use thiserror::Error;

/// Hotkey error types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HotkeyError {
    #[error("no key in hotkey {0:?}")]
    NoKey(String),

    #[error("more than one key in hotkey {0:?}")]
    MultipleKeys(String),

    #[error("unknown key {0:?}")]
    UnknownKey(String),

    #[error("failed to register hotkey: {0}")]
    Register(String),
}

/// Non-modifier key of a combo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// `a`-`z` or `0`-`9`, stored lowercase.
    Char(char),
    /// F1-F12.
    Function(u8),
    Space,
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    Pause,
}

impl Key {
    fn parse(token: &str) -> Option<Self> {
        let lower = token.to_ascii_lowercase();
        let mut chars = lower.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            return ch.is_ascii_alphanumeric().then_some(Key::Char(ch));
        }

        if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            return (1..=12).contains(&n).then_some(Key::Function(n));
        }

        let key = match lower.as_str() {
            "space" => Key::Space,
            "enter" | "return" => Key::Enter,
            "tab" => Key::Tab,
            "esc" | "escape" => Key::Escape,
            "backspace" => Key::Backspace,
            "del" | "delete" => Key::Delete,
            "ins" | "insert" => Key::Insert,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" => Key::PageUp,
            "pagedown" => Key::PageDown,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "pause" => Key::Pause,
            _ => return None,
        };
        Some(key)
    }
}

impl Key {
    /// Map a Windows virtual-key code. Modifier keys map to `None`.
    pub fn from_virtual_key(vk: u32) -> Option<Self> {
        let key = match vk {
            0x30..=0x39 | 0x41..=0x5A => {
                let ch = char::from_u32(vk)?.to_ascii_lowercase();
                Key::Char(ch)
            }
            0x70..=0x7B => Key::Function((vk - 0x70 + 1) as u8),
            0x08 => Key::Backspace,
            0x09 => Key::Tab,
            0x0D => Key::Enter,
            0x13 => Key::Pause,
            0x1B => Key::Escape,
            0x20 => Key::Space,
            0x21 => Key::PageUp,
            0x22 => Key::PageDown,
            0x23 => Key::End,
            0x24 => Key::Home,
            0x25 => Key::Left,
            0x26 => Key::Up,
            0x27 => Key::Right,
            0x28 => Key::Down,
            0x2D => Key::Insert,
            0x2E => Key::Delete,
            _ => return None,
        };
        Some(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Key::Char(c) => return write!(f, "{c}"),
            Key::Function(n) => return write!(f, "f{n}"),
            Key::Space => "space",
            Key::Enter => "enter",
            Key::Tab => "tab",
            Key::Escape => "esc",
            Key::Backspace => "backspace",
            Key::Delete => "delete",
            Key::Insert => "insert",
            Key::Home => "home",
            Key::End => "end",
            Key::PageUp => "pageup",
            Key::PageDown => "pagedown",
            Key::Up => "up",
            Key::Down => "down",
            Key::Left => "left",
            Key::Right => "right",
            Key::Pause => "pause",
        };
        f.write_str(name)
    }
}

/// A parsed key combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyCombo {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub win: bool,
    pub key: Key,
}

impl HotkeyCombo {
    pub fn parse(s: &str) -> Result<Self, HotkeyError> {
        let (mut ctrl, mut alt, mut shift, mut win) = (false, false, false, false);
        let mut key = None;

        for token in s.split('+').map(str::trim).filter(|t| !t.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => ctrl = true,
                "alt" => alt = true,
                "shift" => shift = true,
                "win" | "super" | "meta" => win = true,
                _ => {
                    if key.is_some() {
                        return Err(HotkeyError::MultipleKeys(s.to_string()));
                    }
                    key = Some(
                        Key::parse(token)
                            .ok_or_else(|| HotkeyError::UnknownKey(token.to_string()))?,
                    );
                }
            }
        }

        let key = key.ok_or_else(|| HotkeyError::NoKey(s.to_string()))?;
        Ok(Self {
            ctrl,
            alt,
            shift,
            win,
            key,
        })
    }

    /// Parse a configured combo, falling back to the default on error.
    pub fn from_setting(s: &str) -> Self {
        match Self::parse(s) {
            Ok(combo) => combo,
            Err(e) => {
                tracing::warn!(hotkey = s, error = %e, "Invalid hotkey, using {DEFAULT_HOTKEY}");
                Self::default()
            }
        }
    }
}

impl Default for HotkeyCombo {
    fn default() -> Self {
        Self {
            ctrl: true,
            alt: true,
            shift: false,
            win: false,
            key: Key::Char('m'),
        }
    }
}

impl fmt::Display for HotkeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (on, name) in [
            (self.ctrl, "ctrl+"),
            (self.alt, "alt+"),
            (self.shift, "shift+"),
            (self.win, "win+"),
        ] {
            if on {
                f.write_str(name)?;
            }
        }
        write!(f, "{}", self.key)
    }
}

/// Modifier keys held while a key went down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeldModifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub win: bool,
}

impl HeldModifiers {
    fn any(&self) -> bool {
        self.ctrl || self.alt || self.shift || self.win
    }
}

/// Progress of an interactive hotkey capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStep {
    /// Keep listening.
    Waiting,
    /// Escape was pressed on its own, or the capture timed out.
    Cancelled,
    Captured(HotkeyCombo),
}

/// Decide what a key press means while capturing.
///
/// Modifier presses keep waiting for the main key. Letters and digits need
/// at least one modifier so a plain keystroke is never grabbed globally.
pub fn capture_step(vk: u32, held: HeldModifiers) -> CaptureStep {
    let Some(key) = Key::from_virtual_key(vk) else {
        return CaptureStep::Waiting;
    };
    if key == Key::Escape && !held.any() {
        return CaptureStep::Cancelled;
    }
    if matches!(key, Key::Char(_)) && !held.any() {
        return CaptureStep::Waiting;
    }
    CaptureStep::Captured(HotkeyCombo {
        ctrl: held.ctrl,
        alt: held.alt,
        shift: held.shift,
        win: held.win,
        key,
    })
}

#[cfg(windows)]
pub use binding::HotkeyBinding;

#[cfg(windows)]
pub use capture::HotkeyCapture;

#[cfg(windows)]
mod binding {
    use super::{HotkeyCombo, HotkeyError, Key};
    use global_hotkey::hotkey::{Code, HotKey, Modifiers};
    use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};

    /// A registered system-wide hotkey. Unregistered on drop.
    pub struct HotkeyBinding {
        manager: GlobalHotKeyManager,
        hotkey: HotKey,
    }

    impl HotkeyBinding {
        pub fn register(combo: HotkeyCombo) -> Result<Self, HotkeyError> {
            let manager =
                GlobalHotKeyManager::new().map_err(|e| HotkeyError::Register(e.to_string()))?;

            let mut modifiers = Modifiers::empty();
            if combo.ctrl {
                modifiers |= Modifiers::CONTROL;
            }
            if combo.alt {
                modifiers |= Modifiers::ALT;
            }
            if combo.shift {
                modifiers |= Modifiers::SHIFT;
            }
            if combo.win {
                modifiers |= Modifiers::SUPER;
            }
            let modifiers = (!modifiers.is_empty()).then_some(modifiers);

            let code = code_for(combo.key)
                .ok_or_else(|| HotkeyError::UnknownKey(combo.key.to_string()))?;
            let hotkey = HotKey::new(modifiers, code);

            manager
                .register(hotkey)
                .map_err(|e| HotkeyError::Register(e.to_string()))?;
            tracing::info!(hotkey = %combo, "Global hotkey registered");

            Ok(Self { manager, hotkey })
        }

        /// Number of presses of this hotkey since the last call.
        pub fn drain_presses(&self) -> usize {
            GlobalHotKeyEvent::receiver()
                .try_iter()
                .filter(|e| e.id == self.hotkey.id() && e.state == HotKeyState::Pressed)
                .count()
        }
    }

    impl Drop for HotkeyBinding {
        fn drop(&mut self) {
            if let Err(e) = self.manager.unregister(self.hotkey) {
                tracing::debug!(error = %e, "Failed to unregister hotkey");
            }
        }
    }

    fn code_for(key: Key) -> Option<Code> {
        let code = match key {
            Key::Char(c) => return char_code(c),
            Key::Function(n) => return function_code(n),
            Key::Space => Code::Space,
            Key::Enter => Code::Enter,
            Key::Tab => Code::Tab,
            Key::Escape => Code::Escape,
            Key::Backspace => Code::Backspace,
            Key::Delete => Code::Delete,
            Key::Insert => Code::Insert,
            Key::Home => Code::Home,
            Key::End => Code::End,
            Key::PageUp => Code::PageUp,
            Key::PageDown => Code::PageDown,
            Key::Up => Code::ArrowUp,
            Key::Down => Code::ArrowDown,
            Key::Left => Code::ArrowLeft,
            Key::Right => Code::ArrowRight,
            Key::Pause => Code::Pause,
        };
        Some(code)
    }

    fn char_code(c: char) -> Option<Code> {
        let code = match c {
            'a' => Code::KeyA,
            'b' => Code::KeyB,
            'c' => Code::KeyC,
            'd' => Code::KeyD,
            'e' => Code::KeyE,
            'f' => Code::KeyF,
            'g' => Code::KeyG,
            'h' => Code::KeyH,
            'i' => Code::KeyI,
            'j' => Code::KeyJ,
            'k' => Code::KeyK,
            'l' => Code::KeyL,
            'm' => Code::KeyM,
            'n' => Code::KeyN,
            'o' => Code::KeyO,
            'p' => Code::KeyP,
            'q' => Code::KeyQ,
            'r' => Code::KeyR,
            's' => Code::KeyS,
            't' => Code::KeyT,
            'u' => Code::KeyU,
            'v' => Code::KeyV,
            'w' => Code::KeyW,
            'x' => Code::KeyX,
            'y' => Code::KeyY,
            'z' => Code::KeyZ,
            '0' => Code::Digit0,
            '1' => Code::Digit1,
            '2' => Code::Digit2,
            '3' => Code::Digit3,
            '4' => Code::Digit4,
            '5' => Code::Digit5,
            '6' => Code::Digit6,
            '7' => Code::Digit7,
            '8' => Code::Digit8,
            '9' => Code::Digit9,
            _ => return None,
        };
        Some(code)
    }

    fn function_code(n: u8) -> Option<Code> {
        let code = match n {
            1 => Code::F1,
            2 => Code::F2,
            3 => Code::F3,
            4 => Code::F4,
            5 => Code::F5,
            6 => Code::F6,
            7 => Code::F7,
            8 => Code::F8,
            9 => Code::F9,
            10 => Code::F10,
            11 => Code::F11,
            12 => Code::F12,
            _ => return None,
        };
        Some(code)
    }
}

#[cfg(windows)]
mod capture {
    use super::{capture_step, CaptureStep, HeldModifiers};
    use std::cell::RefCell;
    use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
    use std::time::Duration;
    use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        GetAsyncKeyState, VIRTUAL_KEY, VK_CONTROL, VK_LWIN, VK_MENU, VK_RWIN, VK_SHIFT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, DispatchMessageW, GetMessageW, KillTimer, PostQuitMessage, SetTimer,
        SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, HHOOK, KBDLLHOOKSTRUCT, MSG,
        WH_KEYBOARD_LL, WM_KEYDOWN, WM_SYSKEYDOWN, WM_TIMER,
    };

    thread_local! {
        // Set on the capture thread only; the hook runs on that thread.
        static RESULT: RefCell<Option<Sender<CaptureStep>>> = const { RefCell::new(None) };
    }

    fn held(vk: VIRTUAL_KEY) -> bool {
        unsafe { GetAsyncKeyState(vk.0 as i32) < 0 }
    }

    fn finish(step: CaptureStep) {
        RESULT.with(|slot| {
            if let Some(tx) = slot.borrow_mut().take() {
                let _ = tx.send(step);
            }
        });
    }

    unsafe extern "system" fn capture_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        let message = wparam.0 as u32;
        if code >= 0 && (message == WM_KEYDOWN || message == WM_SYSKEYDOWN) {
            let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
            let modifiers = HeldModifiers {
                ctrl: held(VK_CONTROL),
                alt: held(VK_MENU),
                shift: held(VK_SHIFT),
                win: held(VK_LWIN) || held(VK_RWIN),
            };
            let step = capture_step(info.vkCode, modifiers);
            if step != CaptureStep::Waiting {
                finish(step);
                PostQuitMessage(0);
                // Swallow the key so it does not reach the focused window.
                return LRESULT(1);
            }
        }
        CallNextHookEx(HHOOK::default(), code, wparam, lparam)
    }

    /// Listens for the next key combination on a worker thread with a
    /// low-level keyboard hook. The UI thread polls for the result.
    pub struct HotkeyCapture {
        result: Receiver<CaptureStep>,
    }

    impl HotkeyCapture {
        pub fn start(timeout: Duration) -> std::io::Result<Self> {
            let (tx, result) = channel();

            std::thread::Builder::new()
                .name("hotkey-capture".to_string())
                .spawn(move || {
                    RESULT.with(|slot| *slot.borrow_mut() = Some(tx));
                    unsafe { run_hook(timeout) };
                    // Hook failed or the loop ended without a key.
                    finish(CaptureStep::Cancelled);
                })?;

            tracing::info!("Waiting for new hotkey");
            Ok(Self { result })
        }

        /// Result so far. Stays `Waiting` until a combo is pressed, Escape
        /// cancels or the timeout passes.
        pub fn poll(&self) -> CaptureStep {
            match self.result.try_recv() {
                Ok(step) => step,
                Err(TryRecvError::Empty) => CaptureStep::Waiting,
                Err(TryRecvError::Disconnected) => CaptureStep::Cancelled,
            }
        }
    }

    unsafe fn run_hook(timeout: Duration) {
        let module = match GetModuleHandleW(None) {
            Ok(module) => module,
            Err(e) => {
                tracing::error!(error = %e, "Failed to get module handle");
                return;
            }
        };
        let hook = match SetWindowsHookExW(
            WH_KEYBOARD_LL,
            Some(capture_proc),
            HINSTANCE::from(module),
            0,
        ) {
            Ok(hook) => hook,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install keyboard hook");
                return;
            }
        };

        let millis = timeout.as_millis().min(u32::MAX as u128) as u32;
        let timer = SetTimer(None, 0, millis, None);

        // Low-level hooks only fire while this thread pumps messages.
        let mut msg = MSG::default();
        while GetMessageW(&mut msg, None, 0, 0).into() {
            if msg.message == WM_TIMER {
                tracing::info!("Hotkey capture timed out");
                break;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        let _ = KillTimer(None, timer);
        if let Err(e) = UnhookWindowsHookEx(hook) {
            tracing::warn!(error = %e, "Failed to remove keyboard hook");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_combo() {
        let combo = HotkeyCombo::parse(DEFAULT_HOTKEY).unwrap();
        assert_eq!(combo, HotkeyCombo::default());
        assert_eq!(combo.to_string(), "ctrl+alt+m");
    }

    #[test]
    fn case_and_spacing_are_ignored() {
        let combo = HotkeyCombo::parse(" Ctrl + Shift + F9 ").unwrap();
        assert!(combo.ctrl && combo.shift && !combo.alt && !combo.win);
        assert_eq!(combo.key, Key::Function(9));
        assert_eq!(combo.to_string(), "ctrl+shift+f9");
    }

    #[test]
    fn bare_key_is_allowed() {
        let combo = HotkeyCombo::parse("pause").unwrap();
        assert_eq!(combo.key, Key::Pause);
        assert!(!combo.ctrl);
    }

    #[test]
    fn rejects_invalid_combos() {
        assert_eq!(
            HotkeyCombo::parse("ctrl+alt"),
            Err(HotkeyError::NoKey("ctrl+alt".into()))
        );
        assert_eq!(
            HotkeyCombo::parse("ctrl+a+b"),
            Err(HotkeyError::MultipleKeys("ctrl+a+b".into()))
        );
        assert_eq!(
            HotkeyCombo::parse("ctrl+banana"),
            Err(HotkeyError::UnknownKey("banana".into()))
        );
        assert!(HotkeyCombo::parse("win+f13").is_err());
    }

    #[test]
    fn invalid_setting_falls_back_to_default() {
        assert_eq!(HotkeyCombo::from_setting("alt+"), HotkeyCombo::default());
        assert_eq!(
            HotkeyCombo::from_setting("win+space").key,
            Key::Space
        );
    }

    #[test]
    fn virtual_keys_map_to_keys() {
        assert_eq!(Key::from_virtual_key(0x4D), Some(Key::Char('m')));
        assert_eq!(Key::from_virtual_key(0x37), Some(Key::Char('7')));
        assert_eq!(Key::from_virtual_key(0x78), Some(Key::Function(9)));
        assert_eq!(Key::from_virtual_key(0x7B), Some(Key::Function(12)));
        assert_eq!(Key::from_virtual_key(0x26), Some(Key::Up));
        // Shift, Ctrl, Alt and the Windows keys are not main keys.
        for vk in [0x10, 0x11, 0x12, 0x5B, 0xA2] {
            assert_eq!(Key::from_virtual_key(vk), None);
        }
    }

    #[test]
    fn capture_waits_for_main_key() {
        let ctrl_alt = HeldModifiers {
            ctrl: true,
            alt: true,
            ..HeldModifiers::default()
        };

        assert_eq!(capture_step(0x11, ctrl_alt), CaptureStep::Waiting);
        assert_eq!(
            capture_step(0x4B, ctrl_alt),
            CaptureStep::Captured(HotkeyCombo::parse("ctrl+alt+k").unwrap())
        );
    }

    #[test]
    fn capture_cancel_and_bare_keys() {
        let none = HeldModifiers::default();

        assert_eq!(capture_step(0x1B, none), CaptureStep::Cancelled);
        // A plain letter would break typing everywhere.
        assert_eq!(capture_step(0x41, none), CaptureStep::Waiting);
        assert_eq!(
            capture_step(0x13, none),
            CaptureStep::Captured(HotkeyCombo::parse("pause").unwrap())
        );

        let shift = HeldModifiers {
            shift: true,
            ..HeldModifiers::default()
        };
        assert_eq!(
            capture_step(0x1B, shift),
            CaptureStep::Captured(HotkeyCombo::parse("shift+esc").unwrap())
        );
    }
}
