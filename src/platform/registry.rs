//! "Start with Windows" through the per-user Run key.

use thiserror::Error;
use windows::core::PCWSTR;
use windows::Win32::Foundation::ERROR_FILE_NOT_FOUND;
use windows::Win32::System::Registry::{
    RegCloseKey, RegDeleteValueW, RegOpenKeyExW, RegQueryValueExW, RegSetValueExW, HKEY,
    HKEY_CURRENT_USER, KEY_READ, KEY_WRITE, REG_SAM_FLAGS, REG_SZ,
};

/// Autostart error types.
#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("Failed to access registry: {0}")]
    RegistryAccess(String),

    #[error("Failed to write preference: {key}")]
    WriteFailed { key: String },
}

/// Reads and writes the `MicMuteApp` value under
/// `HKCU\Software\Microsoft\Windows\CurrentVersion\Run`.
pub struct Autostart {
    run_key_path: Vec<u16>,
    value_name: Vec<u16>,
}

impl Autostart {
    const RUN_KEY: &'static str = r"Software\Microsoft\Windows\CurrentVersion\Run";
    const APP_NAME: &'static str = "MicMuteApp";

    pub fn new() -> Self {
        Self {
            run_key_path: to_wide(Self::RUN_KEY),
            value_name: to_wide(Self::APP_NAME),
        }
    }

    /// Whether the Run value exists.
    pub fn is_enabled(&self) -> bool {
        unsafe {
            let Some(hkey) = self.open_run_key(KEY_READ) else {
                return false;
            };

            let mut data_size = 0u32;
            let result = RegQueryValueExW(
                hkey,
                PCWSTR::from_raw(self.value_name.as_ptr()),
                None,
                None,
                None,
                Some(&mut data_size),
            );

            let _ = RegCloseKey(hkey);

            result.is_ok() && data_size > 0
        }
    }

    /// Write the current executable path to the Run key, or remove it.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), PreferencesError> {
        let exe_path = if enabled {
            let path = std::env::current_exe().map_err(|e| {
                PreferencesError::RegistryAccess(format!("Executable path unavailable: {e}"))
            })?;
            // Quoted so paths with spaces survive the shell.
            Some(to_wide(&format!("\"{}\"", path.to_string_lossy())))
        } else {
            None
        };

        unsafe {
            let hkey = self.open_run_key(KEY_WRITE).ok_or_else(|| {
                PreferencesError::RegistryAccess("Failed to open Run key".to_string())
            })?;

            let result = match &exe_path {
                Some(wide) => RegSetValueExW(
                    hkey,
                    PCWSTR::from_raw(self.value_name.as_ptr()),
                    0,
                    REG_SZ,
                    Some(std::slice::from_raw_parts(
                        wide.as_ptr() as *const u8,
                        wide.len() * 2,
                    )),
                ),
                None => RegDeleteValueW(hkey, PCWSTR::from_raw(self.value_name.as_ptr())),
            };

            let _ = RegCloseKey(hkey);

            // Removing a value that was never written is fine.
            if result.is_err() && !(exe_path.is_none() && result == ERROR_FILE_NOT_FOUND) {
                return Err(PreferencesError::WriteFailed {
                    key: Self::APP_NAME.to_string(),
                });
            }
        }

        tracing::info!(enabled, "Start with Windows updated");
        Ok(())
    }

    unsafe fn open_run_key(&self, access: REG_SAM_FLAGS) -> Option<HKEY> {
        let mut hkey = HKEY::default();
        let result = RegOpenKeyExW(
            HKEY_CURRENT_USER,
            PCWSTR::from_raw(self.run_key_path.as_ptr()),
            0,
            access,
            &mut hkey,
        );
        result.is_ok().then_some(hkey)
    }
}

impl Default for Autostart {
    fn default() -> Self {
        Self::new()
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}
