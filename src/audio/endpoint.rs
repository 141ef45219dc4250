//! Core Audio backend for the default capture endpoint.
//!
//! Provides COM initialization and mute control through
//! IAudioEndpointVolume.

use super::device::{AudioBackend, DeviceError};
use std::cell::RefCell;
use windows::Win32::Devices::Properties::DEVPKEY_Device_FriendlyName;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
use windows::Win32::Media::Audio::{
    eCapture, eMultimedia, IMMDevice, IMMDeviceEnumerator, MMDeviceEnumerator,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_MULTITHREADED, STGM,
};
use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PROPERTYKEY};

/// COM initialization guard that uninitializes COM on drop.
struct ComGuard {
    initialized: bool,
}

impl ComGuard {
    /// Join the multithreaded apartment for the current thread.
    fn new() -> Result<Self, DeviceError> {
        unsafe {
            let hr = CoInitializeEx(None, COINIT_MULTITHREADED);
            if hr == RPC_E_CHANGED_MODE {
                // Thread already lives in a single-threaded apartment.
                return Ok(Self { initialized: false });
            }
            hr.ok().map_err(DeviceError::ComInitFailed)?;
        }
        Ok(Self { initialized: true })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

thread_local! {
    static COM: RefCell<Option<ComGuard>> = const { RefCell::new(None) };
}

fn ensure_com() -> Result<(), DeviceError> {
    COM.with(|com| {
        let mut com = com.borrow_mut();
        if com.is_none() {
            *com = Some(ComGuard::new()?);
        }
        Ok(())
    })
}

/// Acquired endpoint volume interface.
pub struct EndpointHandle {
    volume: IAudioEndpointVolume,
}

// Endpoint volume objects are created in the multithreaded apartment and
// are free-threaded; the controller only touches them under its apply guard.
unsafe impl Send for EndpointHandle {}

/// Backend bound to the default multimedia capture endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasapiBackend;

impl WasapiBackend {
    pub fn new() -> Self {
        Self
    }

    /// Get the friendly name of a device from its property store.
    fn device_name(device: &IMMDevice) -> Option<String> {
        unsafe {
            let props: IPropertyStore = device.OpenPropertyStore(STGM(0)).ok()?;

            // Convert DEVPROPKEY to PROPERTYKEY
            let key = PROPERTYKEY {
                fmtid: DEVPKEY_Device_FriendlyName.fmtid,
                pid: DEVPKEY_Device_FriendlyName.pid,
            };

            let prop = props.GetValue(&key).ok()?;
            let s = prop.to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        }
    }
}

impl AudioBackend for WasapiBackend {
    type Handle = EndpointHandle;

    fn connect(&self) -> Result<EndpointHandle, DeviceError> {
        ensure_com()?;

        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(|e| DeviceError::Unavailable(format!("MMDeviceEnumerator: {e}")))?;

            let device = enumerator
                .GetDefaultAudioEndpoint(eCapture, eMultimedia)
                .map_err(|e| DeviceError::Unavailable(format!("GetDefaultAudioEndpoint: {e}")))?;

            let volume: IAudioEndpointVolume = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| DeviceError::Unavailable(format!("IAudioEndpointVolume: {e}")))?;

            let name = Self::device_name(&device).unwrap_or_else(|| "Unknown".to_string());
            tracing::debug!(device = %name, "Acquired capture endpoint");

            Ok(EndpointHandle { volume })
        }
    }

    fn get_mute(&self, handle: &EndpointHandle) -> Result<bool, DeviceError> {
        unsafe {
            let muted = handle
                .volume
                .GetMute()
                .map_err(|e| DeviceError::CallFailed(format!("GetMute: {e}")))?;
            Ok(muted.as_bool())
        }
    }

    fn set_mute(&self, handle: &EndpointHandle, muted: bool) -> Result<(), DeviceError> {
        unsafe {
            handle
                .volume
                .SetMute(muted, std::ptr::null())
                .map_err(|e| DeviceError::CallFailed(format!("SetMute: {e}")))?;
            Ok(())
        }
    }
}
