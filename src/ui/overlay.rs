//! On-screen muted indicator.
//!
//! The observer only decides visibility: shown while muted, hidden when the
//! microphone is live and on any error. The Windows surface is a topmost,
//! click-through layered popup holding the overlay badge.

use super::UiUpdate;
use crate::observer::{MicStatus, MuteObserver, ObserverError};
use crate::platform::OverlayPosition;
use std::sync::mpsc::Sender;

/// Top-left corner of a `size`-pixel square placed at `position` on a
/// `screen_width` x `screen_height` screen, `margin` pixels from the edges.
pub fn overlay_origin(
    position: OverlayPosition,
    screen_width: i32,
    screen_height: i32,
    size: u32,
    margin: u32,
) -> (i32, i32) {
    let size = size as i32;
    let margin = margin as i32;

    let left = margin;
    let center_x = (screen_width - size) / 2;
    let right = screen_width - size - margin;
    let top = margin;
    let center_y = (screen_height - size) / 2;
    let bottom = screen_height - size - margin;

    match position {
        OverlayPosition::TopLeft => (left, top),
        OverlayPosition::TopMid => (center_x, top),
        OverlayPosition::TopRight => (right, top),
        OverlayPosition::MiddleLeft => (left, center_y),
        OverlayPosition::MiddleRight => (right, center_y),
        OverlayPosition::BottomLeft => (left, bottom),
        OverlayPosition::BottomMid => (center_x, bottom),
        OverlayPosition::BottomRight => (right, bottom),
    }
}

/// Forwards overlay visibility to the UI thread.
pub struct OverlayObserver {
    updates: Sender<UiUpdate>,
}

impl OverlayObserver {
    pub fn new(updates: Sender<UiUpdate>) -> Self {
        Self { updates }
    }
}

impl MuteObserver for OverlayObserver {
    fn name(&self) -> &str {
        "overlay"
    }

    fn on_status(&mut self, status: MicStatus) -> Result<(), ObserverError> {
        let visible = status == MicStatus::Muted;
        self.updates
            .send(UiUpdate::Overlay { visible })
            .map_err(|_| ObserverError::Disconnected {
                observer: self.name().to_string(),
            })
    }
}

#[cfg(windows)]
pub use window::OverlayWindow;

#[cfg(windows)]
mod window {
    use super::overlay_origin;
    use crate::platform::{icons, OverlayPosition, Settings};
    use std::ffi::c_void;
    use windows::core::{w, Result};
    use windows::Win32::Foundation::{COLORREF, HANDLE, HWND, LPARAM, LRESULT, POINT, SIZE, WPARAM};
    use windows::Win32::Graphics::Gdi::{
        CreateCompatibleDC, CreateDIBSection, DeleteDC, DeleteObject, GetDC, ReleaseDC,
        SelectObject, AC_SRC_ALPHA, AC_SRC_OVER, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
        BLENDFUNCTION, DIB_RGB_COLORS,
    };
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::{
        CreateWindowExW, DefWindowProcW, DestroyWindow, GetSystemMetrics, RegisterClassExW,
        ShowWindow, UpdateLayeredWindow, SM_CXSCREEN, SM_CYSCREEN, SW_HIDE, SW_SHOWNOACTIVATE,
        ULW_ALPHA, WNDCLASSEXW, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW,
        WS_EX_TOPMOST, WS_EX_TRANSPARENT, WS_POPUP,
    };

    unsafe extern "system" fn overlay_proc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        DefWindowProcW(hwnd, msg, wparam, lparam)
    }

    /// Layered popup showing the muted badge.
    pub struct OverlayWindow {
        hwnd: HWND,
        position: OverlayPosition,
        size: u32,
        margin: u32,
        opacity: f32,
        visible: bool,
    }

    impl OverlayWindow {
        pub fn new(settings: &Settings) -> Result<Self> {
            unsafe {
                let instance = GetModuleHandleW(None)?;
                let class_name = w!("MicMuteOverlay");

                let wc = WNDCLASSEXW {
                    cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                    lpfnWndProc: Some(overlay_proc),
                    hInstance: instance.into(),
                    lpszClassName: class_name,
                    ..Default::default()
                };
                RegisterClassExW(&wc);

                let size = settings.overlay_size_px() as i32;
                let hwnd = CreateWindowExW(
                    WS_EX_LAYERED
                        | WS_EX_TRANSPARENT
                        | WS_EX_TOPMOST
                        | WS_EX_TOOLWINDOW
                        | WS_EX_NOACTIVATE,
                    class_name,
                    w!("Mic Mute Overlay"),
                    WS_POPUP,
                    0,
                    0,
                    size,
                    size,
                    None,
                    None,
                    instance,
                    None,
                )?;

                let window = Self {
                    hwnd,
                    position: settings.position(),
                    size: settings.overlay_size_px(),
                    margin: settings.overlay_margin,
                    opacity: settings.overlay_opacity,
                    visible: false,
                };
                window.render()?;
                Ok(window)
            }
        }

        /// Take new placement, size and opacity from `settings` and redraw.
        pub fn reconfigure(&mut self, settings: &Settings) {
            self.position = settings.position();
            self.size = settings.overlay_size_px();
            self.margin = settings.overlay_margin;
            self.opacity = settings.overlay_opacity;
            if let Err(e) = unsafe { self.render() } {
                tracing::warn!(error = %e, "Failed to redraw overlay");
            }
            tracing::debug!(position = ?self.position, size = self.size, "Overlay reconfigured");
        }

        pub fn set_visible(&mut self, visible: bool) {
            if visible == self.visible {
                return;
            }
            unsafe {
                if visible {
                    // Placement follows the current screen size.
                    if let Err(e) = self.render() {
                        tracing::warn!(error = %e, "Failed to draw overlay");
                    }
                    let _ = ShowWindow(self.hwnd, SW_SHOWNOACTIVATE);
                } else {
                    let _ = ShowWindow(self.hwnd, SW_HIDE);
                }
            }
            self.visible = visible;
            tracing::debug!(visible, "Overlay visibility changed");
        }

        /// Draw the badge into the layered window at its configured spot.
        unsafe fn render(&self) -> Result<()> {
            let badge = icons::overlay_badge(self.size);
            let size = badge.size as i32;
            let (x, y) = overlay_origin(
                self.position,
                GetSystemMetrics(SM_CXSCREEN),
                GetSystemMetrics(SM_CYSCREEN),
                badge.size,
                self.margin,
            );

            let screen_dc = GetDC(None);
            let mem_dc = CreateCompatibleDC(screen_dc);

            let info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: size,
                    // Negative height gives a top-down bitmap.
                    biHeight: -size,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };

            let mut bits: *mut c_void = std::ptr::null_mut();
            let bitmap =
                match CreateDIBSection(mem_dc, &info, DIB_RGB_COLORS, &mut bits, HANDLE::default(), 0) {
                    Ok(bitmap) => bitmap,
                    Err(e) => {
                        let _ = DeleteDC(mem_dc);
                        ReleaseDC(None, screen_dc);
                        return Err(e);
                    }
                };

            // Layered windows take premultiplied BGRA.
            let dst = std::slice::from_raw_parts_mut(bits as *mut u8, badge.pixels.len());
            for (d, s) in dst.chunks_exact_mut(4).zip(badge.pixels.chunks_exact(4)) {
                let a = s[3] as u16;
                d[0] = (s[2] as u16 * a / 255) as u8;
                d[1] = (s[1] as u16 * a / 255) as u8;
                d[2] = (s[0] as u16 * a / 255) as u8;
                d[3] = s[3];
            }

            let old_bitmap = SelectObject(mem_dc, bitmap);

            let origin = POINT { x, y };
            let extent = SIZE { cx: size, cy: size };
            let source = POINT::default();
            let blend = BLENDFUNCTION {
                BlendOp: AC_SRC_OVER as u8,
                BlendFlags: 0,
                SourceConstantAlpha: (self.opacity.clamp(0.0, 1.0) * 255.0).round() as u8,
                AlphaFormat: AC_SRC_ALPHA as u8,
            };

            let result = UpdateLayeredWindow(
                self.hwnd,
                screen_dc,
                Some(&origin),
                Some(&extent),
                mem_dc,
                Some(&source),
                COLORREF(0),
                Some(&blend),
                ULW_ALPHA,
            );

            SelectObject(mem_dc, old_bitmap);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            ReleaseDC(None, screen_dc);

            result
        }
    }

    impl Drop for OverlayWindow {
        fn drop(&mut self) {
            unsafe {
                let _ = DestroyWindow(self.hwnd);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn placement_for_every_position() {
        let at = |p| overlay_origin(p, 1920, 1080, 48, 10);

        assert_eq!(at(OverlayPosition::TopLeft), (10, 10));
        assert_eq!(at(OverlayPosition::TopMid), (936, 10));
        assert_eq!(at(OverlayPosition::TopRight), (1862, 10));
        assert_eq!(at(OverlayPosition::MiddleLeft), (10, 516));
        assert_eq!(at(OverlayPosition::MiddleRight), (1862, 516));
        assert_eq!(at(OverlayPosition::BottomLeft), (10, 1022));
        assert_eq!(at(OverlayPosition::BottomMid), (936, 1022));
        assert_eq!(at(OverlayPosition::BottomRight), (1862, 1022));
    }

    #[test]
    fn unknown_position_lands_top_mid() {
        let position = OverlayPosition::from_label("Nowhere");
        assert_eq!(overlay_origin(position, 1280, 720, 32, 0), (624, 0));
    }

    #[test]
    fn visible_only_while_muted() {
        let (tx, rx) = channel();
        let mut overlay = OverlayObserver::new(tx);

        for status in [
            MicStatus::Muted,
            MicStatus::Unmuted,
            MicStatus::Muted,
            MicStatus::NoDevice,
            MicStatus::ToggleFailed,
        ] {
            overlay.on_status(status).unwrap();
        }

        let visible: Vec<_> = rx
            .try_iter()
            .map(|u| matches!(u, UiUpdate::Overlay { visible: true }))
            .collect();
        assert_eq!(visible, vec![true, false, true, false, false]);
    }
}
