//! Generated tray and overlay artwork.
//!
//! Everything here produces straight RGBA buffers so it can be handed to
//! `tray_icon::Icon::from_rgba` or blitted into a layered window.

/// Tray icon size in pixels.
pub const ICON_SIZE: u32 = 32;

/// Which picture to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IconKind {
    /// Green disc, microphone live.
    Live,
    /// Red disc with a strike-through.
    Muted,
    /// Grey disc, device missing or toggle failed.
    Error,
}

impl IconKind {
    fn fill(&self) -> (u8, u8, u8) {
        match self {
            IconKind::Live => (60, 180, 60),
            IconKind::Muted => (220, 60, 60),
            IconKind::Error => (128, 128, 128),
        }
    }
}

/// Square RGBA image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rgba {
    pub size: u32,
    pub pixels: Vec<u8>,
}

impl Rgba {
    fn blank(size: u32) -> Self {
        Self {
            size,
            pixels: vec![0u8; (size * size * 4) as usize],
        }
    }

    fn put(&mut self, x: usize, y: usize, (r, g, b): (u8, u8, u8), a: u8) {
        let size = self.size as usize;
        if x < size && y < size {
            let idx = (y * size + x) * 4;
            self.pixels[idx..idx + 4].copy_from_slice(&[r, g, b, a]);
        }
    }

    fn alpha(&self, x: usize, y: usize) -> u8 {
        self.pixels[(y * self.size as usize + x) * 4 + 3]
    }

    /// Pixel at `(x, y)` as `[r, g, b, a]`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * self.size + x) * 4) as usize;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }
}

/// Tray icon for a given state.
pub fn tray_icon(kind: IconKind) -> Rgba {
    let mut img = Rgba::blank(ICON_SIZE);
    let size = ICON_SIZE as usize;
    draw_disc(&mut img, kind.fill());
    draw_microphone_shape(&mut img, size, (255, 255, 255));
    if kind == IconKind::Muted {
        draw_strike_through(&mut img, size);
    }
    img
}

/// Overlay badge: red microphone with a white strike on a transparent
/// background, scaled to `size`.
pub fn overlay_badge(size: u32) -> Rgba {
    let mut img = Rgba::blank(size.max(8));
    let size = img.size as usize;
    draw_microphone_shape(&mut img, size, (255, 0, 0));
    draw_strike_through(&mut img, size);
    img
}

fn draw_disc(img: &mut Rgba, color: (u8, u8, u8)) {
    let size = img.size as usize;
    let center = size as f32 / 2.0;
    let radius = size as f32 / 2.0 - 3.0;

    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            let dist = (dx * dx + dy * dy).sqrt();

            if dist < radius {
                img.put(x, y, color, 255);
            } else if dist < radius + 1.0 {
                // Anti-aliased edge
                img.put(x, y, color, ((radius + 1.0 - dist) * 255.0) as u8);
            }
        }
    }
}

/// Capsule body plus a short stand. Painted over whatever is underneath
/// when the canvas is transparent, otherwise only over opaque pixels.
fn draw_microphone_shape(img: &mut Rgba, size: usize, color: (u8, u8, u8)) {
    let center_x = size / 2;
    let transparent_canvas = img.alpha(center_x, size / 2) == 0;

    let body_width = (size / 4).max(2);
    let body_height = size / 2;
    let body_top = size / 4;

    let paint = |img: &mut Rgba, x: usize, y: usize| {
        if transparent_canvas || img.alpha(x, y) > 0 {
            img.put(x, y, color, 255);
        }
    };

    for y in body_top..(body_top + body_height) {
        for x in (center_x - body_width / 2)..(center_x + body_width / 2) {
            paint(img, x, y);
        }
    }

    let stand_y = body_top + body_height;
    for y in stand_y..(stand_y + 3).min(size) {
        paint(img, center_x, y);
    }
}

fn draw_strike_through(img: &mut Rgba, size: usize) {
    let thickness = (size / 16).max(2);
    for i in 4..size.saturating_sub(4) {
        for t in 0..thickness {
            img.put(i, i + t, (255, 255, 255), 255);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tray_icons_have_distinct_fills() {
        // A point inside the disc but clear of the microphone and strike.
        let sample = |kind| tray_icon(kind).pixel(6, 16);
        assert_eq!(sample(IconKind::Live), [60, 180, 60, 255]);
        assert_eq!(sample(IconKind::Muted), [220, 60, 60, 255]);
        assert_eq!(sample(IconKind::Error), [128, 128, 128, 255]);
    }

    #[test]
    fn only_muted_icon_is_struck_through() {
        assert_eq!(tray_icon(IconKind::Muted).pixel(5, 5), [255, 255, 255, 255]);
        assert_ne!(tray_icon(IconKind::Live).pixel(5, 5), [255, 255, 255, 255]);
    }

    #[test]
    fn overlay_badge_matches_requested_size() {
        for size in [32, 48, 64] {
            let badge = overlay_badge(size);
            assert_eq!(badge.size, size);
            assert_eq!(badge.pixels.len(), (size * size * 4) as usize);
            // Corners stay transparent.
            assert_eq!(badge.pixel(0, size - 1)[3], 0);
            assert_eq!(badge.pixel(size / 2, size / 2 - 2), [255, 0, 0, 255]);
        }
    }
}
