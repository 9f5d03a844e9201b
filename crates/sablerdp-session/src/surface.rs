//! The live raster surface: a raw desktop buffer as delivered by the
//! server, and a lazily composited buffer with the pointer drawn on top.

use std::time::{Duration, Instant};

use sablerdp_graphics::color_conversion;
use sablerdp_graphics::image_processing::RgbImage;
use sablerdp_graphics::pointer::{default_arrow_pointer, DecodedPointer};
use sablerdp_graphics::rle::RlePixelFormat;
use sablerdp_pdu::geometry::InclusiveRectangle;

/// Counters exposed through the pipeline statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    pub bitmaps_applied: u64,
    pub bitmaps_skipped: u64,
    pub pointer_updates: u64,
    pub pointer_updates_throttled: u64,
}

/// Dual-buffer surface per the display model: `raw` holds the desktop
/// pixels, `final` adds the pointer and is regenerated only when read after
/// a change.
///
/// The surface itself is not synchronized; the owner serializes access
/// through one lock, so a screenshot never observes a partial paste.
pub struct DisplaySurface {
    raw: RgbImage,
    composited: RgbImage,
    composited_dirty: bool,

    pointer_x: u16,
    pointer_y: u16,
    pointer_visible: bool,
    pointer: Option<DecodedPointer>,
    default_pointer: DecodedPointer,
    last_pointer_update: Option<Instant>,
    pointer_update_interval: Duration,

    stats: SurfaceStats,
}

impl DisplaySurface {
    /// `fps` caps position-only pointer updates.
    pub fn new(width: u16, height: u16, fps: u32) -> Self {
        Self {
            raw: RgbImage::new(usize::from(width), usize::from(height)),
            composited: RgbImage::new(usize::from(width), usize::from(height)),
            composited_dirty: true,
            pointer_x: 0,
            pointer_y: 0,
            pointer_visible: true,
            pointer: None,
            default_pointer: default_arrow_pointer(),
            last_pointer_update: None,
            pointer_update_interval: Duration::from_secs(1) / fps.max(1),
            stats: SurfaceStats::default(),
        }
    }

    pub fn width(&self) -> u16 {
        self.raw.width() as u16
    }

    pub fn height(&self) -> u16 {
        self.raw.height() as u16
    }

    pub fn stats(&self) -> SurfaceStats {
        self.stats
    }

    /// Applies one decoded bitmap rectangle.
    ///
    /// `data` is in the server's native byte order for `bits_per_pixel`
    /// (BGR/BGRX/BGR16/RGB555) and bottom-up in row order; the paste flips
    /// it vertically. Decode failures were already skipped by the caller;
    /// this reports size mismatches the same way: skip and count.
    pub fn apply_bitmap(&mut self, rectangle: &InclusiveRectangle, bits_per_pixel: u16, data: &[u8]) {
        let width = usize::from(rectangle.width());
        let height = usize::from(rectangle.height());

        let mut rgb = Vec::new();
        let rgb: &[u8] = match bits_per_pixel {
            32 => {
                color_conversion::buffer_bgrx32_to_rgb24(data, &mut rgb);
                &rgb
            }
            24 => {
                color_conversion::buffer_bgr24_to_rgb24(data, &mut rgb);
                &rgb
            }
            16 => {
                color_conversion::buffer_16bit_to_rgb24(data, &mut rgb);
                &rgb
            }
            15 => {
                color_conversion::buffer_15bit_to_rgb24(data, &mut rgb);
                &rgb
            }
            8 => {
                // Palettized sessions are not negotiated by this client.
                warn!("Skipping 8-bpp bitmap update (no palette support)");
                self.stats.bitmaps_skipped += 1;
                return;
            }
            other => {
                warn!(bits_per_pixel = other, "Skipping bitmap update with unsupported depth");
                self.stats.bitmaps_skipped += 1;
                return;
            }
        };

        match self
            .raw
            .paste_rgb24_bottom_up(usize::from(rectangle.left), usize::from(rectangle.top), width, height, rgb)
        {
            Ok(()) => {
                self.stats.bitmaps_applied += 1;
                self.composited_dirty = true;
            }
            Err(error) => {
                // A malformed rectangle only loses itself, not the session.
                warn!(%error, "Skipping bitmap update");
                self.stats.bitmaps_skipped += 1;
            }
        }
    }

    /// Converts an RLE decoder result into an apply.
    pub fn apply_decompressed_bitmap(
        &mut self,
        rectangle: &InclusiveRectangle,
        format: RlePixelFormat,
        data: &[u8],
    ) {
        let bits_per_pixel = match format {
            RlePixelFormat::Rgb24 => 24,
            RlePixelFormat::Rgb16 => 16,
            RlePixelFormat::Rgb15 => 15,
            RlePixelFormat::Rgb8 => 8,
        };

        self.apply_bitmap(rectangle, bits_per_pixel, data);
    }

    /// Moves the pointer; position-only updates are throttled to the
    /// capture rate. Returns whether the update was applied.
    pub fn update_pointer_position(&mut self, x: u16, y: u16) -> bool {
        let now = Instant::now();

        if let Some(last) = self.last_pointer_update {
            // At exactly one interval the update passes.
            if now.duration_since(last) < self.pointer_update_interval {
                self.stats.pointer_updates_throttled += 1;
                return false;
            }
        }

        self.pointer_x = x;
        self.pointer_y = y;
        self.last_pointer_update = Some(now);
        self.composited_dirty = true;
        self.stats.pointer_updates += 1;
        true
    }

    /// Installs a server-delivered cursor bitmap.
    pub fn update_pointer_bitmap(&mut self, pointer: DecodedPointer) {
        self.pointer = Some(pointer);
        self.composited_dirty = true;
        self.stats.pointer_updates += 1;
    }

    /// Reverts to the built-in arrow cursor.
    pub fn set_default_pointer(&mut self) {
        self.pointer = None;
        self.composited_dirty = true;
        self.stats.pointer_updates += 1;
    }

    pub fn set_pointer_visible(&mut self, visible: bool) {
        if self.pointer_visible != visible {
            self.pointer_visible = visible;
            self.composited_dirty = true;
        }
        self.stats.pointer_updates += 1;
    }

    pub fn pointer_position(&self) -> (u16, u16) {
        (self.pointer_x, self.pointer_y)
    }

    pub fn pointer_visible(&self) -> bool {
        self.pointer_visible
    }

    /// The composited surface, regenerated only when stale.
    pub fn composited(&mut self) -> &RgbImage {
        if self.composited_dirty {
            self.regenerate_composited();
        }

        &self.composited
    }

    /// A consistent snapshot of the composited surface.
    pub fn screenshot(&mut self) -> RgbImage {
        self.composited().clone()
    }

    /// The raw desktop, without the pointer.
    pub fn raw(&self) -> &RgbImage {
        &self.raw
    }

    fn regenerate_composited(&mut self) {
        self.composited.copy_from(&self.raw);

        if self.pointer_visible {
            let pointer = self.pointer.as_ref().unwrap_or(&self.default_pointer);

            let x = self.pointer_x as isize - pointer.hotspot_x as isize;
            let y = self.pointer_y as isize - pointer.hotspot_y as isize;

            self.composited
                .blend_rgba(x, y, pointer.width, pointer.height, &pointer.rgba_data);
        }

        self.composited_dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red_rect_bgrx(width: usize, height: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&[0x00, 0x00, 0xFF, 0x00]); // BGRX red
        }
        data
    }

    #[test]
    fn bitmap_apply_updates_the_covered_pixels() {
        let mut surface = DisplaySurface::new(64, 64, 30);

        surface.apply_bitmap(
            &InclusiveRectangle {
                left: 5,
                top: 5,
                right: 14,
                bottom: 14,
            },
            32,
            &red_rect_bgrx(10, 10),
        );

        assert_eq!(surface.stats().bitmaps_applied, 1);
        assert_eq!(surface.raw().pixel(7, 7), Some([255, 0, 0]));
        assert_eq!(surface.raw().pixel(4, 4), Some([0, 0, 0]));
    }

    #[test]
    fn latest_update_wins_per_pixel() {
        let mut surface = DisplaySurface::new(32, 32, 30);

        surface.apply_bitmap(
            &InclusiveRectangle {
                left: 0,
                top: 0,
                right: 9,
                bottom: 9,
            },
            32,
            &red_rect_bgrx(10, 10),
        );

        // A green rectangle overlapping the red one.
        let mut green = Vec::new();
        for _ in 0..25 {
            green.extend_from_slice(&[0x00, 0xFF, 0x00, 0x00]);
        }
        surface.apply_bitmap(
            &InclusiveRectangle {
                left: 5,
                top: 5,
                right: 9,
                bottom: 9,
            },
            32,
            &green,
        );

        assert_eq!(surface.raw().pixel(7, 7), Some([0, 255, 0]));
        assert_eq!(surface.raw().pixel(2, 2), Some([255, 0, 0]));
    }

    #[test]
    fn malformed_rectangle_is_skipped_not_fatal() {
        let mut surface = DisplaySurface::new(16, 16, 30);

        // Destination exceeds the surface.
        surface.apply_bitmap(
            &InclusiveRectangle {
                left: 10,
                top: 10,
                right: 25,
                bottom: 25,
            },
            32,
            &red_rect_bgrx(16, 16),
        );

        assert_eq!(surface.stats().bitmaps_applied, 0);
        assert_eq!(surface.stats().bitmaps_skipped, 1);
    }

    #[test]
    fn screenshot_composites_the_default_pointer() {
        let mut surface = DisplaySurface::new(64, 64, 30);
        surface.update_pointer_position(10, 10);

        let screenshot = surface.screenshot();
        // The arrow's outline pixel lands on the hotspot position.
        assert_eq!(screenshot.pixel(10, 10), Some([0, 0, 0]));
        // The raw buffer stays pointer-free.
        assert_eq!(surface.raw().pixel(10, 10), Some([0, 0, 0]));
    }

    #[test]
    fn hidden_pointer_is_not_composited() {
        let mut surface = DisplaySurface::new(64, 64, 30);

        surface.apply_bitmap(
            &InclusiveRectangle {
                left: 0,
                top: 0,
                right: 63,
                bottom: 63,
            },
            32,
            &red_rect_bgrx(64, 64),
        );
        surface.update_pointer_position(10, 10);
        surface.set_pointer_visible(false);

        let screenshot = surface.screenshot();
        assert_eq!(screenshot.pixel(10, 10), Some([255, 0, 0]));
    }

    #[test]
    fn position_updates_are_throttled_to_the_frame_rate() {
        let mut surface = DisplaySurface::new(64, 64, 30);

        assert!(surface.update_pointer_position(1, 1));
        // Immediately after, the next position-only update is dropped.
        assert!(!surface.update_pointer_position(2, 2));
        assert_eq!(surface.pointer_position(), (1, 1));
        assert_eq!(surface.stats().pointer_updates_throttled, 1);
    }

    #[test]
    fn composited_is_lazy() {
        let mut surface = DisplaySurface::new(8, 8, 30);

        let _ = surface.composited();
        assert!(!surface.composited_dirty);

        surface.apply_bitmap(
            &InclusiveRectangle {
                left: 0,
                top: 0,
                right: 0,
                bottom: 0,
            },
            32,
            &red_rect_bgrx(1, 1),
        );
        assert!(surface.composited_dirty);
    }
}
