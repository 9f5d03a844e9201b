//! In-memory RGB24 image with the region operations the display surface
//! needs: paste (with vertical flip), pixel access, and alpha blending for
//! pointer composition.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("source data is {actual} bytes, expected {expected} for {width}x{height} at {bytes_per_pixel} bytes per pixel")]
    SourceSizeMismatch {
        actual: usize,
        expected: usize,
        width: usize,
        height: usize,
        bytes_per_pixel: usize,
    },
    #[error("destination region ({x}, {y}) {width}x{height} does not fit a {dst_width}x{dst_height} image")]
    RegionOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        dst_width: usize,
        dst_height: usize,
    },
}

/// A packed RGB24 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl RgbImage {
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Creates a black image.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * Self::BYTES_PER_PIXEL],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let offset = (y * self.width + x) * Self::BYTES_PER_PIXEL;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }

    /// Copies the whole of `src` over this image. Both must have identical
    /// dimensions; used to refresh the composited buffer from the raw one.
    pub fn copy_from(&mut self, src: &RgbImage) {
        debug_assert_eq!(self.width, src.width);
        debug_assert_eq!(self.height, src.height);
        self.data.copy_from_slice(&src.data);
    }

    /// Pastes packed RGB24 rows at `(x, y)`, top-down row order.
    pub fn paste_rgb24(&mut self, x: usize, y: usize, width: usize, height: usize, src: &[u8]) -> Result<(), ImageError> {
        self.check_paste(x, y, width, height, src.len())?;

        for row in 0..height {
            let src_start = row * width * Self::BYTES_PER_PIXEL;
            let dst_start = ((y + row) * self.width + x) * Self::BYTES_PER_PIXEL;
            self.data[dst_start..dst_start + width * Self::BYTES_PER_PIXEL]
                .copy_from_slice(&src[src_start..src_start + width * Self::BYTES_PER_PIXEL]);
        }

        Ok(())
    }

    /// Pastes packed RGB24 rows at `(x, y)`, flipping vertically: the first
    /// source row lands at the bottom of the destination region, matching
    /// the bottom-up ordering of RDP bitmap data.
    pub fn paste_rgb24_bottom_up(
        &mut self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        src: &[u8],
    ) -> Result<(), ImageError> {
        self.check_paste(x, y, width, height, src.len())?;

        for row in 0..height {
            let src_start = row * width * Self::BYTES_PER_PIXEL;
            let dst_row = y + height - 1 - row;
            let dst_start = (dst_row * self.width + x) * Self::BYTES_PER_PIXEL;
            self.data[dst_start..dst_start + width * Self::BYTES_PER_PIXEL]
                .copy_from_slice(&src[src_start..src_start + width * Self::BYTES_PER_PIXEL]);
        }

        Ok(())
    }

    /// Alpha-blends an RGBA bitmap at `(x, y)`, clipping to the image.
    ///
    /// Used for pointer composition; coordinates may be negative when the
    /// hotspot pushes the cursor over the edge.
    pub fn blend_rgba(&mut self, x: isize, y: isize, width: usize, height: usize, src: &[u8]) {
        debug_assert_eq!(src.len(), width * height * 4);

        for row in 0..height {
            let dst_y = y + row as isize;
            if dst_y < 0 || dst_y >= self.height as isize {
                continue;
            }

            for col in 0..width {
                let dst_x = x + col as isize;
                if dst_x < 0 || dst_x >= self.width as isize {
                    continue;
                }

                let src_offset = (row * width + col) * 4;
                let alpha = u32::from(src[src_offset + 3]);
                if alpha == 0 {
                    continue;
                }

                let dst_offset = (dst_y as usize * self.width + dst_x as usize) * Self::BYTES_PER_PIXEL;

                for channel in 0..3 {
                    let src_value = u32::from(src[src_offset + channel]);
                    let dst_value = u32::from(self.data[dst_offset + channel]);
                    self.data[dst_offset + channel] =
                        ((src_value * alpha + dst_value * (255 - alpha) + 127) / 255) as u8;
                }
            }
        }
    }

    fn check_paste(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        src_len: usize,
    ) -> Result<(), ImageError> {
        let expected = width * height * Self::BYTES_PER_PIXEL;
        if src_len < expected {
            return Err(ImageError::SourceSizeMismatch {
                actual: src_len,
                expected,
                width,
                height,
                bytes_per_pixel: Self::BYTES_PER_PIXEL,
            });
        }

        if x + width > self.width || y + height > self.height {
            return Err(ImageError::RegionOutOfBounds {
                x,
                y,
                width,
                height,
                dst_width: self.width,
                dst_height: self.height,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paste_bottom_up_flips_rows() {
        let mut image = RgbImage::new(2, 2);

        // Row 0 red, row 1 blue in source order.
        let src = [255, 0, 0, 255, 0, 0, 0, 0, 255, 0, 0, 255];
        image.paste_rgb24_bottom_up(0, 0, 2, 2, &src).unwrap();

        // Bottom-up: the red source row is the bottom of the region.
        assert_eq!(image.pixel(0, 0), Some([0, 0, 255]));
        assert_eq!(image.pixel(0, 1), Some([255, 0, 0]));
    }

    #[test]
    fn paste_out_of_bounds_is_rejected() {
        let mut image = RgbImage::new(4, 4);
        let src = [0u8; 2 * 2 * 3];

        assert!(matches!(
            image.paste_rgb24(3, 3, 2, 2, &src),
            Err(ImageError::RegionOutOfBounds { .. })
        ));
    }

    #[test]
    fn blend_respects_alpha() {
        let mut image = RgbImage::new(1, 1);

        image.blend_rgba(0, 0, 1, 1, &[255, 255, 255, 0]);
        assert_eq!(image.pixel(0, 0), Some([0, 0, 0]));

        image.blend_rgba(0, 0, 1, 1, &[255, 255, 255, 255]);
        assert_eq!(image.pixel(0, 0), Some([255, 255, 255]));
    }

    #[test]
    fn blend_clips_at_the_edges() {
        let mut image = RgbImage::new(2, 2);

        // A 2x2 opaque white cursor hanging over the top-left corner.
        image.blend_rgba(-1, -1, 2, 2, &[255u8; 2 * 2 * 4]);

        assert_eq!(image.pixel(0, 0), Some([255, 255, 255]));
        assert_eq!(image.pixel(1, 1), Some([0, 0, 0]));
    }
}
