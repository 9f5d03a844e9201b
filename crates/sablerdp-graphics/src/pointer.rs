//! Decodes server pointer attributes into RGBA bitmaps and provides the
//! built-in default arrow cursor.
//!
//! RDP pointers are a pair of masks: the XOR mask carries the color (1, 16,
//! 24 or 32 bpp) and the 1-bpp AND mask controls transparency. Mask scan
//! lines are bottom-up and padded to 16-bit boundaries.
//!
//! Mask decoding rules:
//! - `and == 0`: opaque pixel taken from the XOR mask
//! - `and == 1`, XOR black: fully transparent
//! - `and == 1`, XOR white: inversion; approximated as opaque black, which
//!   keeps the cursor visible on the light backgrounds it typically crosses

use thiserror::Error;

use sablerdp_pdu::pointer::OwnedColorPointer;

use crate::color_conversion::rdp_16bit_to_rgb;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("invalid pointer xorMask size: expected {expected}, got {actual}")]
    InvalidXorMaskSize { expected: usize, actual: usize },
    #[error("invalid pointer andMask size: expected {expected}, got {actual}")]
    InvalidAndMaskSize { expected: usize, actual: usize },
    #[error("unsupported pointer xor bpp: {bpp}")]
    UnsupportedBpp { bpp: u16 },
}

/// A pointer in decoded form: straight (non-premultiplied) RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPointer {
    pub width: usize,
    pub height: usize,
    pub hotspot_x: usize,
    pub hotspot_y: usize,
    pub rgba_data: Vec<u8>,
}

impl DecodedPointer {
    pub fn decode(attribute: &OwnedColorPointer) -> Result<Self, PointerError> {
        let width = usize::from(attribute.width);
        let height = usize::from(attribute.height);

        let and_stride = padded_stride(width, 1);
        let expected_and = and_stride * height;
        if attribute.and_mask.len() < expected_and {
            return Err(PointerError::InvalidAndMaskSize {
                expected: expected_and,
                actual: attribute.and_mask.len(),
            });
        }

        let xor_stride = padded_stride(width, usize::from(attribute.xor_bpp));
        let expected_xor = xor_stride * height;
        if attribute.xor_mask.len() < expected_xor {
            return Err(PointerError::InvalidXorMaskSize {
                expected: expected_xor,
                actual: attribute.xor_mask.len(),
            });
        }

        let mut rgba_data = Vec::with_capacity(width * height * 4);

        for y in 0..height {
            // Masks are stored bottom-up.
            let mask_row = height - 1 - y;
            let and_row = &attribute.and_mask[mask_row * and_stride..];
            let xor_row = &attribute.xor_mask[mask_row * xor_stride..];

            for x in 0..width {
                let and_bit = (and_row[x / 8] >> (7 - (x % 8))) & 0x01 != 0;
                let (color, opaque_white) = read_xor_pixel(xor_row, x, attribute.xor_bpp)?;

                let pixel = match (and_bit, opaque_white) {
                    (false, _) => [color[0], color[1], color[2], 0xFF],
                    (true, false) => [0, 0, 0, 0],
                    (true, true) => [0, 0, 0, 0xFF], // inversion approximation
                };

                rgba_data.extend_from_slice(&pixel);
            }
        }

        Ok(Self {
            width,
            height,
            hotspot_x: usize::from(attribute.hot_spot.x),
            hotspot_y: usize::from(attribute.hot_spot.y),
            rgba_data,
        })
    }
}

fn padded_stride(width: usize, bpp: usize) -> usize {
    let bits = width * bpp;
    let bytes = (bits + 7) / 8;
    (bytes + 1) & !1
}

/// Returns the pixel color and whether it counts as "white" for the
/// inversion rule.
fn read_xor_pixel(row: &[u8], x: usize, bpp: u16) -> Result<([u8; 3], bool), PointerError> {
    match bpp {
        1 => {
            let bit = (row[x / 8] >> (7 - (x % 8))) & 0x01 != 0;
            let value = if bit { 0xFF } else { 0x00 };
            Ok(([value, value, value], bit))
        }
        16 => {
            let value = u16::from_le_bytes([row[x * 2], row[x * 2 + 1]]);
            let rgb = rdp_16bit_to_rgb(value);
            Ok((rgb, value == 0xFFFF))
        }
        24 => {
            let b = row[x * 3];
            let g = row[x * 3 + 1];
            let r = row[x * 3 + 2];
            Ok(([r, g, b], r == 0xFF && g == 0xFF && b == 0xFF))
        }
        32 => {
            let b = row[x * 4];
            let g = row[x * 4 + 1];
            let r = row[x * 4 + 2];
            Ok(([r, g, b], r == 0xFF && g == 0xFF && b == 0xFF))
        }
        bpp => Err(PointerError::UnsupportedBpp { bpp }),
    }
}

/// The built-in default arrow cursor, used until the server delivers one.
///
/// `'X'` is the black outline, `'o'` the white fill, anything else is
/// transparent. Hotspot at (0, 0).
const DEFAULT_ARROW: [&str; 24] = [
    "X               ",
    "XX              ",
    "XoX             ",
    "XooX            ",
    "XoooX           ",
    "XooooX          ",
    "XoooooX         ",
    "XooooooX        ",
    "XoooooooX       ",
    "XooooooooX      ",
    "XoooooooooX     ",
    "XooooooooooX    ",
    "XooooooXXXXXX   ",
    "XoooXooX        ",
    "XooX XooX       ",
    "XoX  XooX       ",
    "XX    XooX      ",
    "X     XooX      ",
    "       XooX     ",
    "       XooX     ",
    "        XoX     ",
    "        XoX     ",
    "         XX     ",
    "         X      ",
];

/// Builds the default arrow cursor as a [`DecodedPointer`].
pub fn default_arrow_pointer() -> DecodedPointer {
    let width = DEFAULT_ARROW[0].len();
    let height = DEFAULT_ARROW.len();

    let mut rgba_data = Vec::with_capacity(width * height * 4);

    for row in DEFAULT_ARROW {
        for cell in row.bytes() {
            let pixel: [u8; 4] = match cell {
                b'X' => [0, 0, 0, 0xFF],
                b'o' => [0xFF, 0xFF, 0xFF, 0xFF],
                _ => [0, 0, 0, 0],
            };
            rgba_data.extend_from_slice(&pixel);
        }
    }

    DecodedPointer {
        width,
        height,
        hotspot_x: 0,
        hotspot_y: 0,
        rgba_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_pdu::pointer::Point16;

    #[test]
    fn default_arrow_has_consistent_dimensions() {
        let pointer = default_arrow_pointer();
        assert_eq!(pointer.width, 16);
        assert_eq!(pointer.height, 24);
        assert_eq!(pointer.rgba_data.len(), 16 * 24 * 4);

        // Tip of the arrow is opaque black.
        assert_eq!(&pointer.rgba_data[..4], [0, 0, 0, 0xFF]);
    }

    #[test]
    fn fully_masked_pointer_is_transparent() {
        // 8x2, 24-bpp black XOR mask, AND mask all ones.
        let attribute = OwnedColorPointer {
            cache_index: 0,
            hot_spot: Point16 { x: 0, y: 0 },
            width: 8,
            height: 2,
            xor_bpp: 24,
            and_mask: vec![0xFF; 2 * 2],
            xor_mask: vec![0x00; 24 * 2],
        };

        let decoded = DecodedPointer::decode(&attribute).unwrap();
        assert!(decoded.rgba_data.chunks_exact(4).all(|p| p[3] == 0));
    }

    #[test]
    fn unmasked_pixels_use_the_xor_color() {
        // A single opaque red pixel (BGR on the wire), one row of padding.
        let attribute = OwnedColorPointer {
            cache_index: 0,
            hot_spot: Point16 { x: 0, y: 0 },
            width: 1,
            height: 1,
            xor_bpp: 24,
            and_mask: vec![0x00, 0x00],
            xor_mask: vec![0x00, 0x00, 0xFF, 0x00],
        };

        let decoded = DecodedPointer::decode(&attribute).unwrap();
        assert_eq!(decoded.rgba_data, vec![0xFF, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn truncated_masks_are_rejected() {
        let attribute = OwnedColorPointer {
            cache_index: 0,
            hot_spot: Point16 { x: 0, y: 0 },
            width: 16,
            height: 16,
            xor_bpp: 24,
            and_mask: vec![0x00; 4],
            xor_mask: vec![0x00; 4],
        };

        assert!(matches!(
            DecodedPointer::decode(&attribute),
            Err(PointerError::InvalidAndMaskSize { .. })
        ));
    }
}
