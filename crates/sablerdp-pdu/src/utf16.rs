//! Little-endian UTF-16 helpers for the RDP string fields.

use sablerdp_core::{ReadCursor, WriteCursor};

/// Encodes `src` as little-endian UTF-16 without a terminator.
pub fn to_utf16_bytes(src: &str) -> Vec<u8> {
    src.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

/// Decodes little-endian UTF-16, dropping everything from the first NUL.
pub fn from_utf16_bytes(mut src: &[u8]) -> String {
    if src.len() % 2 != 0 {
        src = &src[..src.len() - 1];
    }

    let units: Vec<u16> = src
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&c| c != 0)
        .collect();

    String::from_utf16_lossy(&units)
}

/// Number of bytes `src` occupies as UTF-16, excluding any terminator.
pub fn null_terminated_utf16_encoded_len(src: &str) -> usize {
    src.encode_utf16().count() * 2
}

/// Writes `src` as UTF-16 into a fixed-size field, NUL-padded to `field_size` bytes.
///
/// The string is truncated when it does not fit (one code unit is always
/// reserved for the terminator).
pub fn write_fixed_utf16(dst: &mut WriteCursor<'_>, src: &str, field_size: usize) {
    debug_assert!(field_size % 2 == 0);

    let max_units = field_size / 2 - 1;
    let mut written = 0;

    for unit in src.encode_utf16().take(max_units) {
        dst.write_u16(unit);
        written += 2;
    }

    while written < field_size {
        dst.write_u16(0);
        written += 2;
    }
}

/// Reads a fixed-size NUL-padded UTF-16 field of `field_size` bytes.
pub fn read_fixed_utf16(src: &mut ReadCursor<'_>, field_size: usize) -> String {
    let bytes = src.read_slice(field_size);
    from_utf16_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_round_trip() {
        let bytes = to_utf16_bytes("sable");
        assert_eq!(bytes, [0x73, 0, 0x61, 0, 0x62, 0, 0x6C, 0, 0x65, 0]);
        assert_eq!(from_utf16_bytes(&bytes), "sable");
    }

    #[test]
    fn fixed_field_truncates_and_pads() {
        let mut buf = [0xFFu8; 8];
        let mut cur = WriteCursor::new(&mut buf);
        write_fixed_utf16(&mut cur, "abcdef", 8);

        // Three units fit, the rest of the field is NUL padding.
        assert_eq!(buf, [0x61, 0, 0x62, 0, 0x63, 0, 0, 0]);

        let mut cur = ReadCursor::new(&buf);
        assert_eq!(read_fixed_utf16(&mut cur, 8), "abc");
    }
}
