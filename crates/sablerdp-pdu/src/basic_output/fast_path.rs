//! Fast-Path server output framing (TS_FP_UPDATE_PDU / TS_FP_UPDATE).
//!
//! The compact alternative to TPKT: a one-byte header whose low two bits are
//! the action, followed by a 1- or 2-byte PER length covering the whole PDU.

use bitflags::bitflags;
use sablerdp_core::{
    ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

use crate::per;

/// TS_FP_UPDATE_PDU header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathHeader {
    pub flags: EncryptionFlags,
    pub data_length: usize,
    forced_long_length: bool,
}

impl FastPathHeader {
    const NAME: &'static str = "TS_FP_UPDATE_PDU header";

    const FIXED_PART_SIZE: usize = 1 /* fpOutputHeader */;

    pub fn new(flags: EncryptionFlags, data_length: usize) -> Self {
        Self {
            flags,
            data_length,
            forced_long_length: false,
        }
    }

    fn minimal_size(&self) -> usize {
        Self::FIXED_PART_SIZE + per::sizeof_length(self.data_length as u16)
    }
}

impl Encode for FastPathHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        // Action bits 0..2 are zero for fast-path; encryption flags sit in bits 6..8.
        let header = (self.flags.bits() << 6) & 0xC0;
        dst.write_u8(header);

        let length = self.data_length + self.size();
        if length > usize::from(u16::MAX) {
            return Err(invalid_field_err!("length", "fast-path PDU length is too big"));
        }

        if self.forced_long_length {
            // Preserve the layout the peer used.
            per::write_long_length(dst, length as u16);
        } else {
            per::write_length(dst, length as u16);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        if self.forced_long_length {
            Self::FIXED_PART_SIZE + per::U16_SIZE
        } else {
            self.minimal_size()
        }
    }
}

impl<'de> Decode<'de> for FastPathHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();
        let flags = EncryptionFlags::from_bits_truncate((header >> 6) & 0x03);

        let (length, sizeof_length) = per::read_length(src)
            .map_err(|_| invalid_field_err!("length", "invalid fast-path PDU length"))?;
        let length = usize::from(length);

        if length < sizeof_length + Self::FIXED_PART_SIZE {
            return Err(invalid_field_err!(
                "length",
                "received fast-path PDU length is smaller than the header"
            ));
        }
        let data_length = length - sizeof_length - Self::FIXED_PART_SIZE;
        // Some peers use the two-byte form even for small lengths.
        let forced_long_length = per::sizeof_length(length as u16) != sizeof_length;

        Ok(FastPathHeader {
            flags,
            data_length,
            forced_long_length,
        })
    }
}

/// TS_FP_UPDATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathUpdatePdu<'a> {
    pub fragmentation: Fragmentation,
    pub update_code: UpdateCode,
    pub compression_flags: u8,
    pub data: &'a [u8],
}

impl FastPathUpdatePdu<'_> {
    const NAME: &'static str = "TS_FP_UPDATE";

    const FIXED_PART_SIZE: usize = 1 /* updateHeader */;

    fn compression_present(&self) -> bool {
        self.compression_flags != 0
    }
}

impl Encode for FastPathUpdatePdu<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        if self.data.len() > usize::from(u16::MAX) {
            return Err(invalid_field_err!("data", "fast-path PDU data is too big"));
        }

        let compression_bits = if self.compression_present() {
            Compression::COMPRESSION_USED.bits()
        } else {
            0
        };

        let header = (self.update_code as u8) | ((self.fragmentation as u8) << 4) | (compression_bits << 6);
        dst.write_u8(header);

        if self.compression_present() {
            dst.write_u8(self.compression_flags);
        }

        dst.write_u16(self.data.len() as u16);
        dst.write_slice(self.data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let compression_size = if self.compression_present() { 1 } else { 0 };

        Self::FIXED_PART_SIZE + compression_size + 2 /* size */ + self.data.len()
    }
}

impl<'de> Decode<'de> for FastPathUpdatePdu<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();

        let update_code = UpdateCode::from_u8(header & 0x0F)
            .ok_or_else(|| invalid_field_err!("updateHeader", "invalid update code"))?;
        let fragmentation = Fragmentation::from_u8((header >> 4) & 0x03)
            .ok_or_else(|| invalid_field_err!("updateHeader", "invalid fragmentation"))?;
        let compression = Compression::from_bits_truncate((header >> 6) & 0x03);

        let compression_flags = if compression.contains(Compression::COMPRESSION_USED) {
            ensure_size!(ctx: Self::NAME, in: src, size: 1);
            src.read_u8()
        } else {
            0
        };

        ensure_size!(ctx: Self::NAME, in: src, size: 2);
        let data_length = usize::from(src.read_u16());

        ensure_size!(ctx: Self::NAME, in: src, size: data_length);
        let data = src.read_slice(data_length);

        Ok(Self {
            fragmentation,
            update_code,
            compression_flags,
            data,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum UpdateCode {
    Orders = 0x0,
    Bitmap = 0x1,
    Palette = 0x2,
    Synchronize = 0x3,
    SurfaceCommands = 0x4,
    HiddenPointer = 0x5,
    DefaultPointer = 0x6,
    PositionPointer = 0x8,
    ColorPointer = 0x9,
    CachedPointer = 0xA,
    NewPointer = 0xB,
    LargePointer = 0xC,
}

impl UpdateCode {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Orders),
            0x1 => Some(Self::Bitmap),
            0x2 => Some(Self::Palette),
            0x3 => Some(Self::Synchronize),
            0x4 => Some(Self::SurfaceCommands),
            0x5 => Some(Self::HiddenPointer),
            0x6 => Some(Self::DefaultPointer),
            0x8 => Some(Self::PositionPointer),
            0x9 => Some(Self::ColorPointer),
            0xA => Some(Self::CachedPointer),
            0xB => Some(Self::NewPointer),
            0xC => Some(Self::LargePointer),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Fragmentation {
    Single = 0x0,
    Last = 0x1,
    First = 0x2,
    Next = 0x3,
}

impl Fragmentation {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Single),
            0x1 => Some(Self::Last),
            0x2 => Some(Self::First),
            0x3 => Some(Self::Next),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EncryptionFlags: u8 {
        const SECURE_CHECKSUM = 0x1;
        const ENCRYPTED = 0x2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Compression: u8 {
        const COMPRESSION_USED = 0x2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_core::{decode, encode_vec};

    #[test]
    fn header_round_trip_short_length() {
        let header = FastPathHeader::new(EncryptionFlags::empty(), 0x20);

        let encoded = encode_vec(&header).unwrap();
        assert_eq!(encoded, [0x00, 0x22]);

        let decoded: FastPathHeader = decode(&encoded).unwrap();
        assert_eq!(decoded.data_length, 0x20);
    }

    #[test]
    fn header_decode_long_length() {
        // 0x8157 => length 0x157 in the two-byte form.
        let bytes = [0x00, 0x81, 0x57];
        let decoded: FastPathHeader = decode(&bytes).unwrap();
        assert_eq!(decoded.data_length, 0x157 - 3);
    }

    #[test]
    fn update_pdu_round_trip() {
        let pdu = FastPathUpdatePdu {
            fragmentation: Fragmentation::Single,
            update_code: UpdateCode::Bitmap,
            compression_flags: 0,
            data: &[0xAB, 0xCD],
        };

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded, [0x01, 0x02, 0x00, 0xAB, 0xCD]);

        let decoded: FastPathUpdatePdu<'_> = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }
}
