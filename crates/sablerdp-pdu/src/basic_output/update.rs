//! Slow-path graphics update payload (PDUTYPE2_UPDATE).
//!
//! Layout after the Share Data header: `updateType` (u16), `pad2octets`,
//! then the variant payload.

use sablerdp_core::{
    ensure_size, invalid_field_err, read_padding, Decode, DecodeResult, Encode, EncodeResult, IntoOwned, ReadCursor,
    WriteCursor,
};

use crate::bitmap::{BitmapData, BitmapUpdateData, BitmapUpdateOwned};

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum UpdateType {
    Orders = 0x0000,
    Bitmap = 0x0001,
    Palette = 0x0002,
    Synchronize = 0x0003,
}

impl UpdateType {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Self::Orders),
            0x0001 => Some(Self::Bitmap),
            0x0002 => Some(Self::Palette),
            0x0003 => Some(Self::Synchronize),
            _ => None,
        }
    }
}

/// A decoded slow-path update, borrowing the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update<'a> {
    Bitmap(BitmapUpdateData<'a>),
    Orders(&'a [u8]),
    Palette(&'a [u8]),
    Synchronize,
}

impl<'de> Decode<'de> for Update<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(ctx: "Update", in: src, size: 2);

        let Some(update_type) = UpdateType::from_u16(src.read_u16()) else {
            return Err(invalid_field_err!("updateType", "invalid slow-path update type"));
        };

        // pad2octets is historically present, but some servers omit it.
        if src.len() >= 2 && src.peek_u16() == 0 {
            read_padding!(src, 2);
        }

        match update_type {
            UpdateType::Bitmap => Ok(Update::Bitmap(BitmapUpdateData::decode(src)?)),
            UpdateType::Orders => Ok(Update::Orders(src.read_remaining())),
            UpdateType::Palette => Ok(Update::Palette(src.read_remaining())),
            UpdateType::Synchronize => Ok(Update::Synchronize),
        }
    }
}

/// Owned representation used in `ShareDataPdu`, avoiding lifetimes above the
/// decode layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareUpdate {
    Bitmap(BitmapUpdateOwned),
    Orders(Vec<u8>),
    Palette(Vec<u8>),
    Synchronize,
}

impl ShareUpdate {
    const NAME: &'static str = "ShareUpdate";

    fn update_type(&self) -> UpdateType {
        match self {
            Self::Bitmap(_) => UpdateType::Bitmap,
            Self::Orders(_) => UpdateType::Orders,
            Self::Palette(_) => UpdateType::Palette,
            Self::Synchronize => UpdateType::Synchronize,
        }
    }

    fn borrowed_bitmap(update: &BitmapUpdateOwned) -> BitmapUpdateData<'_> {
        BitmapUpdateData {
            rectangles: update
                .rectangles
                .iter()
                .map(|r| BitmapData {
                    rectangle: r.rectangle.clone(),
                    width: r.width,
                    height: r.height,
                    bits_per_pixel: r.bits_per_pixel,
                    compression_flags: r.compression_flags,
                    compressed_data_header: r.compressed_data_header.clone(),
                    bitmap_data: r.bitmap_data.as_slice(),
                })
                .collect(),
        }
    }
}

impl IntoOwned for Update<'_> {
    type Owned = ShareUpdate;

    fn into_owned(self) -> Self::Owned {
        match self {
            Update::Bitmap(bitmap) => ShareUpdate::Bitmap(bitmap.into_owned()),
            Update::Orders(buf) => ShareUpdate::Orders(buf.to_vec()),
            Update::Palette(buf) => ShareUpdate::Palette(buf.to_vec()),
            Update::Synchronize => ShareUpdate::Synchronize,
        }
    }
}

impl<'de> Decode<'de> for ShareUpdate {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        Update::decode(src).map(IntoOwned::into_owned)
    }
}

impl Encode for ShareUpdate {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.update_type() as u16);
        dst.write_u16(0); // pad2octets

        match self {
            ShareUpdate::Bitmap(bitmap) => Self::borrowed_bitmap(bitmap).encode(dst),
            ShareUpdate::Orders(buf) | ShareUpdate::Palette(buf) => {
                dst.write_slice(buf);
                Ok(())
            }
            ShareUpdate::Synchronize => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        2 /* updateType */ + 2 /* pad2octets */
            + match self {
                ShareUpdate::Bitmap(bitmap) => Self::borrowed_bitmap(bitmap).size(),
                ShareUpdate::Orders(buf) | ShareUpdate::Palette(buf) => buf.len(),
                ShareUpdate::Synchronize => 0,
            }
    }
}
