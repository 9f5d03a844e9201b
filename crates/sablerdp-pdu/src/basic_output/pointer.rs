//! Server pointer update PDUs (TS_POINT16, TS_COLORPOINTERATTRIBUTE,
//! TS_POINTERATTRIBUTE, TS_CACHEDPOINTERATTRIBUTE).

use sablerdp_core::{
    ensure_fixed_part_size, ensure_size, Decode, DecodeResult, IntoOwned, ReadCursor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point16 {
    pub x: u16,
    pub y: u16,
}

impl Point16 {
    const NAME: &'static str = "TS_POINT16";

    const FIXED_PART_SIZE: usize = 2 /* x */ + 2 /* y */;
}

impl<'de> Decode<'de> for Point16 {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let x = src.read_u16();
        let y = src.read_u16();

        Ok(Self { x, y })
    }
}

/// TS_COLORPOINTERATTRIBUTE: a 24-bpp XOR mask plus a 1-bpp AND mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPointerAttribute<'a> {
    pub cache_index: u16,
    pub hot_spot: Point16,
    pub width: u16,
    pub height: u16,
    pub xor_bpp: u16,
    pub and_mask: &'a [u8],
    pub xor_mask: &'a [u8],
}

impl ColorPointerAttribute<'_> {
    const NAME: &'static str = "TS_COLORPOINTERATTRIBUTE";

    const FIXED_PART_SIZE: usize = 2 /* cacheIndex */ + Point16::FIXED_PART_SIZE
        + 2 /* width */ + 2 /* height */ + 2 /* lengthAndMask */ + 2 /* lengthXorMask */;

    fn decode_with_bpp<'de>(src: &mut ReadCursor<'de>, xor_bpp: u16) -> DecodeResult<ColorPointerAttribute<'de>> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);

        let cache_index = src.read_u16();
        let hot_spot = Point16::decode(src)?;
        let width = src.read_u16();
        let height = src.read_u16();
        let length_and_mask = usize::from(src.read_u16());
        let length_xor_mask = usize::from(src.read_u16());

        ensure_size!(ctx: Self::NAME, in: src, size: length_xor_mask + length_and_mask);
        let xor_mask = src.read_slice(length_xor_mask);
        let and_mask = src.read_slice(length_and_mask);

        // An optional pad byte may trail the masks.

        Ok(ColorPointerAttribute {
            cache_index,
            hot_spot,
            width,
            height,
            xor_bpp,
            and_mask,
            xor_mask,
        })
    }
}

impl<'de> Decode<'de> for ColorPointerAttribute<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        Self::decode_with_bpp(src, 24)
    }
}

/// TS_POINTERATTRIBUTE: a color pointer preceded by its XOR mask depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerAttribute<'a> {
    pub color_pointer: ColorPointerAttribute<'a>,
}

impl PointerAttribute<'_> {
    const NAME: &'static str = "TS_POINTERATTRIBUTE";
}

impl<'de> Decode<'de> for PointerAttribute<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: 2);
        let xor_bpp = src.read_u16();

        let color_pointer = ColorPointerAttribute::decode_with_bpp(src, xor_bpp)?;

        Ok(Self { color_pointer })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedPointerAttribute {
    pub cache_index: u16,
}

impl CachedPointerAttribute {
    const NAME: &'static str = "TS_CACHEDPOINTERATTRIBUTE";

    const FIXED_PART_SIZE: usize = 2;
}

impl<'de> Decode<'de> for CachedPointerAttribute {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            cache_index: src.read_u16(),
        })
    }
}

/// A pointer update carried in a Fast-Path update PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerUpdate<'a> {
    Hidden,
    Default,
    Position(Point16),
    Color(ColorPointerAttribute<'a>),
    New(PointerAttribute<'a>),
    Cached(CachedPointerAttribute),
}

/// Owned counterpart of [`PointerUpdate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedPointerUpdate {
    Hidden,
    Default,
    Position(Point16),
    Color(OwnedColorPointer),
    Cached(CachedPointerAttribute),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedColorPointer {
    pub cache_index: u16,
    pub hot_spot: Point16,
    pub width: u16,
    pub height: u16,
    pub xor_bpp: u16,
    pub and_mask: Vec<u8>,
    pub xor_mask: Vec<u8>,
}

impl IntoOwned for PointerUpdate<'_> {
    type Owned = OwnedPointerUpdate;

    fn into_owned(self) -> Self::Owned {
        match self {
            PointerUpdate::Hidden => OwnedPointerUpdate::Hidden,
            PointerUpdate::Default => OwnedPointerUpdate::Default,
            PointerUpdate::Position(point) => OwnedPointerUpdate::Position(point),
            PointerUpdate::Color(attr) => OwnedPointerUpdate::Color(OwnedColorPointer {
                cache_index: attr.cache_index,
                hot_spot: attr.hot_spot,
                width: attr.width,
                height: attr.height,
                xor_bpp: attr.xor_bpp,
                and_mask: attr.and_mask.to_vec(),
                xor_mask: attr.xor_mask.to_vec(),
            }),
            PointerUpdate::New(attr) => PointerUpdate::Color(attr.color_pointer).into_owned(),
            PointerUpdate::Cached(attr) => OwnedPointerUpdate::Cached(attr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_core::decode;

    #[test]
    fn position_update_is_two_coordinates() {
        let bytes = [0x64, 0x00, 0xC8, 0x00];
        let point: Point16 = decode(&bytes).unwrap();
        assert_eq!(point, Point16 { x: 100, y: 200 });
    }

    #[test]
    fn color_pointer_masks_are_split_correctly() {
        // 2x2 pointer: xor mask 2*2*3 rounded to even scan lines, and mask tiny.
        let xor_mask = [0u8; 12];
        let and_mask = [0xFFu8; 4];

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u16.to_le_bytes()); // cacheIndex
        bytes.extend_from_slice(&1u16.to_le_bytes()); // hotspot x
        bytes.extend_from_slice(&1u16.to_le_bytes()); // hotspot y
        bytes.extend_from_slice(&2u16.to_le_bytes()); // width
        bytes.extend_from_slice(&2u16.to_le_bytes()); // height
        bytes.extend_from_slice(&(and_mask.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&(xor_mask.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&xor_mask);
        bytes.extend_from_slice(&and_mask);

        let attr: ColorPointerAttribute<'_> = decode(&bytes).unwrap();
        assert_eq!(attr.xor_mask.len(), 12);
        assert_eq!(attr.and_mask.len(), 4);
        assert_eq!(attr.hot_spot, Point16 { x: 1, y: 1 });
        assert_eq!(attr.xor_bpp, 24);
    }
}
