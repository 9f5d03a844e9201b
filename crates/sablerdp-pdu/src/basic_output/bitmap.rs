//! TS_UPDATE_BITMAP_DATA and TS_BITMAP_DATA.

use core::fmt;

use bitflags::bitflags;
use sablerdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult,
    IntoOwned, ReadCursor, WriteCursor,
};

use crate::geometry::InclusiveRectangle;

const FIRST_ROW_SIZE_VALUE: u16 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapUpdateData<'a> {
    pub rectangles: Vec<BitmapData<'a>>,
}

impl BitmapUpdateData<'_> {
    const NAME: &'static str = "TS_UPDATE_BITMAP_DATA";

    const FIXED_PART_SIZE: usize = 2 /* updateType */ + 2 /* numberRectangles */;
}

impl Encode for BitmapUpdateData<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(BitmapFlags::BITMAP_UPDATE_TYPE.bits());
        dst.write_u16(cast_length!("numberRectangles", self.rectangles.len())?);

        for bitmap_data in self.rectangles.iter() {
            bitmap_data.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        self.rectangles
            .iter()
            .fold(Self::FIXED_PART_SIZE, |size, new| size + new.size())
    }
}

impl<'de> Decode<'de> for BitmapUpdateData<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let update_type = BitmapFlags::from_bits_truncate(src.read_u16());
        if !update_type.contains(BitmapFlags::BITMAP_UPDATE_TYPE) {
            return Err(invalid_field_err!("updateType", "invalid bitmap update type"));
        }

        let rectangles_number = usize::from(src.read_u16());
        let mut rectangles = Vec::with_capacity(rectangles_number);

        for _ in 0..rectangles_number {
            rectangles.push(BitmapData::decode(src)?);
        }

        Ok(Self { rectangles })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BitmapData<'a> {
    pub rectangle: InclusiveRectangle,
    pub width: u16,
    pub height: u16,
    pub bits_per_pixel: u16,
    pub compression_flags: Compression,
    pub compressed_data_header: Option<CompressedDataHeader>,
    pub bitmap_data: &'a [u8],
}

impl BitmapData<'_> {
    const NAME: &'static str = "TS_BITMAP_DATA";

    const FIXED_PART_SIZE: usize = InclusiveRectangle::ENCODED_SIZE
        + 2 /* width */ + 2 /* height */ + 2 /* bpp */ + 2 /* flags */ + 2 /* bitmapLength */;

    fn encoded_bitmap_data_length(&self) -> usize {
        self.bitmap_data.len() + self.compressed_data_header.as_ref().map(|hdr| hdr.size()).unwrap_or(0)
    }
}

impl Encode for BitmapData<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        self.rectangle.encode(dst)?;
        dst.write_u16(self.width);
        dst.write_u16(self.height);
        dst.write_u16(self.bits_per_pixel);
        dst.write_u16(self.compression_flags.bits());
        dst.write_u16(cast_length!("bitmapLength", self.encoded_bitmap_data_length())?);
        if let Some(compressed_data_header) = &self.compressed_data_header {
            compressed_data_header.encode(dst)?;
        }
        dst.write_slice(self.bitmap_data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.encoded_bitmap_data_length()
    }
}

impl<'de> Decode<'de> for BitmapData<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let rectangle = InclusiveRectangle::decode(src)?;
        let width = src.read_u16();
        let height = src.read_u16();
        let bits_per_pixel = src.read_u16();
        let compression_flags = Compression::from_bits_truncate(src.read_u16());

        // Size in bytes of the data in the bitmapComprHdr and
        // bitmapDataStream fields.
        let encoded_bitmap_data_length = usize::from(src.read_u16());

        ensure_size!(ctx: Self::NAME, in: src, size: encoded_bitmap_data_length);

        let (compressed_data_header, buffer_length) = if compression_flags.contains(Compression::BITMAP_COMPRESSION)
            && !compression_flags.contains(Compression::NO_BITMAP_COMPRESSION_HDR)
        {
            if encoded_bitmap_data_length < CompressedDataHeader::ENCODED_SIZE {
                return Err(invalid_field_err!(
                    "bitmapLength",
                    "length is smaller than the compression header"
                ));
            }

            let buffer_length = encoded_bitmap_data_length - CompressedDataHeader::ENCODED_SIZE;
            (Some(CompressedDataHeader::decode(src)?), buffer_length)
        } else {
            (None, encoded_bitmap_data_length)
        };

        let bitmap_data = src.read_slice(buffer_length);

        Ok(BitmapData {
            rectangle,
            width,
            height,
            bits_per_pixel,
            compression_flags,
            compressed_data_header,
            bitmap_data,
        })
    }
}

impl fmt::Debug for BitmapData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapData")
            .field("rectangle", &self.rectangle)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bits_per_pixel", &self.bits_per_pixel)
            .field("compression_flags", &self.compression_flags)
            .field("compressed_data_header", &self.compressed_data_header)
            .field("bitmap_data.len()", &self.bitmap_data.len())
            .finish()
    }
}

/// Owned counterpart of [`BitmapData`], used above the decode layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapDataOwned {
    pub rectangle: InclusiveRectangle,
    pub width: u16,
    pub height: u16,
    pub bits_per_pixel: u16,
    pub compression_flags: Compression,
    pub compressed_data_header: Option<CompressedDataHeader>,
    pub bitmap_data: Vec<u8>,
}

impl IntoOwned for BitmapData<'_> {
    type Owned = BitmapDataOwned;

    fn into_owned(self) -> Self::Owned {
        BitmapDataOwned {
            rectangle: self.rectangle,
            width: self.width,
            height: self.height,
            bits_per_pixel: self.bits_per_pixel,
            compression_flags: self.compression_flags,
            compressed_data_header: self.compressed_data_header,
            bitmap_data: self.bitmap_data.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapUpdateOwned {
    pub rectangles: Vec<BitmapDataOwned>,
}

impl IntoOwned for BitmapUpdateData<'_> {
    type Owned = BitmapUpdateOwned;

    fn into_owned(self) -> Self::Owned {
        BitmapUpdateOwned {
            rectangles: self.rectangles.into_iter().map(IntoOwned::into_owned).collect(),
        }
    }
}

/// TS_CD_HEADER
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedDataHeader {
    pub main_body_size: u16,
    pub scan_width: u16,
    pub uncompressed_size: u16,
}

impl CompressedDataHeader {
    const NAME: &'static str = "TS_CD_HEADER";

    const FIXED_PART_SIZE: usize = 2 /* firstRowSize */ + 2 /* mainBodySize */ + 2 /* scanWidth */ + 2 /* uncompressedSize */;

    pub const ENCODED_SIZE: usize = Self::FIXED_PART_SIZE;
}

impl Encode for CompressedDataHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(FIRST_ROW_SIZE_VALUE);
        dst.write_u16(self.main_body_size);
        dst.write_u16(self.scan_width);
        dst.write_u16(self.uncompressed_size);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for CompressedDataHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let size = src.read_u16();
        if size != FIRST_ROW_SIZE_VALUE {
            return Err(invalid_field_err!("cbCompFirstRowSize", "invalid first row size"));
        }

        let main_body_size = src.read_u16();
        let scan_width = src.read_u16();
        let uncompressed_size = src.read_u16();

        Ok(Self {
            main_body_size,
            scan_width,
            uncompressed_size,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct BitmapFlags: u16 {
        const BITMAP_UPDATE_TYPE = 0x0001;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Compression: u16 {
        const BITMAP_COMPRESSION = 0x0001;
        const NO_BITMAP_COMPRESSION_HDR = 0x0400;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_core::decode;

    #[test]
    fn uncompressed_rectangle_is_parsed() {
        let mut bytes = vec![
            0x01, 0x00, // updateType: bitmap
            0x01, 0x00, // one rectangle
            0x05, 0x00, 0x05, 0x00, 0x0E, 0x00, 0x0E, 0x00, // destination (5,5)-(14,14)
            0x0A, 0x00, // width 10
            0x0A, 0x00, // height 10
            0x20, 0x00, // 32 bpp
            0x00, 0x00, // no compression
        ];
        let payload = vec![0xAAu8; 10 * 10 * 4];
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&payload);

        let update: BitmapUpdateData<'_> = decode(&bytes).unwrap();
        assert_eq!(update.rectangles.len(), 1);

        let rect = &update.rectangles[0];
        assert_eq!(rect.rectangle.width(), 10);
        assert_eq!(rect.bits_per_pixel, 32);
        assert!(rect.compressed_data_header.is_none());
        assert_eq!(rect.bitmap_data.len(), payload.len());
    }

    #[test]
    fn compressed_rectangle_without_header_flag_keeps_all_bytes() {
        let compressed = [0x81, 0xFF, 0xFF, 0x18]; // arbitrary RLE bytes
        let mut bytes = vec![
            0x01, 0x00, 0x01, 0x00, // header
            0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x03, 0x00, // destination
            0x04, 0x00, 0x04, 0x00, // 4x4
            0x10, 0x00, // 16 bpp
            0x01, 0x04, // COMPRESSED | NO_BITMAP_COMPRESSION_HDR
        ];
        bytes.extend_from_slice(&(compressed.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&compressed);

        let update: BitmapUpdateData<'_> = decode(&bytes).unwrap();
        let rect = &update.rectangles[0];
        assert!(rect.compression_flags.contains(Compression::BITMAP_COMPRESSION));
        assert!(rect.compressed_data_header.is_none());
        assert_eq!(rect.bitmap_data, compressed);
    }
}
