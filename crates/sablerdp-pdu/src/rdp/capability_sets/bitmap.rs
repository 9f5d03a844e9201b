//! Bitmap (TS_BITMAP_CAPABILITYSET) and Bitmap Cache Rev. 2 capability sets.

use bitflags::bitflags;
use sablerdp_core::{
    ensure_fixed_part_size, read_padding, write_padding, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BitmapDrawingFlags: u8 {
        const ALLOW_DYNAMIC_COLOR_FIDELITY = 0x02;
        const ALLOW_COLOR_SUBSAMPLING = 0x04;
        const ALLOW_SKIP_ALPHA = 0x08;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub preferred_bits_per_pixel: u16,
    pub desktop_width: u16,
    pub desktop_height: u16,
    pub desktop_resize_supported: bool,
    pub drawing_flags: BitmapDrawingFlags,
}

impl Bitmap {
    const NAME: &'static str = "Bitmap";

    const FIXED_PART_SIZE: usize = 2 /* preferredBpp */ + 2 /* receive1Bpp */ + 2 /* receive4Bpp */ + 2 /* receive8Bpp */
        + 2 /* width */ + 2 /* height */ + 2 /* pad */ + 2 /* desktopResizeFlag */
        + 2 /* bitmapCompressionFlag */ + 1 /* highColorFlags */ + 1 /* drawingFlags */
        + 2 /* multipleRectangleSupport */ + 2 /* pad */;
}

impl Encode for Bitmap {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.preferred_bits_per_pixel);
        dst.write_u16(1); // receive1BitPerPixel, ignored
        dst.write_u16(1); // receive4BitsPerPixel, ignored
        dst.write_u16(1); // receive8BitsPerPixel, ignored
        dst.write_u16(self.desktop_width);
        dst.write_u16(self.desktop_height);
        write_padding!(dst, 2);
        dst.write_u16(u16::from(self.desktop_resize_supported));
        dst.write_u16(1); // bitmapCompressionFlag, must be 1
        dst.write_u8(0); // highColorFlags, must be 0
        dst.write_u8(self.drawing_flags.bits());
        dst.write_u16(1); // multipleRectangleSupport, must be 1
        write_padding!(dst, 2);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Bitmap {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let preferred_bits_per_pixel = src.read_u16();
        let _receive_1bpp = src.read_u16();
        let _receive_4bpp = src.read_u16();
        let _receive_8bpp = src.read_u16();
        let desktop_width = src.read_u16();
        let desktop_height = src.read_u16();
        read_padding!(src, 2);
        let desktop_resize_supported = src.read_u16() != 0;
        let _bitmap_compression_flag = src.read_u16();
        let _high_color_flags = src.read_u8();
        let drawing_flags = BitmapDrawingFlags::from_bits_truncate(src.read_u8());
        let _multiple_rectangle_support = src.read_u16();
        read_padding!(src, 2);

        Ok(Self {
            preferred_bits_per_pixel,
            desktop_width,
            desktop_height,
            desktop_resize_supported,
            drawing_flags,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheFlags: u16 {
        const PERSISTENT_KEYS_EXPECTED = 0x0001;
        const ALLOW_CACHE_WAITING_LIST = 0x0002;
    }
}

/// Bitmap Cache Rev. 2, advertised with zero cell caches: this client renders
/// bitmap updates directly and never populates a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapCacheRev2 {
    pub cache_flags: CacheFlags,
    pub num_cell_caches: u8,
    pub cell_cache_info: [u32; 5],
}

impl BitmapCacheRev2 {
    const NAME: &'static str = "BitmapCacheRev2";

    const FIXED_PART_SIZE: usize = 2 /* cacheFlags */ + 1 /* pad */ + 1 /* numCellCaches */
        + 4 * 5 /* cellCacheInfo */ + 12 /* pad */;

    pub fn disabled() -> Self {
        Self {
            cache_flags: CacheFlags::empty(),
            num_cell_caches: 0,
            cell_cache_info: [0; 5],
        }
    }
}

impl Encode for BitmapCacheRev2 {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.cache_flags.bits());
        write_padding!(dst, 1);
        dst.write_u8(self.num_cell_caches);
        for cell in self.cell_cache_info {
            dst.write_u32(cell);
        }
        write_padding!(dst, 12);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for BitmapCacheRev2 {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let cache_flags = CacheFlags::from_bits_truncate(src.read_u16());
        read_padding!(src, 1);
        let num_cell_caches = src.read_u8();
        let mut cell_cache_info = [0u32; 5];
        for cell in &mut cell_cache_info {
            *cell = src.read_u32();
        }
        read_padding!(src, 12);

        Ok(Self {
            cache_flags,
            num_cell_caches,
            cell_cache_info,
        })
    }
}
