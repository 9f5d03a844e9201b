//! The small fixed-layout capability sets: Pointer, Sound, Brush, Glyph
//! Cache, Offscreen Cache, Virtual Channel, Share, Font, Color Cache,
//! Control, Window Activation.

use bitflags::bitflags;
use sablerdp_core::{
    ensure_fixed_part_size, ensure_size, read_padding, write_padding, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};

const GLYPH_CACHE_NUM: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub color_pointer_cache_size: u16,
    pub pointer_cache_size: u16,
}

impl Pointer {
    const NAME: &'static str = "Pointer";

    const FIXED_PART_SIZE: usize = 2 /* colorPointerFlag */ + 2 /* colorPointerCacheSize */ + 2 /* pointerCacheSize */;
}

impl Encode for Pointer {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(1); // colorPointerFlag, must be 1
        dst.write_u16(self.color_pointer_cache_size);
        dst.write_u16(self.pointer_cache_size);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Pointer {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: 4);

        let _color_pointer_flag = src.read_u16();
        let color_pointer_cache_size = src.read_u16();
        // Optional in the server-to-client direction.
        let pointer_cache_size = if src.len() >= 2 { src.read_u16() } else { 0 };

        Ok(Self {
            color_pointer_cache_size,
            pointer_cache_size,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SoundFlags: u16 {
        const BEEPS = 0x0001;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sound {
    pub flags: SoundFlags,
}

impl Sound {
    const NAME: &'static str = "Sound";

    const FIXED_PART_SIZE: usize = 2 /* soundFlags */ + 2 /* pad */;
}

impl Encode for Sound {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.flags.bits());
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

impl<'de> Decode<'de> for Sound {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let flags = SoundFlags::from_bits_truncate(src.read_u16());
        read_padding!(src, 2);

        Ok(Self { flags })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum BrushSupportLevel {
    Default = 0,
    Color8x8 = 1,
    ColorFull = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brush {
    pub support_level: BrushSupportLevel,
}

impl Brush {
    const NAME: &'static str = "Brush";

    const FIXED_PART_SIZE: usize = 4 /* brushSupportLevel */;
}

impl Encode for Brush {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.support_level as u32);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Brush {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let support_level = match src.read_u32() {
            1 => BrushSupportLevel::Color8x8,
            2 => BrushSupportLevel::ColorFull,
            _ => BrushSupportLevel::Default,
        };

        Ok(Self { support_level })
    }
}

/// One glyph cache slot: number of entries and maximum cell size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDefinition {
    pub entries: u16,
    pub max_cell_size: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphCache {
    pub caches: [CacheDefinition; GLYPH_CACHE_NUM],
    pub frag_cache: CacheDefinition,
    pub support_level: u16,
}

impl GlyphCache {
    const NAME: &'static str = "GlyphCache";

    const FIXED_PART_SIZE: usize = GLYPH_CACHE_NUM * 4 + 4 /* fragCache */ + 2 /* supportLevel */ + 2 /* pad */;

    pub fn unsupported() -> Self {
        Self {
            caches: [CacheDefinition {
                entries: 0,
                max_cell_size: 0,
            }; GLYPH_CACHE_NUM],
            frag_cache: CacheDefinition {
                entries: 0,
                max_cell_size: 0,
            },
            support_level: 0,
        }
    }
}

impl Encode for GlyphCache {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        for cache in &self.caches {
            dst.write_u16(cache.entries);
            dst.write_u16(cache.max_cell_size);
        }
        dst.write_u16(self.frag_cache.entries);
        dst.write_u16(self.frag_cache.max_cell_size);
        dst.write_u16(self.support_level);
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

impl<'de> Decode<'de> for GlyphCache {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let mut caches = [CacheDefinition {
            entries: 0,
            max_cell_size: 0,
        }; GLYPH_CACHE_NUM];
        for cache in &mut caches {
            cache.entries = src.read_u16();
            cache.max_cell_size = src.read_u16();
        }

        let frag_cache = CacheDefinition {
            entries: src.read_u16(),
            max_cell_size: src.read_u16(),
        };
        let support_level = src.read_u16();
        read_padding!(src, 2);

        Ok(Self {
            caches,
            frag_cache,
            support_level,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffscreenBitmapCache {
    pub supported: bool,
    pub cache_size: u16,
    pub cache_entries: u16,
}

impl OffscreenBitmapCache {
    const NAME: &'static str = "OffscreenBitmapCache";

    const FIXED_PART_SIZE: usize = 4 /* offscreenSupportLevel */ + 2 /* cacheSize */ + 2 /* cacheEntries */;
}

impl Encode for OffscreenBitmapCache {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(u32::from(self.supported));
        dst.write_u16(self.cache_size);
        dst.write_u16(self.cache_entries);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for OffscreenBitmapCache {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let supported = src.read_u32() != 0;
        let cache_size = src.read_u16();
        let cache_entries = src.read_u16();

        Ok(Self {
            supported,
            cache_size,
            cache_entries,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VirtualChannelFlags: u32 {
        const COMPRESSION_SERVER_TO_CLIENT = 0x0001;
        const COMPRESSION_CLIENT_TO_SERVER_8K = 0x0002;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualChannel {
    pub flags: VirtualChannelFlags,
    pub chunk_size: Option<u32>,
}

impl VirtualChannel {
    const NAME: &'static str = "VirtualChannel";

    const FIXED_PART_SIZE: usize = 4 /* flags */;
}

impl Encode for VirtualChannel {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u32(self.flags.bits());
        if let Some(chunk_size) = self.chunk_size {
            dst.write_u32(chunk_size);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.chunk_size.map_or(0, |_| 4)
    }
}

impl<'de> Decode<'de> for VirtualChannel {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let flags = VirtualChannelFlags::from_bits_truncate(src.read_u32());
        let chunk_size = if src.len() >= 4 { Some(src.read_u32()) } else { None };

        Ok(Self { flags, chunk_size })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub node_id: u16,
}

impl Share {
    const NAME: &'static str = "Share";

    const FIXED_PART_SIZE: usize = 2 /* nodeId */ + 2 /* pad */;
}

impl Encode for Share {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.node_id);
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

impl<'de> Decode<'de> for Share {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let node_id = src.read_u16();
        read_padding!(src, 2);

        Ok(Self { node_id })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FontSupportFlags: u16 {
        const FONTSUPPORT_FONTLIST = 0x0001;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Font {
    pub flags: FontSupportFlags,
}

impl Font {
    const NAME: &'static str = "Font";

    const FIXED_PART_SIZE: usize = 2 /* fontSupportFlags */ + 2 /* pad */;
}

impl Encode for Font {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.flags.bits());
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

impl<'de> Decode<'de> for Font {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        // Both halves are optional in practice.
        let flags = if src.len() >= 2 {
            FontSupportFlags::from_bits_truncate(src.read_u16())
        } else {
            FontSupportFlags::empty()
        };
        if src.len() >= 2 {
            read_padding!(src, 2);
        }

        Ok(Self { flags })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorCache {
    pub cache_size: u16,
}

impl ColorCache {
    const NAME: &'static str = "ColorCache";

    const FIXED_PART_SIZE: usize = 2 /* colorTableCacheSize */ + 2 /* pad */;
}

impl Encode for ColorCache {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.cache_size);
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

impl<'de> Decode<'de> for ColorCache {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let cache_size = src.read_u16();
        read_padding!(src, 2);

        Ok(Self { cache_size })
    }
}

/// TS_CONTROL_CAPABILITYSET; every field has a single legal value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Control;

impl Control {
    const NAME: &'static str = "Control";

    const FIXED_PART_SIZE: usize = 2 /* controlFlags */ + 2 /* remoteDetachFlag */
        + 2 /* controlInterest */ + 2 /* detachInterest */;

    const CONTROLPRIORITY_NEVER: u16 = 0x0002;
}

impl Encode for Control {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(0); // controlFlags, must be 0
        dst.write_u16(0); // remoteDetachFlag, must be FALSE
        dst.write_u16(Self::CONTROLPRIORITY_NEVER);
        dst.write_u16(Self::CONTROLPRIORITY_NEVER);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Control {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);
        read_padding!(src, Self::FIXED_PART_SIZE);

        Ok(Self)
    }
}

/// TS_WINDOWACTIVATION_CAPABILITYSET; every field must be FALSE.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowActivation;

impl WindowActivation {
    const NAME: &'static str = "WindowActivation";

    const FIXED_PART_SIZE: usize = 2 * 4;
}

impl Encode for WindowActivation {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        write_padding!(dst, Self::FIXED_PART_SIZE);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for WindowActivation {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);
        read_padding!(src, Self::FIXED_PART_SIZE);

        Ok(Self)
    }
}
