//! Demand Active / Confirm Active PDUs and the capability sets they carry.

use sablerdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, read_padding, write_padding, Decode, DecodeResult, Encode,
    EncodeResult, ReadCursor, WriteCursor,
};

pub mod bitmap;
pub mod general;
pub mod input;
pub mod misc;
pub mod order;

pub use self::bitmap::{Bitmap, BitmapCacheRev2, BitmapDrawingFlags, CacheFlags};
pub use self::general::{General, GeneralExtraFlags, MajorPlatformType, MinorPlatformType};
pub use self::input::{Input, InputFlags};
pub use self::misc::{
    Brush, BrushSupportLevel, ColorCache, Control, Font, FontSupportFlags, GlyphCache, OffscreenBitmapCache, Pointer,
    Share, Sound, SoundFlags, VirtualChannel, VirtualChannelFlags, WindowActivation,
};
pub use self::order::{Order, OrderFlags, OrderSupportIndex};

pub const SERVER_CHANNEL_ID: u16 = 0x03EA;

const SOURCE_DESCRIPTOR: &[u8] = b"MSTSC\0";

const CAPABILITY_SET_HEADER_SIZE: usize = 4;

const NUMBER_CAPABILITIES_FIELD_SIZE: usize = 2;
const PADDING_SIZE: usize = 2;
const SESSION_ID_FIELD_SIZE: usize = 4;
const ORIGINATOR_ID_FIELD_SIZE: usize = 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
enum CapabilitySetType {
    General = 0x01,
    Bitmap = 0x02,
    Order = 0x03,
    Control = 0x05,
    WindowActivation = 0x07,
    Pointer = 0x08,
    Share = 0x09,
    ColorCache = 0x0A,
    Sound = 0x0C,
    Input = 0x0D,
    Font = 0x0E,
    Brush = 0x0F,
    GlyphCache = 0x10,
    OffscreenBitmapCache = 0x11,
    BitmapCacheRev2 = 0x13,
    VirtualChannel = 0x14,
}

impl CapabilitySetType {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x01 => Some(Self::General),
            0x02 => Some(Self::Bitmap),
            0x03 => Some(Self::Order),
            0x05 => Some(Self::Control),
            0x07 => Some(Self::WindowActivation),
            0x08 => Some(Self::Pointer),
            0x09 => Some(Self::Share),
            0x0A => Some(Self::ColorCache),
            0x0C => Some(Self::Sound),
            0x0D => Some(Self::Input),
            0x0E => Some(Self::Font),
            0x0F => Some(Self::Brush),
            0x10 => Some(Self::GlyphCache),
            0x11 => Some(Self::OffscreenBitmapCache),
            0x13 => Some(Self::BitmapCacheRev2),
            0x14 => Some(Self::VirtualChannel),
            _ => None,
        }
    }
}

/// A single TS_*_CAPABILITYSET.
///
/// Sets this client never inspects are preserved as raw bytes so a Demand
/// Active from any server round-trips without loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilitySet {
    General(General),
    Bitmap(Bitmap),
    Order(Order),
    BitmapCacheRev2(BitmapCacheRev2),
    Pointer(Pointer),
    Sound(Sound),
    Input(Input),
    Brush(Brush),
    GlyphCache(GlyphCache),
    OffscreenBitmapCache(OffscreenBitmapCache),
    VirtualChannel(VirtualChannel),
    Share(Share),
    Font(Font),
    ColorCache(ColorCache),
    Control(Control),
    WindowActivation(WindowActivation),
    Unknown { cap_type: u16, data: Vec<u8> },
}

impl CapabilitySet {
    const NAME: &'static str = "CapabilitySet";

    fn cap_type(&self) -> u16 {
        match self {
            Self::General(_) => CapabilitySetType::General as u16,
            Self::Bitmap(_) => CapabilitySetType::Bitmap as u16,
            Self::Order(_) => CapabilitySetType::Order as u16,
            Self::BitmapCacheRev2(_) => CapabilitySetType::BitmapCacheRev2 as u16,
            Self::Pointer(_) => CapabilitySetType::Pointer as u16,
            Self::Sound(_) => CapabilitySetType::Sound as u16,
            Self::Input(_) => CapabilitySetType::Input as u16,
            Self::Brush(_) => CapabilitySetType::Brush as u16,
            Self::GlyphCache(_) => CapabilitySetType::GlyphCache as u16,
            Self::OffscreenBitmapCache(_) => CapabilitySetType::OffscreenBitmapCache as u16,
            Self::VirtualChannel(_) => CapabilitySetType::VirtualChannel as u16,
            Self::Share(_) => CapabilitySetType::Share as u16,
            Self::Font(_) => CapabilitySetType::Font as u16,
            Self::ColorCache(_) => CapabilitySetType::ColorCache as u16,
            Self::Control(_) => CapabilitySetType::Control as u16,
            Self::WindowActivation(_) => CapabilitySetType::WindowActivation as u16,
            Self::Unknown { cap_type, .. } => *cap_type,
        }
    }

    fn content_size(&self) -> usize {
        match self {
            Self::General(set) => set.size(),
            Self::Bitmap(set) => set.size(),
            Self::Order(set) => set.size(),
            Self::BitmapCacheRev2(set) => set.size(),
            Self::Pointer(set) => set.size(),
            Self::Sound(set) => set.size(),
            Self::Input(set) => set.size(),
            Self::Brush(set) => set.size(),
            Self::GlyphCache(set) => set.size(),
            Self::OffscreenBitmapCache(set) => set.size(),
            Self::VirtualChannel(set) => set.size(),
            Self::Share(set) => set.size(),
            Self::Font(set) => set.size(),
            Self::ColorCache(set) => set.size(),
            Self::Control(set) => set.size(),
            Self::WindowActivation(set) => set.size(),
            Self::Unknown { data, .. } => data.len(),
        }
    }
}

impl Encode for CapabilitySet {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.cap_type());
        dst.write_u16(cast_length!(
            "lengthCapability",
            self.content_size() + CAPABILITY_SET_HEADER_SIZE
        )?);

        match self {
            Self::General(set) => set.encode(dst),
            Self::Bitmap(set) => set.encode(dst),
            Self::Order(set) => set.encode(dst),
            Self::BitmapCacheRev2(set) => set.encode(dst),
            Self::Pointer(set) => set.encode(dst),
            Self::Sound(set) => set.encode(dst),
            Self::Input(set) => set.encode(dst),
            Self::Brush(set) => set.encode(dst),
            Self::GlyphCache(set) => set.encode(dst),
            Self::OffscreenBitmapCache(set) => set.encode(dst),
            Self::VirtualChannel(set) => set.encode(dst),
            Self::Share(set) => set.encode(dst),
            Self::Font(set) => set.encode(dst),
            Self::ColorCache(set) => set.encode(dst),
            Self::Control(set) => set.encode(dst),
            Self::WindowActivation(set) => set.encode(dst),
            Self::Unknown { data, .. } => {
                dst.write_slice(data);
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        CAPABILITY_SET_HEADER_SIZE + self.content_size()
    }
}

impl<'de> Decode<'de> for CapabilitySet {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: CAPABILITY_SET_HEADER_SIZE);

        let cap_type = src.read_u16();
        let length = usize::from(src.read_u16());

        let content_length = length.saturating_sub(CAPABILITY_SET_HEADER_SIZE);
        ensure_size!(in: src, size: content_length);
        let mut content = ReadCursor::new(src.read_slice(content_length));

        let set = match CapabilitySetType::from_u16(cap_type) {
            Some(CapabilitySetType::General) => Self::General(General::decode(&mut content)?),
            Some(CapabilitySetType::Bitmap) => Self::Bitmap(Bitmap::decode(&mut content)?),
            Some(CapabilitySetType::Order) => Self::Order(Order::decode(&mut content)?),
            Some(CapabilitySetType::BitmapCacheRev2) => Self::BitmapCacheRev2(BitmapCacheRev2::decode(&mut content)?),
            Some(CapabilitySetType::Pointer) => Self::Pointer(Pointer::decode(&mut content)?),
            Some(CapabilitySetType::Sound) => Self::Sound(Sound::decode(&mut content)?),
            Some(CapabilitySetType::Input) => Self::Input(Input::decode(&mut content)?),
            Some(CapabilitySetType::Brush) => Self::Brush(Brush::decode(&mut content)?),
            Some(CapabilitySetType::GlyphCache) => Self::GlyphCache(GlyphCache::decode(&mut content)?),
            Some(CapabilitySetType::OffscreenBitmapCache) => {
                Self::OffscreenBitmapCache(OffscreenBitmapCache::decode(&mut content)?)
            }
            Some(CapabilitySetType::VirtualChannel) => Self::VirtualChannel(VirtualChannel::decode(&mut content)?),
            Some(CapabilitySetType::Share) => Self::Share(Share::decode(&mut content)?),
            Some(CapabilitySetType::Font) => Self::Font(Font::decode(&mut content)?),
            Some(CapabilitySetType::ColorCache) => Self::ColorCache(ColorCache::decode(&mut content)?),
            Some(CapabilitySetType::Control) => Self::Control(Control::decode(&mut content)?),
            Some(CapabilitySetType::WindowActivation) => Self::WindowActivation(WindowActivation::decode(&mut content)?),
            None => Self::Unknown {
                cap_type,
                data: content.read_remaining().to_vec(),
            },
        };

        Ok(set)
    }
}

/// Server Demand Active PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDemandActive {
    pub share_id: u32,
    pub capability_sets: Vec<CapabilitySet>,
}

impl ServerDemandActive {
    const NAME: &'static str = "ServerDemandActive";

    const FIXED_PART_SIZE: usize = 4 /* shareId */ + 2 /* lenSourceDescriptor */ + 2 /* lenCombinedCapabilities */;
}

impl Encode for ServerDemandActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let combined_length: usize = self.capability_sets.iter().map(Encode::size).sum::<usize>()
            + NUMBER_CAPABILITIES_FIELD_SIZE
            + PADDING_SIZE;

        dst.write_u32(self.share_id);
        dst.write_u16(cast_length!("lenSourceDescriptor", SOURCE_DESCRIPTOR.len())?);
        dst.write_u16(cast_length!("lenCombinedCapabilities", combined_length)?);
        dst.write_slice(SOURCE_DESCRIPTOR);
        dst.write_u16(cast_length!("numberCapabilities", self.capability_sets.len())?);
        write_padding!(dst, 2);

        for set in &self.capability_sets {
            set.encode(dst)?;
        }

        dst.write_u32(0); // sessionId

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + SOURCE_DESCRIPTOR.len()
            + NUMBER_CAPABILITIES_FIELD_SIZE
            + PADDING_SIZE
            + self.capability_sets.iter().map(Encode::size).sum::<usize>()
            + SESSION_ID_FIELD_SIZE
    }
}

impl<'de> Decode<'de> for ServerDemandActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let share_id = src.read_u32();
        let source_descriptor_length = usize::from(src.read_u16());
        let _combined_capabilities_length = usize::from(src.read_u16());

        ensure_size!(ctx: Self::NAME, in: src, size: source_descriptor_length);
        src.advance(source_descriptor_length);

        ensure_size!(ctx: Self::NAME, in: src, size: NUMBER_CAPABILITIES_FIELD_SIZE + PADDING_SIZE);
        let number_capabilities = usize::from(src.read_u16());
        read_padding!(src, 2);

        let capability_sets = (0..number_capabilities)
            .map(|_| CapabilitySet::decode(src))
            .collect::<Result<Vec<_>, _>>()?;

        // An optional trailing session id, which must be ignored.
        if src.len() >= SESSION_ID_FIELD_SIZE {
            src.advance(SESSION_ID_FIELD_SIZE);
        }

        Ok(Self {
            share_id,
            capability_sets,
        })
    }
}

/// Client Confirm Active PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfirmActive {
    pub share_id: u32,
    pub capability_sets: Vec<CapabilitySet>,
}

impl ClientConfirmActive {
    const NAME: &'static str = "ClientConfirmActive";

    const FIXED_PART_SIZE: usize =
        4 /* shareId */ + ORIGINATOR_ID_FIELD_SIZE + 2 /* lenSourceDescriptor */ + 2 /* lenCombinedCapabilities */;
}

impl Encode for ClientConfirmActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let combined_length: usize = self.capability_sets.iter().map(Encode::size).sum::<usize>()
            + NUMBER_CAPABILITIES_FIELD_SIZE
            + PADDING_SIZE;

        dst.write_u32(self.share_id);
        dst.write_u16(SERVER_CHANNEL_ID); // originatorId
        dst.write_u16(cast_length!("lenSourceDescriptor", SOURCE_DESCRIPTOR.len())?);
        dst.write_u16(cast_length!("lenCombinedCapabilities", combined_length)?);
        dst.write_slice(SOURCE_DESCRIPTOR);
        dst.write_u16(cast_length!("numberCapabilities", self.capability_sets.len())?);
        write_padding!(dst, 2);

        for set in &self.capability_sets {
            set.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + SOURCE_DESCRIPTOR.len()
            + NUMBER_CAPABILITIES_FIELD_SIZE
            + PADDING_SIZE
            + self.capability_sets.iter().map(Encode::size).sum::<usize>()
    }
}

impl<'de> Decode<'de> for ClientConfirmActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let share_id = src.read_u32();
        let _originator_id = src.read_u16();
        let source_descriptor_length = usize::from(src.read_u16());
        let _combined_capabilities_length = usize::from(src.read_u16());

        ensure_size!(ctx: Self::NAME, in: src, size: source_descriptor_length);
        src.advance(source_descriptor_length);

        ensure_size!(ctx: Self::NAME, in: src, size: NUMBER_CAPABILITIES_FIELD_SIZE + PADDING_SIZE);
        let number_capabilities = usize::from(src.read_u16());
        read_padding!(src, 2);

        let capability_sets = (0..number_capabilities)
            .map(|_| CapabilitySet::decode(src))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            share_id,
            capability_sets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_core::{decode, encode_vec};

    #[test]
    fn unknown_capability_set_round_trips() {
        let set = CapabilitySet::Unknown {
            cap_type: 0x1C,
            data: vec![0x01, 0x02, 0x03, 0x04],
        };

        let encoded = encode_vec(&set).unwrap();
        assert_eq!(encoded[..4], [0x1C, 0x00, 0x08, 0x00]);

        let decoded: CapabilitySet = decode(&encoded).unwrap();
        assert_eq!(decoded, set);
    }

    #[test]
    fn confirm_active_carries_server_channel_originator() {
        let confirm = ClientConfirmActive {
            share_id: 66538,
            capability_sets: vec![CapabilitySet::Share(Share { node_id: 0 })],
        };

        let encoded = encode_vec(&confirm).unwrap();
        assert_eq!(u16::from_le_bytes([encoded[4], encoded[5]]), 0x03EA);

        let decoded: ClientConfirmActive = decode(&encoded).unwrap();
        assert_eq!(decoded, confirm);
    }
}
