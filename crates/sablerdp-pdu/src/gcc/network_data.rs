//! Client and Server Network Data blocks (TS_UD_CS_NET / TS_UD_SC_NET).

use bitflags::bitflags;
use sablerdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, read_padding, write_padding, Decode, DecodeResult, Encode,
    EncodeResult, ReadCursor, WriteCursor,
};

const CHANNEL_NAME_LEN: usize = 8;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChannelOptions: u32 {
        const INITIALIZED = 0x8000_0000;
        const ENCRYPT_RDP = 0x4000_0000;
        const ENCRYPT_SC = 0x2000_0000;
        const ENCRYPT_CS = 0x1000_0000;
        const PRI_HIGH = 0x0800_0000;
        const PRI_MED = 0x0400_0000;
        const PRI_LOW = 0x0200_0000;
        const COMPRESS_RDP = 0x0080_0000;
        const COMPRESS = 0x0040_0000;
        const SHOW_PROTOCOL = 0x0020_0000;
        const REMOTE_CONTROL_PERSISTENT = 0x0010_0000;
    }
}

/// An up-to-7-byte ANSI channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelName([u8; CHANNEL_NAME_LEN]);

impl ChannelName {
    pub fn new(name: &str) -> Option<Self> {
        if name.len() >= CHANNEL_NAME_LEN || !name.is_ascii() {
            return None;
        }

        let mut bytes = [0u8; CHANNEL_NAME_LEN];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; CHANNEL_NAME_LEN] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDef {
    pub name: ChannelName,
    pub options: ChannelOptions,
}

impl ChannelDef {
    const SIZE: usize = CHANNEL_NAME_LEN + 4;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientNetworkData {
    pub channels: Vec<ChannelDef>,
}

impl ClientNetworkData {
    const NAME: &'static str = "ClientNetworkData";

    const FIXED_PART_SIZE: usize = 4 /* channelCount */;
}

impl Encode for ClientNetworkData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(cast_length!("channelCount", self.channels.len())?);

        for channel in &self.channels {
            dst.write_slice(channel.name.as_bytes());
            dst.write_u32(channel.options.bits());
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.channels.len() * ChannelDef::SIZE
    }
}

impl<'de> Decode<'de> for ClientNetworkData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let channel_count = src.read_u32() as usize;

        ensure_size!(ctx: Self::NAME, in: src, size: channel_count * ChannelDef::SIZE);

        let mut channels = Vec::with_capacity(channel_count);
        for _ in 0..channel_count {
            let mut name = [0u8; CHANNEL_NAME_LEN];
            name.copy_from_slice(src.read_slice(CHANNEL_NAME_LEN));
            let options = ChannelOptions::from_bits_truncate(src.read_u32());

            channels.push(ChannelDef {
                name: ChannelName(name),
                options,
            });
        }

        Ok(Self { channels })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerNetworkData {
    pub io_channel: u16,
    pub channel_ids: Vec<u16>,
}

impl ServerNetworkData {
    const NAME: &'static str = "ServerNetworkData";

    const FIXED_PART_SIZE: usize = 2 /* MCSChannelId */ + 2 /* channelCount */;

    fn has_padding(&self) -> bool {
        self.channel_ids.len() % 2 != 0
    }
}

impl Encode for ServerNetworkData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.io_channel);
        dst.write_u16(cast_length!("channelCount", self.channel_ids.len())?);

        for channel_id in &self.channel_ids {
            dst.write_u16(*channel_id);
        }

        // Keep the block aligned on a 4-byte boundary.
        if self.has_padding() {
            write_padding!(dst, 2);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.channel_ids.len() * 2 + if self.has_padding() { 2 } else { 0 }
    }
}

impl<'de> Decode<'de> for ServerNetworkData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let io_channel = src.read_u16();
        let channel_count = usize::from(src.read_u16());

        ensure_size!(ctx: Self::NAME, in: src, size: channel_count * 2);

        let channel_ids = (0..channel_count).map(|_| src.read_u16()).collect::<Vec<_>>();

        if channel_count % 2 != 0 && src.len() >= 2 {
            read_padding!(src, 2);
        }

        Ok(Self {
            io_channel,
            channel_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_core::{decode, encode_vec};

    #[test]
    fn channel_name_rejects_too_long() {
        assert!(ChannelName::new("rdpdrlong").is_none());
        assert!(ChannelName::new("cliprdr").is_some());
    }

    #[test]
    fn server_network_data_round_trip_with_padding() {
        let data = ServerNetworkData {
            io_channel: 1003,
            channel_ids: vec![1004],
        };

        let encoded = encode_vec(&data).unwrap();
        assert_eq!(encoded.len(), 8); // 2 + 2 + 2 + 2 pad

        let decoded: ServerNetworkData = decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn client_network_data_empty_is_just_count() {
        let data = ClientNetworkData { channels: Vec::new() };
        let encoded = encode_vec(&data).unwrap();
        assert_eq!(encoded, [0, 0, 0, 0]);
    }

    #[test]
    fn invalid_field_is_reported_on_truncated_channel_array() {
        let mut bytes = vec![0xEB, 0x03, 0x02, 0x00, 0xEC, 0x03];
        // Advertises two channels but carries only one.
        let result: Result<ServerNetworkData, _> = decode(&bytes);
        assert!(result.is_err());
        bytes.extend_from_slice(&[0xED, 0x03]);
        let decoded: ServerNetworkData = decode(&bytes).unwrap();
        assert_eq!(decoded.channel_ids, vec![0x03EC, 0x03ED]);
    }
}
