//! Client and Server Core Data blocks (TS_UD_CS_CORE / TS_UD_SC_CORE).

use bitflags::bitflags;
use sablerdp_core::{
    ensure_fixed_part_size, ensure_size, read_padding, write_padding, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};

use crate::nego::SecurityProtocol;
use crate::utf16;

const CLIENT_NAME_FIELD_SIZE: usize = 32;
const IME_FILE_NAME_FIELD_SIZE: usize = 64;
const DIG_PRODUCT_ID_FIELD_SIZE: usize = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RdpVersion(pub u32);

impl RdpVersion {
    pub const V4: Self = Self(0x0008_0001);
    pub const V5_PLUS: Self = Self(0x0008_0004);
    pub const V10: Self = Self(0x0008_0005);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum ColorDepth {
    Bpp4 = 0xCA00,
    Bpp8 = 0xCA01,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum SecureAccessSequence {
    Del = 0xAA03,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum HighColorDepth {
    Bpp4 = 4,
    Bpp8 = 8,
    Bpp15 = 15,
    Bpp16 = 16,
    Bpp24 = 24,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SupportedColorDepths: u16 {
        const BPP24 = 0x01;
        const BPP16 = 0x02;
        const BPP15 = 0x04;
        const BPP32 = 0x08;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientEarlyCapabilityFlags: u16 {
        const SUPPORT_ERR_INFO_PDU = 0x0001;
        const WANT_32_BPP_SESSION = 0x0002;
        const SUPPORT_STATUS_INFO_PDU = 0x0004;
        const STRONG_ASYMMETRIC_KEYS = 0x0008;
        const VALID_CONNECTION_TYPE = 0x0020;
        const SUPPORT_MONITOR_LAYOUT_PDU = 0x0040;
        const SUPPORT_NET_CHAR_AUTODETECT = 0x0080;
        const SUPPORT_DYN_VC_GFX_PROTOCOL = 0x0100;
        const SUPPORT_DYNAMIC_TIME_ZONE = 0x0200;
        const SUPPORT_HEARTBEAT_PDU = 0x0400;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionType {
    NotUsed = 0x00,
    Modem = 0x01,
    BroadbandLow = 0x02,
    Satellite = 0x03,
    BroadbandHigh = 0x04,
    Wan = 0x05,
    Lan = 0x06,
    AutoDetect = 0x07,
}

/// TS_UD_CS_CORE with the optional fields this client always sends,
/// through `serverSelectedProtocol`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCoreData {
    pub version: RdpVersion,
    pub desktop_width: u16,
    pub desktop_height: u16,
    pub keyboard_layout: u32,
    pub client_build: u32,
    /// Truncated to 15 characters on the wire.
    pub client_name: String,
    pub keyboard_type: u32,
    pub keyboard_subtype: u32,
    pub keyboard_functional_keys_count: u32,
    pub ime_file_name: String,
    pub high_color_depth: HighColorDepth,
    pub supported_color_depths: SupportedColorDepths,
    pub early_capability_flags: ClientEarlyCapabilityFlags,
    pub dig_product_id: String,
    pub connection_type: ConnectionType,
    pub server_selected_protocol: SecurityProtocol,
}

impl ClientCoreData {
    const NAME: &'static str = "ClientCoreData";

    const FIXED_PART_SIZE: usize = 4 /* version */
        + 2 /* width */ + 2 /* height */
        + 2 /* colorDepth */ + 2 /* SASSequence */
        + 4 /* keyboardLayout */ + 4 /* clientBuild */
        + CLIENT_NAME_FIELD_SIZE
        + 4 /* keyboardType */ + 4 /* keyboardSubType */ + 4 /* keyboardFunctionKey */
        + IME_FILE_NAME_FIELD_SIZE
        + 2 /* postBeta2ColorDepth */ + 2 /* clientProductId */ + 4 /* serialNumber */
        + 2 /* highColorDepth */ + 2 /* supportedColorDepths */ + 2 /* earlyCapabilityFlags */
        + DIG_PRODUCT_ID_FIELD_SIZE
        + 1 /* connectionType */ + 1 /* pad1octet */
        + 4 /* serverSelectedProtocol */;
}

impl Encode for ClientCoreData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.version.0);
        dst.write_u16(self.desktop_width);
        dst.write_u16(self.desktop_height);
        // Ignored by modern servers in favor of the high color depth below.
        dst.write_u16(ColorDepth::Bpp8 as u16);
        dst.write_u16(SecureAccessSequence::Del as u16);
        dst.write_u32(self.keyboard_layout);
        dst.write_u32(self.client_build);
        utf16::write_fixed_utf16(dst, &self.client_name, CLIENT_NAME_FIELD_SIZE);
        dst.write_u32(self.keyboard_type);
        dst.write_u32(self.keyboard_subtype);
        dst.write_u32(self.keyboard_functional_keys_count);
        utf16::write_fixed_utf16(dst, &self.ime_file_name, IME_FILE_NAME_FIELD_SIZE);
        dst.write_u16(ColorDepth::Bpp8 as u16); // postBeta2ColorDepth
        dst.write_u16(1); // clientProductId
        dst.write_u32(0); // serialNumber
        dst.write_u16(self.high_color_depth as u16);
        dst.write_u16(self.supported_color_depths.bits());
        dst.write_u16(self.early_capability_flags.bits());
        utf16::write_fixed_utf16(dst, &self.dig_product_id, DIG_PRODUCT_ID_FIELD_SIZE);
        dst.write_u8(self.connection_type as u8);
        write_padding!(dst, 1);
        dst.write_u32(self.server_selected_protocol.bits());

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ClientCoreData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = RdpVersion(src.read_u32());
        let desktop_width = src.read_u16();
        let desktop_height = src.read_u16();
        let _color_depth = src.read_u16();
        let _sas_sequence = src.read_u16();
        let keyboard_layout = src.read_u32();
        let client_build = src.read_u32();
        let client_name = utf16::read_fixed_utf16(src, CLIENT_NAME_FIELD_SIZE);
        let keyboard_type = src.read_u32();
        let keyboard_subtype = src.read_u32();
        let keyboard_functional_keys_count = src.read_u32();
        let ime_file_name = utf16::read_fixed_utf16(src, IME_FILE_NAME_FIELD_SIZE);
        let _post_beta2_color_depth = src.read_u16();
        let _client_product_id = src.read_u16();
        let _serial_number = src.read_u32();
        let high_color_depth = match src.read_u16() {
            4 => HighColorDepth::Bpp4,
            8 => HighColorDepth::Bpp8,
            15 => HighColorDepth::Bpp15,
            16 => HighColorDepth::Bpp16,
            _ => HighColorDepth::Bpp24,
        };
        let supported_color_depths = SupportedColorDepths::from_bits_truncate(src.read_u16());
        let early_capability_flags = ClientEarlyCapabilityFlags::from_bits_truncate(src.read_u16());
        let dig_product_id = utf16::read_fixed_utf16(src, DIG_PRODUCT_ID_FIELD_SIZE);
        let connection_type = match src.read_u8() {
            0x01 => ConnectionType::Modem,
            0x02 => ConnectionType::BroadbandLow,
            0x03 => ConnectionType::Satellite,
            0x04 => ConnectionType::BroadbandHigh,
            0x05 => ConnectionType::Wan,
            0x06 => ConnectionType::Lan,
            0x07 => ConnectionType::AutoDetect,
            _ => ConnectionType::NotUsed,
        };
        read_padding!(src, 1);
        let server_selected_protocol = SecurityProtocol::from_bits_truncate(src.read_u32());

        Ok(Self {
            version,
            desktop_width,
            desktop_height,
            keyboard_layout,
            client_build,
            client_name,
            keyboard_type,
            keyboard_subtype,
            keyboard_functional_keys_count,
            ime_file_name,
            high_color_depth,
            supported_color_depths,
            early_capability_flags,
            dig_product_id,
            connection_type,
            server_selected_protocol,
        })
    }
}

/// TS_UD_SC_CORE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCoreData {
    pub version: RdpVersion,
    pub client_requested_protocols: Option<SecurityProtocol>,
    pub early_capability_flags: Option<u32>,
}

impl ServerCoreData {
    const NAME: &'static str = "ServerCoreData";

    const FIXED_PART_SIZE: usize = 4 /* version */;
}

impl Encode for ServerCoreData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.version.0);

        if let Some(protocols) = self.client_requested_protocols {
            dst.write_u32(protocols.bits());
        }
        if let Some(flags) = self.early_capability_flags {
            dst.write_u32(flags);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + self.client_requested_protocols.map_or(0, |_| 4)
            + self.early_capability_flags.map_or(0, |_| 4)
    }
}

impl<'de> Decode<'de> for ServerCoreData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = RdpVersion(src.read_u32());

        let client_requested_protocols = if src.len() >= 4 {
            Some(SecurityProtocol::from_bits_truncate(src.read_u32()))
        } else {
            None
        };

        let early_capability_flags = if src.len() >= 4 { Some(src.read_u32()) } else { None };

        Ok(Self {
            version,
            client_requested_protocols,
            early_capability_flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_core::{decode, encode_vec};

    fn client_core_data() -> ClientCoreData {
        ClientCoreData {
            version: RdpVersion::V5_PLUS,
            desktop_width: 1280,
            desktop_height: 800,
            keyboard_layout: 0,
            client_build: 18363,
            client_name: "sable".to_owned(),
            keyboard_type: 4, // IBM enhanced
            keyboard_subtype: 0,
            keyboard_functional_keys_count: 12,
            ime_file_name: String::new(),
            high_color_depth: HighColorDepth::Bpp24,
            supported_color_depths: SupportedColorDepths::BPP24 | SupportedColorDepths::BPP16,
            early_capability_flags: ClientEarlyCapabilityFlags::SUPPORT_ERR_INFO_PDU,
            dig_product_id: String::new(),
            connection_type: ConnectionType::Lan,
            server_selected_protocol: SecurityProtocol::HYBRID,
        }
    }

    #[test]
    fn client_core_data_round_trip() {
        let data = client_core_data();

        let encoded = encode_vec(&data).unwrap();
        assert_eq!(encoded.len(), data.size());

        // Version, width, height at the head of the block.
        assert_eq!(u32::from_le_bytes(encoded[0..4].try_into().unwrap()), 0x0008_0004);
        assert_eq!(u16::from_le_bytes(encoded[4..6].try_into().unwrap()), 1280);
        assert_eq!(u16::from_le_bytes(encoded[6..8].try_into().unwrap()), 800);

        let decoded: ClientCoreData = decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn server_core_data_without_optional_fields() {
        let encoded = 0x0008_0004u32.to_le_bytes();
        let decoded: ServerCoreData = decode(&encoded).unwrap();

        assert_eq!(decoded.version, RdpVersion::V5_PLUS);
        assert_eq!(decoded.client_requested_protocols, None);
    }
}
