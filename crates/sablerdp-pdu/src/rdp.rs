//! The RDP-proper PDUs above MCS: the Share Control / Share Data envelope,
//! Client Info, Security Exchange, capability sets, licensing, finalization.

use sablerdp_core::{
    cast_length, ensure_size, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

pub mod capability_sets;
pub mod client_info;
pub mod finalization_messages;
pub mod headers;
pub mod refresh_rectangle;
pub mod server_error_info;
pub mod server_license;
pub mod suppress_output;

use self::client_info::ClientInfo;
use self::headers::{BasicSecurityHeader, BasicSecurityHeaderFlags};

/// Client Info PDU: a basic security header with `INFO_PKT` followed by the
/// TS_INFO_PACKET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfoPdu {
    pub security_header: BasicSecurityHeader,
    pub client_info: ClientInfo,
}

impl ClientInfoPdu {
    const NAME: &'static str = "ClientInfoPDU";

    pub fn new(client_info: ClientInfo) -> Self {
        Self {
            security_header: BasicSecurityHeader {
                flags: BasicSecurityHeaderFlags::INFO_PKT,
            },
            client_info,
        }
    }
}

impl Encode for ClientInfoPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        self.security_header.encode(dst)?;
        self.client_info.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        self.security_header.size() + self.client_info.size()
    }
}

impl<'de> Decode<'de> for ClientInfoPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let security_header = BasicSecurityHeader::decode(src)?;
        let client_info = ClientInfo::decode(src)?;

        Ok(Self {
            security_header,
            client_info,
        })
    }
}

/// Security Exchange PDU, sent only under Standard RDP Security: the client
/// random encrypted with the server's RSA public key, padded with 8 zero
/// bytes per [MS-RDPBCGR].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityExchangePdu {
    pub encrypted_client_random: Vec<u8>,
}

impl SecurityExchangePdu {
    const NAME: &'static str = "SecurityExchangePDU";

    const FIXED_PART_SIZE: usize = BasicSecurityHeader::FIXED_PART_SIZE + 4 /* length */;

    const PADDING: usize = 8;
}

impl Encode for SecurityExchangePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        BasicSecurityHeader {
            flags: BasicSecurityHeaderFlags::EXCHANGE_PKT,
        }
        .encode(dst)?;

        dst.write_u32(cast_length!(
            "length",
            self.encrypted_client_random.len() + Self::PADDING
        )?);
        dst.write_slice(&self.encrypted_client_random);
        sablerdp_core::write_padding(dst, Self::PADDING);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.encrypted_client_random.len() + Self::PADDING
    }
}

impl<'de> Decode<'de> for SecurityExchangePdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let _header = BasicSecurityHeader::decode(src)?;

        ensure_size!(ctx: Self::NAME, in: src, size: 4);
        let length = src.read_u32() as usize;

        ensure_size!(ctx: Self::NAME, in: src, size: length);
        let encrypted_client_random = src.read_slice(length.saturating_sub(Self::PADDING)).to_vec();
        sablerdp_core::read_padding(src, Self::PADDING.min(length));

        Ok(Self {
            encrypted_client_random,
        })
    }
}
