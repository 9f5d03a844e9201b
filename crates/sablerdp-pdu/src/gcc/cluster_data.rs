//! Client Cluster Data block (TS_UD_CS_CLUSTER).

use bitflags::bitflags;
use sablerdp_core::{ensure_fixed_part_size, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RedirectionFlags: u32 {
        const REDIRECTION_SUPPORTED = 0x0000_0001;
        const REDIRECTED_SESSION_FIELD_VALID = 0x0000_0002;
        const REDIRECTED_SMARTCARD = 0x0000_0040;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum RedirectionVersion {
    V1 = 0,
    V2 = 1,
    V3 = 2,
    V4 = 3,
    V5 = 4,
    V6 = 5,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientClusterData {
    pub flags: RedirectionFlags,
    pub redirection_version: RedirectionVersion,
    pub redirected_session_id: u32,
}

impl ClientClusterData {
    const NAME: &'static str = "ClientClusterData";

    const FIXED_PART_SIZE: usize = 4 /* flags */ + 4 /* redirectedSessionId */;

    const REDIRECTION_VERSION_SHIFT: u32 = 2;
}

impl Encode for ClientClusterData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        let flags_with_version =
            self.flags.bits() | ((self.redirection_version as u32) << Self::REDIRECTION_VERSION_SHIFT);

        dst.write_u32(flags_with_version);
        dst.write_u32(self.redirected_session_id);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ClientClusterData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let flags_with_version = src.read_u32();
        let redirected_session_id = src.read_u32();

        let flags = RedirectionFlags::from_bits_truncate(flags_with_version);
        let redirection_version = match (flags_with_version >> Self::REDIRECTION_VERSION_SHIFT) & 0x0F {
            1 => RedirectionVersion::V2,
            2 => RedirectionVersion::V3,
            3 => RedirectionVersion::V4,
            4 => RedirectionVersion::V5,
            5 => RedirectionVersion::V6,
            _ => RedirectionVersion::V1,
        };

        Ok(Self {
            flags,
            redirection_version,
            redirected_session_id,
        })
    }
}
