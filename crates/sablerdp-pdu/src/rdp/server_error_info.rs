//! Server Set Error Info PDU (TS_SET_ERROR_INFO_PDU).

use sablerdp_core::{ensure_fixed_part_size, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ErrorInfo(pub u32);

impl ErrorInfo {
    pub const NONE: Self = Self(0x0000_0000);
    pub const RPC_INITIATED_DISCONNECT: Self = Self(0x0000_0001);
    pub const RPC_INITIATED_LOGOFF: Self = Self(0x0000_0002);
    pub const IDLE_TIMEOUT: Self = Self(0x0000_0003);
    pub const LOGON_TIMEOUT: Self = Self(0x0000_0004);
    pub const DISCONNECTED_BY_OTHER_CONNECTION: Self = Self(0x0000_0005);
    pub const OUT_OF_MEMORY: Self = Self(0x0000_0006);
    pub const SERVER_DENIED_CONNECTION: Self = Self(0x0000_0007);
    pub const SERVER_INSUFFICIENT_PRIVILEGES: Self = Self(0x0000_0009);
    pub const SERVER_FRESH_CREDENTIALS_REQUIRED: Self = Self(0x0000_000A);
    pub const RPC_INITIATED_DISCONNECT_BY_USER: Self = Self(0x0000_000B);
    pub const LOGOFF_BY_USER: Self = Self(0x0000_000C);

    pub fn is_error(self) -> bool {
        self != Self::NONE
    }

    pub fn description(self) -> String {
        let known = match self {
            Self::NONE => Some("no error"),
            Self::RPC_INITIATED_DISCONNECT => Some("the disconnection was initiated by an administrative tool"),
            Self::RPC_INITIATED_LOGOFF => Some("the logoff was initiated by an administrative tool"),
            Self::IDLE_TIMEOUT => Some("the idle session time limit elapsed"),
            Self::LOGON_TIMEOUT => Some("the active session time limit elapsed"),
            Self::DISCONNECTED_BY_OTHER_CONNECTION => Some("another user connected to the session"),
            Self::OUT_OF_MEMORY => Some("the server ran out of memory"),
            Self::SERVER_DENIED_CONNECTION => Some("the server denied the connection"),
            Self::SERVER_INSUFFICIENT_PRIVILEGES => Some("insufficient privileges for this session"),
            Self::SERVER_FRESH_CREDENTIALS_REQUIRED => Some("the server requires fresh credentials"),
            Self::RPC_INITIATED_DISCONNECT_BY_USER => Some("the disconnection was initiated on behalf of the user"),
            Self::LOGOFF_BY_USER => Some("the user logged off"),
            _ => None,
        };

        match known {
            Some(description) => description.to_owned(),
            None => format!("server error info 0x{:08X}", self.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSetErrorInfoPdu(pub ErrorInfo);

impl ServerSetErrorInfoPdu {
    const NAME: &'static str = "ServerSetErrorInfoPdu";

    const FIXED_PART_SIZE: usize = 4;
}

impl Encode for ServerSetErrorInfoPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.0 .0);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ServerSetErrorInfoPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self(ErrorInfo(src.read_u32())))
    }
}
