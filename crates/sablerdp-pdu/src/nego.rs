//! PDUs used during the Connection Initiation stage.

use bitflags::bitflags;
use sablerdp_core::{
    ensure_size, invalid_field_err, unexpected_message_type_err, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};
use tap::prelude::*;

use crate::tpdu::{TpduCode, TpduHeader};
use crate::tpkt::TpktHeader;
use crate::x224::X224Pdu;

bitflags! {
    /// Flags indicating the supported security protocols, agreed upon during
    /// the Connection Initiation phase.
    ///
    /// Standard RDP security is the absence of any flag (`RDP == 0`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SecurityProtocol: u32 {
        const SSL = 0x0000_0001;
        const HYBRID = 0x0000_0002;
        const RDSTLS = 0x0000_0004;
        const HYBRID_EX = 0x0000_0008;
    }
}

impl SecurityProtocol {
    pub const RDP: Self = Self::empty();

    pub fn is_standard_rdp_security(self) -> bool {
        self.is_empty()
    }
}

bitflags! {
    /// Negotiation protocol flags of the request message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct RequestFlags: u8 {
        const RESTRICTED_ADMIN_MODE_REQUIRED = 0x01;
        const REDIRECTED_AUTHENTICATION_MODE_REQUIRED = 0x02;
        const CORRELATION_INFO_PRESENT = 0x08;
    }
}

bitflags! {
    /// Negotiation protocol flags of the response message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ResponseFlags: u8 {
        const EXTENDED_CLIENT_DATA_SUPPORTED = 0x01;
        const DYNVC_GFX_PROTOCOL_SUPPORTED = 0x02;
        const RDP_NEG_RSP_RESERVED = 0x04;
        const RESTRICTED_ADMIN_MODE_SUPPORTED = 0x08;
        const REDIRECTED_AUTHENTICATION_MODE_SUPPORTED = 0x10;
    }
}

/// The failure code of an RDP Negotiation Failure message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FailureCode(u32);

impl FailureCode {
    pub const SSL_REQUIRED_BY_SERVER: Self = Self(1);
    pub const SSL_NOT_ALLOWED_BY_SERVER: Self = Self(2);
    pub const SSL_CERT_NOT_ON_SERVER: Self = Self(3);
    pub const INCONSISTENT_FLAGS: Self = Self(4);
    pub const HYBRID_REQUIRED_BY_SERVER: Self = Self(5);
    pub const SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER: Self = Self(6);

    pub fn description(self) -> &'static str {
        match self {
            Self::SSL_REQUIRED_BY_SERVER => "TLS security is required by the server",
            Self::SSL_NOT_ALLOWED_BY_SERVER => "TLS security is not allowed by the server",
            Self::SSL_CERT_NOT_ON_SERVER => "no TLS certificate is installed on the server",
            Self::INCONSISTENT_FLAGS => "inconsistent negotiation flags",
            Self::HYBRID_REQUIRED_BY_SERVER => "CredSSP security is required by the server",
            Self::SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER => "TLS with user authentication is required by the server",
            _ => "unknown negotiation failure code",
        }
    }
}

impl From<u32> for FailureCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<FailureCode> for u32 {
    fn from(value: FailureCode) -> Self {
        value.0
    }
}

/// Routing cookie placed in the variable part of the connection request.
///
/// `Cookie: mstshash=<identifier>\r\n`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie(pub String);

impl Cookie {
    const PREFIX: &'static str = "Cookie: mstshash=";

    pub fn read(src: &mut ReadCursor<'_>) -> DecodeResult<Option<Self>> {
        read_nego_data(src, "Cookie", Self::PREFIX)?.map(Self).pipe(Ok)
    }

    pub fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_nego_data(dst, "Cookie", Self::PREFIX, &self.0)
    }

    pub fn size(&self) -> usize {
        Self::PREFIX.len() + self.0.len() + 2
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct NegoMsgType(u8);

impl NegoMsgType {
    const REQUEST: Self = Self(0x01);
    const RESPONSE: Self = Self(0x02);
    const FAILURE: Self = Self(0x03);
}

/// Client X.224 Connection Request PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub cookie: Option<Cookie>,
    pub flags: RequestFlags,
    pub protocol: SecurityProtocol,
}

impl ConnectionRequest {
    const RDP_NEG_REQ_SIZE: usize = 8;
}

impl<'de> X224Pdu<'de> for ConnectionRequest {
    const X224_NAME: &'static str = "Client X.224 Connection Request";

    const TPDU_CODE: TpduCode = TpduCode::CONNECTION_REQUEST;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        if let Some(cookie) = &self.cookie {
            cookie.write(dst)?;
        }

        dst.write_u8(NegoMsgType::REQUEST.0);
        dst.write_u8(self.flags.bits());
        dst.write_u16(Self::RDP_NEG_REQ_SIZE as u16);
        dst.write_u32(self.protocol.bits());

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, _: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        let variable_part_size = tpdu.variable_part_size();

        ensure_size!(ctx: Self::X224_NAME, in: src, size: variable_part_size);

        let cookie = Cookie::read(src)?;

        let cookie_size = cookie.as_ref().map(|c| c.size()).unwrap_or(0);

        let Some(rest) = variable_part_size.checked_sub(cookie_size) else {
            return Err(invalid_field_err(
                Self::X224_NAME,
                "TPDU header variable part",
                "advertised size too small",
            ));
        };

        if rest >= Self::RDP_NEG_REQ_SIZE {
            let msg_type = NegoMsgType(src.read_u8());

            if msg_type != NegoMsgType::REQUEST {
                return Err(unexpected_message_type_err!(Self::X224_NAME, msg_type.0));
            }

            let flags = RequestFlags::from_bits_truncate(src.read_u8());
            let _length = src.read_u16();
            let protocol = SecurityProtocol::from_bits_truncate(src.read_u32());

            Ok(Self { cookie, flags, protocol })
        } else {
            Ok(Self {
                cookie,
                flags: RequestFlags::empty(),
                protocol: SecurityProtocol::RDP,
            })
        }
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        self.cookie.as_ref().map(|c| c.size()).unwrap_or(0) + Self::RDP_NEG_REQ_SIZE
    }

    fn tpdu_user_data_size(&self) -> usize {
        0
    }
}

/// Server X.224 Connection Confirm PDU.
///
/// Carries either the server-selected protocol (type 0x02) or a negotiation
/// failure code (type 0x03). The payload fields are little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfirm {
    Response {
        flags: ResponseFlags,
        protocol: SecurityProtocol,
    },
    Failure {
        code: FailureCode,
    },
}

impl ConnectionConfirm {
    const RDP_NEG_RSP_SIZE: usize = 8;
}

impl<'de> X224Pdu<'de> for ConnectionConfirm {
    const X224_NAME: &'static str = "Server X.224 Connection Confirm";

    const TPDU_CODE: TpduCode = TpduCode::CONNECTION_CONFIRM;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            ConnectionConfirm::Response { flags, protocol } => {
                dst.write_u8(NegoMsgType::RESPONSE.0);
                dst.write_u8(flags.bits());
                dst.write_u16(Self::RDP_NEG_RSP_SIZE as u16);
                dst.write_u32(protocol.bits());
            }
            ConnectionConfirm::Failure { code } => {
                dst.write_u8(NegoMsgType::FAILURE.0);
                dst.write_u8(0);
                dst.write_u16(Self::RDP_NEG_RSP_SIZE as u16);
                dst.write_u32(u32::from(*code));
            }
        }

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, _: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        let variable_part_size = tpdu.variable_part_size();

        ensure_size!(ctx: Self::X224_NAME, in: src, size: variable_part_size);

        if variable_part_size == 0 {
            // Old servers may answer without any RDP_NEG structure; that
            // implies standard RDP security.
            return Ok(Self::Response {
                flags: ResponseFlags::empty(),
                protocol: SecurityProtocol::RDP,
            });
        }

        ensure_size!(ctx: Self::X224_NAME, in: src, size: Self::RDP_NEG_RSP_SIZE);

        match NegoMsgType(src.read_u8()) {
            NegoMsgType::RESPONSE => {
                let flags = ResponseFlags::from_bits_truncate(src.read_u8());
                let _length = src.read_u16();
                let protocol = SecurityProtocol::from_bits_truncate(src.read_u32());

                Ok(Self::Response { flags, protocol })
            }
            NegoMsgType::FAILURE => {
                let _flags = src.read_u8();
                let _length = src.read_u16();
                let code = FailureCode::from(src.read_u32());

                Ok(Self::Failure { code })
            }
            unexpected => Err(unexpected_message_type_err!(Self::X224_NAME, unexpected.0)),
        }
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        Self::RDP_NEG_RSP_SIZE
    }

    fn tpdu_user_data_size(&self) -> usize {
        0
    }
}

fn read_nego_data(src: &mut ReadCursor<'_>, ctx: &'static str, prefix: &str) -> DecodeResult<Option<String>> {
    if src.len() < prefix.len() + 2 {
        return Ok(None);
    }

    if src.peek_slice(prefix.len()) != prefix.as_bytes() {
        return Ok(None);
    }

    src.advance(prefix.len());

    let identifier_start = src.pos();

    while src.peek_u16() != 0x0A0D {
        src.advance(1);
        ensure_size!(ctx: ctx, in: src, size: 2);
    }

    let identifier_end = src.pos();

    src.advance(2);

    let data = core::str::from_utf8(&src.inner()[identifier_start..identifier_end])
        .map_err(|_| invalid_field_err(ctx, "identifier", "not valid UTF-8"))?
        .to_owned();

    Ok(Some(data))
}

fn write_nego_data(dst: &mut WriteCursor<'_>, ctx: &'static str, prefix: &str, value: &str) -> EncodeResult<()> {
    ensure_size!(ctx: ctx, in: dst, size: prefix.len() + value.len() + 2);

    dst.write_slice(prefix.as_bytes());
    dst.write_slice(value.as_bytes());
    dst.write_u16(0x0A0D);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x224::X224;
    use sablerdp_core::{decode, encode_vec};

    #[test]
    fn connection_request_with_cookie_is_correct() {
        let request = X224(ConnectionRequest {
            cookie: Some(Cookie("automation".to_owned())),
            flags: RequestFlags::empty(),
            protocol: SecurityProtocol::SSL | SecurityProtocol::HYBRID,
        });

        let encoded = encode_vec(&request).unwrap();

        // TPKT: version 3, total length
        assert_eq!(encoded[0], 0x03);
        assert_eq!(
            u16::from_be_bytes([encoded[2], encoded[3]]) as usize,
            encoded.len()
        );
        // TPDU: connection request code
        assert_eq!(encoded[5], 0xE0);
        // Routing cookie with CR LF terminator
        let cookie_bytes = b"Cookie: mstshash=automation\r\n";
        assert_eq!(&encoded[11..11 + cookie_bytes.len()], cookie_bytes);
        // RDP_NEG_REQ: type 0x01, length 8, requested protocols
        let nego = &encoded[11 + cookie_bytes.len()..];
        assert_eq!(nego[0], 0x01);
        assert_eq!(u16::from_le_bytes([nego[2], nego[3]]), 8);
        assert_eq!(u32::from_le_bytes([nego[4], nego[5], nego[6], nego[7]]), 0x03);

        let decoded: X224<ConnectionRequest> = decode(&encoded).unwrap();
        assert_eq!(decoded.0, request.0);
    }

    #[test]
    fn connection_confirm_response_selects_protocol() {
        let bytes = [
            0x03, 0x00, 0x00, 0x13, 0x0E, 0xD0, 0x00, 0x00, 0x12, 0x34, 0x00, // header
            0x02, 0x00, 0x08, 0x00, 0x02, 0x00, 0x00, 0x00, // RDP_NEG_RSP, HYBRID
        ];

        let confirm: X224<ConnectionConfirm> = decode(&bytes).unwrap();

        match confirm.0 {
            ConnectionConfirm::Response { protocol, .. } => {
                assert_eq!(protocol, SecurityProtocol::HYBRID);
            }
            _ => panic!("expected a response"),
        }
    }

    #[test]
    fn connection_confirm_failure_carries_code() {
        let bytes = [
            0x03, 0x00, 0x00, 0x13, 0x0E, 0xD0, 0x00, 0x00, 0x12, 0x34, 0x00, // header
            0x03, 0x00, 0x08, 0x00, 0x05, 0x00, 0x00, 0x00, // RDP_NEG_FAILURE
        ];

        let confirm: X224<ConnectionConfirm> = decode(&bytes).unwrap();

        match confirm.0 {
            ConnectionConfirm::Failure { code } => {
                assert_eq!(code, FailureCode::HYBRID_REQUIRED_BY_SERVER);
            }
            _ => panic!("expected a failure"),
        }
    }
}
