//! Server licensing messages.
//!
//! This client implements the "license error — valid client" short circuit
//! only: the server acknowledges the connection without a licensing exchange
//! by sending an ERROR_ALERT with STATUS_VALID_CLIENT. Any other licensing
//! message is surfaced so the caller can fail the connection.

use sablerdp_core::{
    ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, ReadCursor,
};

use crate::rdp::headers::BasicSecurityHeader;

const ERROR_ALERT_MSG_TYPE: u8 = 0xFF;

const STATUS_VALID_CLIENT: u32 = 0x0000_0007;
const ST_NO_TRANSITION: u32 = 0x0000_0002;

/// The licensing preamble (LICENSE_PREAMBLE).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicensePreamble {
    pub msg_type: u8,
    pub flags: u8,
    pub msg_size: u16,
}

impl LicensePreamble {
    const NAME: &'static str = "LicensePreamble";

    const FIXED_PART_SIZE: usize = 1 /* bMsgType */ + 1 /* flags */ + 2 /* wMsgSize */;
}

impl<'de> Decode<'de> for LicensePreamble {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let msg_type = src.read_u8();
        let flags = src.read_u8();
        let msg_size = src.read_u16();

        Ok(Self {
            msg_type,
            flags,
            msg_size,
        })
    }
}

/// The licensing message following the basic security header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseMessage {
    /// ERROR_ALERT with STATUS_VALID_CLIENT: no licensing exchange required.
    ValidClient,
    /// ERROR_ALERT carrying an actual error.
    ErrorAlert { error_code: u32, state_transition: u32 },
    /// Any other licensing message (new-license or platform-challenge flow).
    Unsupported { msg_type: u8 },
}

impl LicenseMessage {
    const NAME: &'static str = "LicenseMessage";
}

impl<'de> Decode<'de> for LicenseMessage {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let _security_header = BasicSecurityHeader::decode(src)?;

        let preamble = LicensePreamble::decode(src)?;

        if preamble.msg_type != ERROR_ALERT_MSG_TYPE {
            return Ok(Self::Unsupported {
                msg_type: preamble.msg_type,
            });
        }

        // LICENSE_ERROR_MESSAGE
        ensure_size!(ctx: Self::NAME, in: src, size: 4 + 4);
        let error_code = src.read_u32();
        let state_transition = src.read_u32();

        // The trailing error blob (wBlobType, wBlobLen, data) carries nothing
        // useful for the valid-client case.
        if src.len() >= 4 {
            let _blob_type = src.read_u16();
            let blob_len = usize::from(src.read_u16());
            if src.len() < blob_len {
                return Err(invalid_field_err!("bBlobLen", "error blob length out of bounds"));
            }
            src.advance(blob_len);
        }

        if error_code == STATUS_VALID_CLIENT && state_transition == ST_NO_TRANSITION {
            Ok(Self::ValidClient)
        } else {
            Ok(Self::ErrorAlert {
                error_code,
                state_transition,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_core::decode;

    #[test]
    fn valid_client_error_alert_short_circuits() {
        let bytes = [
            0x80, 0x00, 0x00, 0x00, // security header: SEC_LICENSE_PKT
            0xFF, 0x03, 0x10, 0x00, // preamble: ERROR_ALERT, v3, 16 bytes
            0x07, 0x00, 0x00, 0x00, // STATUS_VALID_CLIENT
            0x02, 0x00, 0x00, 0x00, // ST_NO_TRANSITION
            0x28, 0x00, 0x00, 0x00, // error blob: type BB_ERROR_BLOB, len 0
        ];

        let message: LicenseMessage = decode(&bytes).unwrap();
        assert_eq!(message, LicenseMessage::ValidClient);
    }

    #[test]
    fn other_licensing_messages_are_reported() {
        let bytes = [
            0x80, 0x00, 0x00, 0x00, // security header
            0x01, 0x03, 0x04, 0x00, // preamble: LICENSE_REQUEST
        ];

        let message: LicenseMessage = decode(&bytes).unwrap();
        assert_eq!(message, LicenseMessage::Unsupported { msg_type: 0x01 });
    }
}
