//! Minimal SPNEGO (RFC 4178) framing for the NTLM tokens travelling in
//! TSRequest.negoTokens: a NegTokenInit advertising the NTLM mechanism, and
//! NegTokenResp for every subsequent leg.

use crate::der::{self, DerReader};
use crate::{NlaError, NlaResult};

/// 1.3.6.1.5.5.2
const SPNEGO_OID: &[u8] = &[0x2B, 0x06, 0x01, 0x05, 0x05, 0x02];

/// 1.3.6.1.4.1.311.2.2.10
const NTLMSSP_OID: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x02, 0x0A];

const NTLMSSP_SIGNATURE: &[u8] = b"NTLMSSP\0";

/// Wraps the initial NTLM NEGOTIATE token in a GSS-API framed NegTokenInit.
pub(crate) fn wrap_negotiate(ntlm_token: &[u8]) -> Vec<u8> {
    // NegTokenInit ::= SEQUENCE { mechTypes [0], mechToken [2] }
    let neg_token_init = der::tagged(der::TAG_SEQUENCE, |out| {
        let mech_types = der::tagged(der::context_tag(0), |out| {
            let list = der::tagged(der::TAG_SEQUENCE, |out| {
                der::write_tagged(out, der::TAG_OID, NTLMSSP_OID);
            });
            out.extend_from_slice(&list);
        });
        out.extend_from_slice(&mech_types);

        let mech_token = der::tagged(der::context_tag(2), |out| {
            der::write_octet_string(out, ntlm_token);
        });
        out.extend_from_slice(&mech_token);
    });

    // GSS-API: [APPLICATION 0] { spnego OID, [0] NegTokenInit }
    der::tagged(der::APPLICATION_0, |out| {
        der::write_tagged(out, der::TAG_OID, SPNEGO_OID);
        let wrapped = der::tagged(der::context_tag(0), |out| {
            out.extend_from_slice(&neg_token_init);
        });
        out.extend_from_slice(&wrapped);
    })
}

/// Wraps a follow-up NTLM token (AUTHENTICATE) in a NegTokenResp.
pub(crate) fn wrap_response(ntlm_token: &[u8]) -> Vec<u8> {
    // NegTokenResp ::= SEQUENCE { responseToken [2] }
    let neg_token_resp = der::tagged(der::TAG_SEQUENCE, |out| {
        let response_token = der::tagged(der::context_tag(2), |out| {
            der::write_octet_string(out, ntlm_token);
        });
        out.extend_from_slice(&response_token);
    });

    der::tagged(der::context_tag(1), |out| {
        out.extend_from_slice(&neg_token_resp);
    })
}

/// Extracts the embedded mechanism token from an SPNEGO message.
///
/// Accepts a GSS-framed NegTokenInit, a NegTokenResp, or — as some servers
/// send — a bare NTLMSSP token.
pub(crate) fn unwrap_token(input: &[u8]) -> NlaResult<Vec<u8>> {
    if input.starts_with(NTLMSSP_SIGNATURE) {
        return Ok(input.to_vec());
    }

    let mut reader = DerReader::new(input);

    match reader.peek_tag() {
        Some(der::APPLICATION_0) => {
            let mut app = reader.read_tagged(der::APPLICATION_0)?;
            let oid = app.read_tagged(der::TAG_OID)?;
            if oid.remaining() != SPNEGO_OID {
                return Err(NlaError::InvalidToken {
                    name: "SPNEGO",
                    reason: "unexpected GSS-API mechanism OID",
                });
            }

            let mut init_wrapper = app.read_tagged(der::context_tag(0))?;
            let mut init = init_wrapper.read_sequence()?;

            // Skip mechTypes if present, then expect mechToken.
            if init.peek_tag() == Some(der::context_tag(0)) {
                init.read_tagged(der::context_tag(0))?;
            }
            let mut mech_token = init.read_tagged(der::context_tag(2))?;
            Ok(mech_token.read_octet_string()?.to_vec())
        }
        Some(tag) if tag == der::context_tag(0) || tag == der::context_tag(1) => {
            let mut resp_wrapper = reader.read_tagged(tag)?;
            let mut resp = resp_wrapper.read_sequence()?;

            // negState [0] and supportedMech [1] are optional.
            if resp.peek_tag() == Some(der::context_tag(0)) {
                resp.read_tagged(der::context_tag(0))?;
            }
            if resp.peek_tag() == Some(der::context_tag(1)) {
                resp.read_tagged(der::context_tag(1))?;
            }

            let mut response_token = resp.read_tagged(der::context_tag(2))?;
            Ok(response_token.read_octet_string()?.to_vec())
        }
        _ => Err(NlaError::InvalidToken {
            name: "SPNEGO",
            reason: "not a recognized SPNEGO message",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_wrap_round_trip() {
        let token = b"NTLMSSP\0fake negotiate";
        let wrapped = wrap_negotiate(token);

        assert_eq!(wrapped[0], 0x60);
        assert!(wrapped.windows(NTLMSSP_OID.len()).any(|w| w == NTLMSSP_OID));

        assert_eq!(unwrap_token(&wrapped).unwrap(), token);
    }

    #[test]
    fn response_wrap_round_trip() {
        let token = b"NTLMSSP\0fake authenticate";
        let wrapped = wrap_response(token);

        assert_eq!(wrapped[0], 0xA1);
        assert_eq!(unwrap_token(&wrapped).unwrap(), token);
    }

    #[test]
    fn bare_ntlm_token_passes_through() {
        let token = b"NTLMSSP\0bare";
        assert_eq!(unwrap_token(token).unwrap(), token);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(unwrap_token(&[0x13, 0x37]).is_err());
    }
}
