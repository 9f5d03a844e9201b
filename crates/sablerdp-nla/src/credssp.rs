//! The CredSSP TSRequest ladder of [MS-CSSP].
//!
//! ```asn1
//! TSRequest ::= SEQUENCE {
//!     version     [0] INTEGER,
//!     negoTokens  [1] NegoData    OPTIONAL,
//!     authInfo    [2] OCTET STRING OPTIONAL,
//!     pubKeyAuth  [3] OCTET STRING OPTIONAL,
//!     errorCode   [4] INTEGER     OPTIONAL,
//!     clientNonce [5] OCTET STRING OPTIONAL
//! }
//!
//! NegoData ::= SEQUENCE OF SEQUENCE { negoToken [0] OCTET STRING }
//! ```
//!
//! The client runs three legs: SPNEGO-wrapped NTLM NEGOTIATE, then NTLM
//! AUTHENTICATE together with the sealed TLS public-key binding, then the
//! sealed TSCredentials. The server's pubKeyAuth echo is verified between
//! the last two.

use rand::rngs::OsRng;
use rand::RngCore as _;
use tracing::debug;

use crate::crypto::compute_sha256;
use crate::der::{self, DerReader};
use crate::ntlm::{Ntlm, SecurityStatus};
use crate::{spnego, AuthIdentity, NlaError, NlaResult};

pub const PUB_KEY_AUTH_NONCE_SIZE: usize = 32;

/// The highest CredSSP protocol version this client speaks.
const CLIENT_VERSION: u32 = 6;

/// Servers at version 5 and above bind the public key through a magic-
/// prefixed SHA-256; earlier versions echo the raw key with the first
/// little-endian byte incremented.
const HASH_BINDING_MIN_VERSION: u32 = 5;

const CLIENT_SERVER_HASH_MAGIC: &[u8] = b"CredSSP Client-To-Server Binding Hash\0";
const SERVER_CLIENT_HASH_MAGIC: &[u8] = b"CredSSP Server-To-Client Binding Hash\0";

/// A decoded TSRequest message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsRequest {
    pub version: u32,
    pub nego_tokens: Option<Vec<u8>>,
    pub auth_info: Option<Vec<u8>>,
    pub pub_key_auth: Option<Vec<u8>>,
    pub error_code: Option<u32>,
    pub client_nonce: Option<[u8; PUB_KEY_AUTH_NONCE_SIZE]>,
}

impl TsRequest {
    /// Returns the full frame length of a TSRequest whose first bytes are in
    /// `bytes`, once enough of the header arrived to tell.
    pub fn frame_length(bytes: &[u8]) -> Option<usize> {
        if bytes.len() < 2 {
            return None;
        }

        if bytes[0] != der::TAG_SEQUENCE {
            // Not a TSRequest; report a 1-byte frame and let the decode fail
            // with a proper error.
            return Some(1);
        }

        let first = bytes[1];
        if first & 0x80 == 0 {
            return Some(2 + usize::from(first));
        }

        let num_bytes = usize::from(first & 0x7F);
        if bytes.len() < 2 + num_bytes {
            return None;
        }

        let mut length = 0usize;
        for &byte in &bytes[2..2 + num_bytes] {
            length = (length << 8) | usize::from(byte);
        }

        Some(2 + num_bytes + length)
    }

    pub fn encode(&self) -> Vec<u8> {
        der::tagged(der::TAG_SEQUENCE, |out| {
            let version = der::tagged(der::context_tag(0), |out| {
                der::write_integer(out, self.version);
            });
            out.extend_from_slice(&version);

            if let Some(nego_tokens) = &self.nego_tokens {
                let nego_data = der::tagged(der::context_tag(1), |out| {
                    let list = der::tagged(der::TAG_SEQUENCE, |out| {
                        let item = der::tagged(der::TAG_SEQUENCE, |out| {
                            let token = der::tagged(der::context_tag(0), |out| {
                                der::write_octet_string(out, nego_tokens);
                            });
                            out.extend_from_slice(&token);
                        });
                        out.extend_from_slice(&item);
                    });
                    out.extend_from_slice(&list);
                });
                out.extend_from_slice(&nego_data);
            }

            if let Some(auth_info) = &self.auth_info {
                let field = der::tagged(der::context_tag(2), |out| {
                    der::write_octet_string(out, auth_info);
                });
                out.extend_from_slice(&field);
            }

            if let Some(pub_key_auth) = &self.pub_key_auth {
                let field = der::tagged(der::context_tag(3), |out| {
                    der::write_octet_string(out, pub_key_auth);
                });
                out.extend_from_slice(&field);
            }

            if let Some(error_code) = self.error_code {
                let field = der::tagged(der::context_tag(4), |out| {
                    der::write_integer(out, error_code);
                });
                out.extend_from_slice(&field);
            }

            if let Some(client_nonce) = &self.client_nonce {
                let field = der::tagged(der::context_tag(5), |out| {
                    der::write_octet_string(out, client_nonce);
                });
                out.extend_from_slice(&field);
            }
        })
    }

    pub fn decode(input: &[u8]) -> NlaResult<Self> {
        let mut reader = DerReader::new(input);
        let mut sequence = reader.read_sequence()?;

        let mut request = TsRequest::default();

        let mut version_field = sequence.read_tagged(der::context_tag(0))?;
        request.version = version_field.read_integer()?;

        while !sequence.is_empty() {
            let tag = sequence.peek_tag().ok_or(NlaError::Der("truncated TSRequest"))?;

            match tag {
                t if t == der::context_tag(1) => {
                    let mut nego_data = sequence.read_tagged(t)?;
                    let mut list = nego_data.read_sequence()?;
                    let mut item = list.read_sequence()?;
                    let mut token_field = item.read_tagged(der::context_tag(0))?;
                    request.nego_tokens = Some(token_field.read_octet_string()?.to_vec());
                }
                t if t == der::context_tag(2) => {
                    let mut field = sequence.read_tagged(t)?;
                    request.auth_info = Some(field.read_octet_string()?.to_vec());
                }
                t if t == der::context_tag(3) => {
                    let mut field = sequence.read_tagged(t)?;
                    request.pub_key_auth = Some(field.read_octet_string()?.to_vec());
                }
                t if t == der::context_tag(4) => {
                    let mut field = sequence.read_tagged(t)?;
                    request.error_code = Some(field.read_integer()?);
                }
                t if t == der::context_tag(5) => {
                    let mut field = sequence.read_tagged(t)?;
                    let nonce = field.read_octet_string()?;
                    if nonce.len() != PUB_KEY_AUTH_NONCE_SIZE {
                        return Err(NlaError::InvalidToken {
                            name: "clientNonce",
                            reason: "unexpected nonce length",
                        });
                    }
                    let mut out = [0u8; PUB_KEY_AUTH_NONCE_SIZE];
                    out.copy_from_slice(nonce);
                    request.client_nonce = Some(out);
                }
                _ => return Err(NlaError::Der("unexpected TSRequest field")),
            }
        }

        Ok(request)
    }

    fn check_error(&self) -> NlaResult<()> {
        match self.error_code {
            Some(code) if code >> 30 == 3 => Err(NlaError::from_server_code(code)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CredSspState {
    /// Exchanging SPNEGO/NTLM tokens.
    NegoToken,
    /// NTLM finished; the server's public-key echo is awaited.
    PubKeyAuth,
    /// Credentials delegated; the ladder is complete.
    Final,
}

/// Drives the client side of the CredSSP exchange.
///
/// Feed every server TSRequest to [`CredSspClient::process`]; send each
/// returned TSRequest to the server. The first call takes no input.
pub struct CredSspClient {
    state: CredSspState,
    ntlm: Ntlm,
    identity: AuthIdentity,
    public_key: Vec<u8>,
    client_nonce: [u8; PUB_KEY_AUTH_NONCE_SIZE],
    peer_version: Option<u32>,
    send_seq_num: u32,
    recv_seq_num: u32,
}

impl CredSspClient {
    /// `public_key` is the DER SubjectPublicKey of the TLS leaf certificate.
    pub fn new(public_key: Vec<u8>, identity: AuthIdentity) -> Self {
        let mut client_nonce = [0u8; PUB_KEY_AUTH_NONCE_SIZE];
        OsRng.fill_bytes(&mut client_nonce);

        Self {
            state: CredSspState::NegoToken,
            ntlm: Ntlm::new(identity.clone()),
            identity,
            public_key,
            client_nonce,
            peer_version: None,
            send_seq_num: 0,
            recv_seq_num: 0,
        }
    }

    pub fn state(&self) -> CredSspState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == CredSspState::Final
    }

    /// Advances the ladder, producing the next TSRequest to send (`None`
    /// once the exchange is over).
    pub fn process(&mut self, input: Option<TsRequest>) -> NlaResult<Option<TsRequest>> {
        if let Some(request) = &input {
            request.check_error()?;
            self.peer_version = Some(self.peer_version.unwrap_or(request.version).min(request.version));
        }

        match self.state {
            CredSspState::NegoToken => self.process_nego_token(input),
            CredSspState::PubKeyAuth => self.process_pub_key_echo(input),
            CredSspState::Final => Err(NlaError::OutOfSequence("CredSSP exchange is already done")),
        }
    }

    fn process_nego_token(&mut self, input: Option<TsRequest>) -> NlaResult<Option<TsRequest>> {
        let ntlm_input = match &input {
            Some(request) => {
                let wrapped = request.nego_tokens.as_deref().ok_or(NlaError::InvalidToken {
                    name: "TSRequest",
                    reason: "expected negoTokens",
                })?;
                Some(spnego::unwrap_token(wrapped)?)
            }
            None => None,
        };

        let mut ntlm_output = Vec::new();
        let status = self
            .ntlm
            .initialize_security_context(ntlm_input.as_deref(), &mut ntlm_output)?;

        let mut reply = TsRequest {
            version: CLIENT_VERSION,
            ..TsRequest::default()
        };

        match status {
            SecurityStatus::ContinueNeeded => {
                reply.nego_tokens = Some(spnego::wrap_negotiate(&ntlm_output));
                reply.client_nonce = Some(self.client_nonce);

                debug!("CredSSP: sending NTLM NEGOTIATE");
            }
            SecurityStatus::CompleteNeeded => {
                reply.nego_tokens = Some(spnego::wrap_response(&ntlm_output));
                reply.client_nonce = Some(self.client_nonce);
                reply.pub_key_auth = Some(self.seal_public_key_binding()?);
                self.state = CredSspState::PubKeyAuth;

                debug!("CredSSP: sending NTLM AUTHENTICATE with the public key binding");
            }
        }

        Ok(Some(reply))
    }

    fn process_pub_key_echo(&mut self, input: Option<TsRequest>) -> NlaResult<Option<TsRequest>> {
        let request = input.ok_or(NlaError::OutOfSequence("expected the server pubKeyAuth echo"))?;

        let echo = request.pub_key_auth.as_deref().ok_or(NlaError::InvalidToken {
            name: "TSRequest",
            reason: "expected pubKeyAuth",
        })?;

        self.verify_public_key_echo(echo)?;

        debug!("CredSSP: server public key echo verified; delegating credentials");

        let ts_credentials = write_ts_credentials(&self.identity);
        let sealed = self.seal(&ts_credentials)?;

        self.state = CredSspState::Final;

        Ok(Some(TsRequest {
            version: CLIENT_VERSION,
            auth_info: Some(sealed),
            ..TsRequest::default()
        }))
    }

    fn peer_uses_hash_binding(&self) -> bool {
        self.peer_version.unwrap_or(CLIENT_VERSION) >= HASH_BINDING_MIN_VERSION
    }

    fn seal_public_key_binding(&mut self) -> NlaResult<Vec<u8>> {
        if self.peer_uses_hash_binding() {
            let mut data = CLIENT_SERVER_HASH_MAGIC.to_vec();
            data.extend_from_slice(&self.client_nonce);
            data.extend_from_slice(&self.public_key);

            let hash = compute_sha256(&data);
            self.seal(&hash)
        } else {
            let key = self.public_key.clone();
            self.seal(&key)
        }
    }

    fn verify_public_key_echo(&mut self, sealed_echo: &[u8]) -> NlaResult<()> {
        let echo = self.unseal(sealed_echo)?;

        if self.peer_uses_hash_binding() {
            let mut data = SERVER_CLIENT_HASH_MAGIC.to_vec();
            data.extend_from_slice(&self.client_nonce);
            data.extend_from_slice(&self.public_key);
            let expected = compute_sha256(&data);

            if echo != expected {
                return Err(NlaError::MessageAltered("server public key hash mismatch"));
            }
        } else {
            // Pre-v5 servers return the public key with the first
            // little-endian byte incremented.
            let mut expected = self.public_key.clone();
            integer_increment_le(&mut expected);

            if echo != expected {
                return Err(NlaError::MessageAltered("server public key echo mismatch"));
            }
        }

        Ok(())
    }

    fn seal(&mut self, data: &[u8]) -> NlaResult<Vec<u8>> {
        let sealed = self.ntlm.encrypt_message(data, self.send_seq_num)?;
        self.send_seq_num += 1;
        Ok(sealed)
    }

    fn unseal(&mut self, data: &[u8]) -> NlaResult<Vec<u8>> {
        let opened = self.ntlm.decrypt_message(data, self.recv_seq_num)?;
        self.recv_seq_num += 1;
        Ok(opened)
    }
}

/// TSCredentials with a TSPasswordCreds inside, both DER, strings as
/// little-endian UTF-16.
fn write_ts_credentials(identity: &AuthIdentity) -> Vec<u8> {
    let utf16 = |value: &str| -> Vec<u8> { value.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect() };

    // TSPasswordCreds ::= SEQUENCE {
    //     domainName  [0] OCTET STRING,
    //     userName    [1] OCTET STRING,
    //     password    [2] OCTET STRING
    // }
    let password_creds = der::tagged(der::TAG_SEQUENCE, |out| {
        for (index, value) in [
            identity.domain.as_deref().unwrap_or(""),
            &identity.username,
            &identity.password,
        ]
        .into_iter()
        .enumerate()
        {
            let field = der::tagged(der::context_tag(index as u8), |out| {
                der::write_octet_string(out, &utf16(value));
            });
            out.extend_from_slice(&field);
        }
    });

    // TSCredentials ::= SEQUENCE { credType [0] INTEGER, credentials [1] OCTET STRING }
    der::tagged(der::TAG_SEQUENCE, |out| {
        let cred_type = der::tagged(der::context_tag(0), |out| {
            der::write_integer(out, 1); // TSPasswordCreds
        });
        out.extend_from_slice(&cred_type);

        let credentials = der::tagged(der::context_tag(1), |out| {
            der::write_octet_string(out, &password_creds);
        });
        out.extend_from_slice(&credentials);
    })
}

fn integer_increment_le(buffer: &mut [u8]) {
    for elem in buffer.iter_mut() {
        let (value, overflow) = elem.overflowing_add(1);
        *elem = value;
        if !overflow {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> AuthIdentity {
        AuthIdentity {
            username: "automation".to_owned(),
            password: "hunter2".to_owned(),
            domain: Some("CORP".to_owned()),
        }
    }

    #[test]
    fn ts_request_round_trip_preserves_every_field() {
        let request = TsRequest {
            version: 6,
            nego_tokens: Some(b"NTLMSSP\0token".to_vec()),
            auth_info: Some(vec![0x01, 0x02]),
            pub_key_auth: Some(vec![0x03, 0x04, 0x05]),
            error_code: Some(0xC000_006D),
            client_nonce: Some([0x42; PUB_KEY_AUTH_NONCE_SIZE]),
        };

        let encoded = request.encode();
        let decoded = TsRequest::decode(&encoded).unwrap();

        assert_eq!(decoded, request);
    }

    #[test]
    fn frame_length_matches_encoded_size() {
        let request = TsRequest {
            version: 6,
            nego_tokens: Some(vec![0xAA; 300]),
            ..TsRequest::default()
        };

        let encoded = request.encode();
        assert_eq!(TsRequest::frame_length(&encoded), Some(encoded.len()));

        // Not enough bytes to know yet.
        assert_eq!(TsRequest::frame_length(&encoded[..1]), None);
    }

    #[test]
    fn logon_failure_error_code_maps_to_credentials_rejected() {
        let request = TsRequest {
            version: 6,
            error_code: Some(0xC000_006D),
            ..TsRequest::default()
        };

        assert_eq!(request.check_error(), Err(NlaError::CredentialsRejected));
        assert!(NlaError::CredentialsRejected.is_credentials_rejected());
    }

    #[test]
    fn other_error_codes_are_surfaced_as_server_errors() {
        let request = TsRequest {
            version: 6,
            error_code: Some(0xC000_0001),
            ..TsRequest::default()
        };

        assert!(matches!(request.check_error(), Err(NlaError::ServerError { .. })));
    }

    #[test]
    fn first_leg_is_a_wrapped_negotiate_with_nonce() {
        let mut client = CredSspClient::new(vec![0x30, 0x82, 0x01, 0x0A], identity());

        let first = client.process(None).unwrap().expect("a first leg");

        assert_eq!(first.version, 6);
        assert!(first.nego_tokens.is_some());
        assert!(first.client_nonce.is_some());
        assert!(first.pub_key_auth.is_none());
        assert_eq!(client.state(), CredSspState::NegoToken);
    }

    #[test]
    fn ts_credentials_carries_utf16_password() {
        let credentials = write_ts_credentials(&identity());

        // "hunter2" as little-endian UTF-16.
        let expected: Vec<u8> = "hunter2".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert!(credentials.windows(expected.len()).any(|w| w == expected.as_slice()));
    }
}
