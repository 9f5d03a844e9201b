//! NTLMv2 per [MS-NLMP]: the NEGOTIATE / CHALLENGE / AUTHENTICATE message
//! exchange, the v2 response computation with an AV-pair target-info list
//! and MIC, and the derived signing/sealing keys used to wrap the
//! subsequent CredSSP tokens.

use rand::rngs::OsRng;
use rand::RngCore as _;
use tracing::debug;

use crate::crypto::{compute_md4, compute_md5, hmac_md5};
use crate::rc4::Rc4;
use crate::{NlaError, NlaResult};

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_MESSAGE_TYPE: u32 = 1;
const CHALLENGE_MESSAGE_TYPE: u32 = 2;
const AUTHENTICATE_MESSAGE_TYPE: u32 = 3;

const NEGOTIATE_MESSAGE_SIZE: usize = 40;
const AUTHENTICATE_HEADER_SIZE: usize = 88;

const CHALLENGE_SIZE: usize = 8;
const SESSION_KEY_SIZE: usize = 16;
const MIC_SIZE: usize = 16;
const LM_RESPONSE_SIZE: usize = 24;

const MESSAGE_SIGNATURE_SIZE: usize = 16;
const MESSAGE_SIGNATURE_VERSION: u32 = 1;

// Windows 10-ish version advertised in the version fields.
const VERSION: [u8; 8] = [0x0A, 0x00, 0x63, 0x45, 0x00, 0x00, 0x00, 0x0F];

// Negotiate flags.
const NTLMSSP_NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NTLMSSP_REQUEST_TARGET: u32 = 0x0000_0004;
const NTLMSSP_NEGOTIATE_SIGN: u32 = 0x0000_0010;
const NTLMSSP_NEGOTIATE_SEAL: u32 = 0x0000_0020;
const NTLMSSP_NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NTLMSSP_NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NTLMSSP_NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
const NTLMSSP_NEGOTIATE_EXTENDED_SESSION_SECURITY: u32 = 0x0008_0000;
const NTLMSSP_NEGOTIATE_VERSION: u32 = 0x0200_0000;
const NTLMSSP_NEGOTIATE_128: u32 = 0x2000_0000;
const NTLMSSP_NEGOTIATE_KEY_EXCH: u32 = 0x4000_0000;
const NTLMSSP_NEGOTIATE_56: u32 = 0x8000_0000;

// AV pair identifiers.
const MSV_AV_EOL: u16 = 0x0000;
const MSV_AV_FLAGS: u16 = 0x0006;
const MSV_AV_TIMESTAMP: u16 = 0x0007;

const MSV_AV_FLAGS_MIC_PRESENT: u32 = 0x0000_0002;

// Key derivation magic constants, NUL terminator included.
const CLIENT_SIGN_MAGIC: &[u8] = b"session key to client-to-server signing key magic constant\0";
const SERVER_SIGN_MAGIC: &[u8] = b"session key to server-to-client signing key magic constant\0";
const CLIENT_SEAL_MAGIC: &[u8] = b"session key to client-to-server sealing key magic constant\0";
const SERVER_SEAL_MAGIC: &[u8] = b"session key to server-to-client sealing key magic constant\0";

// Seconds between 1601-01-01 and the Unix epoch.
const FILETIME_UNIX_OFFSET: u64 = 11_644_473_600;

/// Plain username/password credentials, with an optional domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SecurityStatus {
    /// Send the output token and wait for another input token.
    ContinueNeeded,
    /// The exchange is complete once the output token is sent.
    CompleteNeeded,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum NtlmState {
    Initial,
    NegotiateSent,
    Complete,
}

/// An NTLM client security context.
pub(crate) struct Ntlm {
    identity: AuthIdentity,
    state: NtlmState,
    flags: u32,

    negotiate_message: Vec<u8>,

    send_sign_key: [u8; 16],
    recv_sign_key: [u8; 16],
    send_seal: Option<Rc4>,
    recv_seal: Option<Rc4>,
}

impl Ntlm {
    pub(crate) fn new(identity: AuthIdentity) -> Self {
        Self {
            identity,
            state: NtlmState::Initial,
            flags: 0,
            negotiate_message: Vec::new(),
            send_sign_key: [0; 16],
            recv_sign_key: [0; 16],
            send_seal: None,
            recv_seal: None,
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.state == NtlmState::Complete
    }

    /// Produces the next client token of the exchange.
    ///
    /// The first call takes no input and yields NEGOTIATE; the second takes
    /// the server CHALLENGE and yields AUTHENTICATE.
    pub(crate) fn initialize_security_context(
        &mut self,
        input: Option<&[u8]>,
        output: &mut Vec<u8>,
    ) -> NlaResult<SecurityStatus> {
        match self.state {
            NtlmState::Initial => {
                self.negotiate_message = self.write_negotiate_message();
                output.extend_from_slice(&self.negotiate_message);
                self.state = NtlmState::NegotiateSent;

                Ok(SecurityStatus::ContinueNeeded)
            }
            NtlmState::NegotiateSent => {
                let challenge_message = input.ok_or(NlaError::OutOfSequence("expected a CHALLENGE token"))?;
                let challenge = ChallengeMessage::parse(challenge_message)?;

                debug!(flags = format_args!("{:08x}", challenge.flags), "NTLM challenge received");

                let authenticate = self.write_authenticate_message(&challenge, challenge_message)?;
                output.extend_from_slice(&authenticate);
                self.state = NtlmState::Complete;

                Ok(SecurityStatus::CompleteNeeded)
            }
            NtlmState::Complete => Err(NlaError::OutOfSequence("NTLM exchange is already complete")),
        }
    }

    /// GSS wrap: seals the payload and prepends the message signature.
    pub(crate) fn encrypt_message(&mut self, input: &[u8], sequence_number: u32) -> NlaResult<Vec<u8>> {
        let seal = self
            .send_seal
            .as_mut()
            .ok_or(NlaError::OutOfSequence("sealing before key exchange"))?;

        let sealed = seal.process(input);

        let mut to_sign = sequence_number.to_le_bytes().to_vec();
        to_sign.extend_from_slice(input);
        let checksum = hmac_md5(&self.send_sign_key, &to_sign);
        let sealed_checksum = seal.process(&checksum[..8]);

        let mut out = Vec::with_capacity(MESSAGE_SIGNATURE_SIZE + sealed.len());
        out.extend_from_slice(&MESSAGE_SIGNATURE_VERSION.to_le_bytes());
        out.extend_from_slice(&sealed_checksum);
        out.extend_from_slice(&sequence_number.to_le_bytes());
        out.extend_from_slice(&sealed);

        Ok(out)
    }

    /// GSS unwrap: unseals the payload and verifies the message signature.
    pub(crate) fn decrypt_message(&mut self, input: &[u8], sequence_number: u32) -> NlaResult<Vec<u8>> {
        if input.len() < MESSAGE_SIGNATURE_SIZE {
            return Err(NlaError::InvalidToken {
                name: "sealed message",
                reason: "shorter than the message signature",
            });
        }

        let seal = self
            .recv_seal
            .as_mut()
            .ok_or(NlaError::OutOfSequence("unsealing before key exchange"))?;

        let (signature, sealed) = input.split_at(MESSAGE_SIGNATURE_SIZE);

        // The peer sealed the payload before the checksum; unseal in the
        // same order to keep the RC4 stream in sync.
        let plaintext = seal.process(sealed);
        let expected_checksum = seal.process(&signature[4..12]);

        let version = u32::from_le_bytes(signature[0..4].try_into().expect("slice of 4"));
        if version != MESSAGE_SIGNATURE_VERSION {
            return Err(NlaError::InvalidToken {
                name: "message signature",
                reason: "unsupported version",
            });
        }

        let mut to_sign = sequence_number.to_le_bytes().to_vec();
        to_sign.extend_from_slice(&plaintext);
        let checksum = hmac_md5(&self.recv_sign_key, &to_sign);

        if expected_checksum != checksum[..8] {
            return Err(NlaError::MessageAltered("NTLM message signature mismatch"));
        }

        Ok(plaintext)
    }

    fn write_negotiate_message(&mut self) -> Vec<u8> {
        self.flags = NTLMSSP_NEGOTIATE_UNICODE
            | NTLMSSP_REQUEST_TARGET
            | NTLMSSP_NEGOTIATE_SIGN
            | NTLMSSP_NEGOTIATE_SEAL
            | NTLMSSP_NEGOTIATE_NTLM
            | NTLMSSP_NEGOTIATE_ALWAYS_SIGN
            | NTLMSSP_NEGOTIATE_EXTENDED_SESSION_SECURITY
            | NTLMSSP_NEGOTIATE_VERSION
            | NTLMSSP_NEGOTIATE_128
            | NTLMSSP_NEGOTIATE_KEY_EXCH
            | NTLMSSP_NEGOTIATE_56;

        let mut out = Vec::with_capacity(NEGOTIATE_MESSAGE_SIZE);
        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(&NEGOTIATE_MESSAGE_TYPE.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        // Empty domain and workstation fields, offset past the header.
        write_field(&mut out, 0, NEGOTIATE_MESSAGE_SIZE as u32);
        write_field(&mut out, 0, NEGOTIATE_MESSAGE_SIZE as u32);
        out.extend_from_slice(&VERSION);

        debug_assert_eq!(out.len(), NEGOTIATE_MESSAGE_SIZE);

        out
    }

    fn write_authenticate_message(
        &mut self,
        challenge: &ChallengeMessage<'_>,
        raw_challenge: &[u8],
    ) -> NlaResult<Vec<u8>> {
        let mut client_challenge = [0u8; CHALLENGE_SIZE];
        OsRng.fill_bytes(&mut client_challenge);

        let timestamp = challenge.timestamp.unwrap_or_else(current_filetime);
        let target_info = patch_target_info(challenge.target_info);

        let nt_response = NtlmV2Response::compute(
            &self.identity,
            challenge.server_challenge,
            client_challenge,
            timestamp,
            &target_info,
        );

        // KXKEY == SessionBaseKey for NTLMv2.
        let mut exported_session_key = [0u8; SESSION_KEY_SIZE];
        OsRng.fill_bytes(&mut exported_session_key);
        let encrypted_random_session_key =
            Rc4::new(&nt_response.session_base_key).process(&exported_session_key);

        let domain = utf16_bytes(self.identity.domain.as_deref().unwrap_or(""));
        let user = utf16_bytes(&self.identity.username);
        let workstation: Vec<u8> = Vec::new();

        let lm_response = [0u8; LM_RESPONSE_SIZE];

        // Payload layout: domain, user, workstation, LM response, NT
        // response, encrypted session key.
        let mut offset = AUTHENTICATE_HEADER_SIZE as u32;
        let mut out = Vec::new();

        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(&AUTHENTICATE_MESSAGE_TYPE.to_le_bytes());

        let mut field = |out: &mut Vec<u8>, len: usize| {
            write_field(out, len as u16, offset);
            offset += len as u32;
        };

        field(&mut out, lm_response.len());
        field(&mut out, nt_response.response.len());
        field(&mut out, domain.len());
        field(&mut out, user.len());
        field(&mut out, workstation.len());
        field(&mut out, encrypted_random_session_key.len());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&VERSION);

        let mic_offset = out.len();
        out.extend_from_slice(&[0u8; MIC_SIZE]);

        debug_assert_eq!(out.len(), AUTHENTICATE_HEADER_SIZE);

        // Payload in the same order the fields advertised their offsets.
        out.extend_from_slice(&lm_response);
        out.extend_from_slice(&nt_response.response);
        out.extend_from_slice(&domain);
        out.extend_from_slice(&user);
        out.extend_from_slice(&workstation);
        out.extend_from_slice(&encrypted_random_session_key);

        // MIC = HMAC_MD5(ExportedSessionKey, NEGOTIATE ‖ CHALLENGE ‖
        // AUTHENTICATE-with-zero-MIC).
        let mut mic_input = self.negotiate_message.clone();
        mic_input.extend_from_slice(raw_challenge);
        mic_input.extend_from_slice(&out);
        let mic = hmac_md5(&exported_session_key, &mic_input);
        out[mic_offset..mic_offset + MIC_SIZE].copy_from_slice(&mic);

        // Derive the signing and sealing keys for token wrapping.
        self.send_sign_key = derive_key(&exported_session_key, CLIENT_SIGN_MAGIC);
        self.recv_sign_key = derive_key(&exported_session_key, SERVER_SIGN_MAGIC);
        self.send_seal = Some(Rc4::new(&derive_key(&exported_session_key, CLIENT_SEAL_MAGIC)));
        self.recv_seal = Some(Rc4::new(&derive_key(&exported_session_key, SERVER_SEAL_MAGIC)));

        Ok(out)
    }
}

fn write_field(out: &mut Vec<u8>, len: u16, offset: u32) {
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes()); // maxLen mirrors len
    out.extend_from_slice(&offset.to_le_bytes());
}

struct ChallengeMessage<'a> {
    flags: u32,
    server_challenge: [u8; CHALLENGE_SIZE],
    target_info: &'a [u8],
    timestamp: Option<u64>,
}

impl<'a> ChallengeMessage<'a> {
    fn parse(message: &'a [u8]) -> NlaResult<Self> {
        const HEADER_SIZE: usize = 48;

        if message.len() < HEADER_SIZE {
            return Err(NlaError::InvalidToken {
                name: "CHALLENGE",
                reason: "message is too short",
            });
        }

        if &message[0..8] != SIGNATURE {
            return Err(NlaError::InvalidToken {
                name: "CHALLENGE",
                reason: "bad NTLMSSP signature",
            });
        }

        let message_type = u32::from_le_bytes(message[8..12].try_into().expect("slice of 4"));
        if message_type != CHALLENGE_MESSAGE_TYPE {
            return Err(NlaError::InvalidToken {
                name: "CHALLENGE",
                reason: "unexpected message type",
            });
        }

        let flags = u32::from_le_bytes(message[20..24].try_into().expect("slice of 4"));

        let mut server_challenge = [0u8; CHALLENGE_SIZE];
        server_challenge.copy_from_slice(&message[24..32]);

        let target_info = if flags & NTLMSSP_NEGOTIATE_TARGET_INFO != 0 {
            let len = usize::from(u16::from_le_bytes(message[40..42].try_into().expect("slice of 2")));
            let offset = u32::from_le_bytes(message[44..48].try_into().expect("slice of 4")) as usize;

            if offset + len > message.len() {
                return Err(NlaError::InvalidToken {
                    name: "CHALLENGE",
                    reason: "target info field out of bounds",
                });
            }

            &message[offset..offset + len]
        } else {
            &[]
        };

        let timestamp = find_av_pair(target_info, MSV_AV_TIMESTAMP)
            .filter(|value| value.len() == 8)
            .map(|value| u64::from_le_bytes(value.try_into().expect("slice of 8")));

        Ok(Self {
            flags,
            server_challenge,
            target_info,
            timestamp,
        })
    }
}

fn find_av_pair(target_info: &[u8], wanted: u16) -> Option<&[u8]> {
    let mut pos = 0;

    while pos + 4 <= target_info.len() {
        let id = u16::from_le_bytes([target_info[pos], target_info[pos + 1]]);
        let len = usize::from(u16::from_le_bytes([target_info[pos + 2], target_info[pos + 3]]));
        pos += 4;

        if id == MSV_AV_EOL {
            break;
        }

        if pos + len > target_info.len() {
            break;
        }

        if id == wanted {
            return Some(&target_info[pos..pos + len]);
        }

        pos += len;
    }

    None
}

/// Returns the server's target info with `MsvAvFlags` advertising the MIC,
/// terminated with `MsvAvEOL`.
fn patch_target_info(target_info: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(target_info.len() + 12);
    let mut flags_written = false;

    let mut pos = 0;
    while pos + 4 <= target_info.len() {
        let id = u16::from_le_bytes([target_info[pos], target_info[pos + 1]]);
        let len = usize::from(u16::from_le_bytes([target_info[pos + 2], target_info[pos + 3]]));

        if id == MSV_AV_EOL {
            break;
        }

        if pos + 4 + len > target_info.len() {
            break;
        }

        if id == MSV_AV_FLAGS && len == 4 {
            let existing = u32::from_le_bytes(target_info[pos + 4..pos + 8].try_into().expect("slice of 4"));
            out.extend_from_slice(&MSV_AV_FLAGS.to_le_bytes());
            out.extend_from_slice(&4u16.to_le_bytes());
            out.extend_from_slice(&(existing | MSV_AV_FLAGS_MIC_PRESENT).to_le_bytes());
            flags_written = true;
        } else {
            out.extend_from_slice(&target_info[pos..pos + 4 + len]);
        }

        pos += 4 + len;
    }

    if !flags_written {
        out.extend_from_slice(&MSV_AV_FLAGS.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&MSV_AV_FLAGS_MIC_PRESENT.to_le_bytes());
    }

    // MsvAvEOL
    out.extend_from_slice(&MSV_AV_EOL.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());

    out
}

pub(crate) struct NtlmV2Response {
    pub(crate) response: Vec<u8>,
    pub(crate) session_base_key: [u8; 16],
}

impl NtlmV2Response {
    pub(crate) fn compute(
        identity: &AuthIdentity,
        server_challenge: [u8; CHALLENGE_SIZE],
        client_challenge: [u8; CHALLENGE_SIZE],
        timestamp: u64,
        target_info: &[u8],
    ) -> Self {
        let ntowf = ntowf_v2(identity);

        // The "temp" blob: version, timestamp, client challenge, target info.
        let mut temp = Vec::with_capacity(28 + target_info.len() + 4);
        temp.extend_from_slice(&[0x01, 0x01, 0x00, 0x00]); // RespType, HiRespType, reserved
        temp.extend_from_slice(&[0x00; 4]);
        temp.extend_from_slice(&timestamp.to_le_bytes());
        temp.extend_from_slice(&client_challenge);
        temp.extend_from_slice(&[0x00; 4]);
        temp.extend_from_slice(target_info);
        temp.extend_from_slice(&[0x00; 4]);

        let mut proof_input = server_challenge.to_vec();
        proof_input.extend_from_slice(&temp);
        let nt_proof = hmac_md5(&ntowf, &proof_input);

        let session_base_key = hmac_md5(&ntowf, &nt_proof);

        let mut response = nt_proof.to_vec();
        response.extend_from_slice(&temp);

        Self {
            response,
            session_base_key,
        }
    }
}

/// NTOWFv2: HMAC_MD5 keyed with the MD4 of the password over the uppercased
/// user concatenated with the domain, all little-endian UTF-16.
pub(crate) fn ntowf_v2(identity: &AuthIdentity) -> [u8; 16] {
    let nt_hash = compute_md4(&utf16_bytes(&identity.password));

    let mut user_domain = identity.username.to_uppercase();
    if let Some(domain) = &identity.domain {
        user_domain.push_str(domain);
    }

    hmac_md5(&nt_hash, &utf16_bytes(&user_domain))
}

fn derive_key(exported_session_key: &[u8; 16], magic: &[u8]) -> [u8; 16] {
    let mut input = exported_session_key.to_vec();
    input.extend_from_slice(magic);
    compute_md5(&input)
}

fn utf16_bytes(value: &str) -> Vec<u8> {
    value.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

fn current_filetime() -> u64 {
    let unix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();

    (unix.as_secs() + FILETIME_UNIX_OFFSET) * 10_000_000 + u64::from(unix.subsec_nanos() / 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_identity() -> AuthIdentity {
        AuthIdentity {
            username: "User".to_owned(),
            password: "Password".to_owned(),
            domain: Some("Domain".to_owned()),
        }
    }

    /// Target info of the [MS-NLMP] 4.2 reference: NetBIOS domain "Domain",
    /// NetBIOS server "Server".
    fn reference_target_info() -> Vec<u8> {
        let mut info = Vec::new();
        info.extend_from_slice(&2u16.to_le_bytes()); // MsvAvNbDomainName
        info.extend_from_slice(&12u16.to_le_bytes());
        info.extend_from_slice(&utf16_bytes("Domain"));
        info.extend_from_slice(&1u16.to_le_bytes()); // MsvAvNbComputerName
        info.extend_from_slice(&12u16.to_le_bytes());
        info.extend_from_slice(&utf16_bytes("Server"));
        info.extend_from_slice(&[0u8; 4]); // MsvAvEOL
        info
    }

    #[test]
    fn ntowf_v2_reference_vector() {
        // [MS-NLMP] 4.2.4.1.1
        let hash = ntowf_v2(&reference_identity());
        assert_eq!(
            hash,
            [
                0x0C, 0x86, 0x8A, 0x40, 0x3B, 0xFD, 0x7A, 0x93, 0xA3, 0x00, 0x1E, 0xF2, 0x2E, 0xF0, 0x2E, 0x3F,
            ]
        );
    }

    #[test]
    fn ntlm_v2_response_reference_vector() {
        // [MS-NLMP] 4.2.4: server challenge 0x0123456789ABCDEF, client
        // challenge 0xAA * 8, zero timestamp.
        let response = NtlmV2Response::compute(
            &reference_identity(),
            [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF],
            [0xAA; 8],
            0,
            &reference_target_info(),
        );

        // NTProofStr, [MS-NLMP] 4.2.4.2.2
        assert_eq!(
            response.response[..16],
            [
                0x68, 0xCD, 0x0A, 0xB8, 0x51, 0xE5, 0x1C, 0x96, 0xAA, 0xBC, 0x92, 0x7B, 0xEB, 0xEF, 0x6A, 0x1C,
            ]
        );

        // SessionBaseKey, [MS-NLMP] 4.2.4.1.2
        assert_eq!(
            response.session_base_key,
            [
                0x8D, 0xE4, 0x0C, 0xCA, 0xDB, 0xC1, 0x4A, 0x82, 0xF1, 0x5C, 0xB0, 0xAD, 0x0D, 0xE9, 0x5C, 0xA3,
            ]
        );
    }

    #[test]
    fn negotiate_message_layout() {
        let mut ntlm = Ntlm::new(reference_identity());
        let mut token = Vec::new();
        let status = ntlm.initialize_security_context(None, &mut token).unwrap();

        assert_eq!(status, SecurityStatus::ContinueNeeded);
        assert_eq!(token.len(), NEGOTIATE_MESSAGE_SIZE);
        assert_eq!(&token[0..8], SIGNATURE);
        assert_eq!(u32::from_le_bytes(token[8..12].try_into().unwrap()), 1);

        let flags = u32::from_le_bytes(token[12..16].try_into().unwrap());
        assert_ne!(flags & NTLMSSP_NEGOTIATE_UNICODE, 0);
        assert_ne!(flags & NTLMSSP_NEGOTIATE_KEY_EXCH, 0);
        assert_ne!(flags & NTLMSSP_NEGOTIATE_EXTENDED_SESSION_SECURITY, 0);
    }

    fn reference_challenge_message() -> Vec<u8> {
        let target_info = reference_target_info();

        let mut message = Vec::new();
        message.extend_from_slice(SIGNATURE);
        message.extend_from_slice(&2u32.to_le_bytes());
        // Target name: empty, offset past header.
        message.extend_from_slice(&[0u8; 2]);
        message.extend_from_slice(&[0u8; 2]);
        message.extend_from_slice(&48u32.to_le_bytes());
        message.extend_from_slice(&(NTLMSSP_NEGOTIATE_TARGET_INFO | NTLMSSP_NEGOTIATE_UNICODE).to_le_bytes());
        message.extend_from_slice(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]);
        message.extend_from_slice(&[0u8; 8]); // reserved
        message.extend_from_slice(&(target_info.len() as u16).to_le_bytes());
        message.extend_from_slice(&(target_info.len() as u16).to_le_bytes());
        message.extend_from_slice(&48u32.to_le_bytes());
        message.extend_from_slice(&target_info);

        message
    }

    #[test]
    fn authenticate_message_carries_v2_response_and_mic() {
        let mut ntlm = Ntlm::new(reference_identity());

        let mut negotiate = Vec::new();
        ntlm.initialize_security_context(None, &mut negotiate).unwrap();

        let challenge = reference_challenge_message();
        let mut authenticate = Vec::new();
        let status = ntlm
            .initialize_security_context(Some(&challenge), &mut authenticate)
            .unwrap();

        assert_eq!(status, SecurityStatus::CompleteNeeded);
        assert!(ntlm.is_complete());
        assert_eq!(&authenticate[0..8], SIGNATURE);
        assert_eq!(u32::from_le_bytes(authenticate[8..12].try_into().unwrap()), 3);

        // The NT response field points at a blob starting with the proof
        // (16 bytes) followed by the 0x0101 temp header.
        let nt_len = usize::from(u16::from_le_bytes(authenticate[20..22].try_into().unwrap()));
        let nt_offset = u32::from_le_bytes(authenticate[24..28].try_into().unwrap()) as usize;
        let nt_response = &authenticate[nt_offset..nt_offset + nt_len];
        assert_eq!(&nt_response[16..20], &[0x01, 0x01, 0x00, 0x00]);

        // The MIC is non-zero.
        assert_ne!(&authenticate[72..88], &[0u8; 16]);
    }

    /// A pair of contexts sharing one key, as if the session key exchange
    /// already happened: what one wraps, the other unwraps.
    fn looped_contexts() -> (Ntlm, Ntlm) {
        let session_key = [0x55u8; 16];

        let mut sender = Ntlm::new(reference_identity());
        sender.send_sign_key = derive_key(&session_key, CLIENT_SIGN_MAGIC);
        sender.send_seal = Some(Rc4::new(&derive_key(&session_key, CLIENT_SEAL_MAGIC)));

        let mut receiver = Ntlm::new(reference_identity());
        receiver.recv_sign_key = derive_key(&session_key, CLIENT_SIGN_MAGIC);
        receiver.recv_seal = Some(Rc4::new(&derive_key(&session_key, CLIENT_SEAL_MAGIC)));

        (sender, receiver)
    }

    #[test]
    fn seal_then_unseal_round_trip() {
        let (mut sender, mut receiver) = looped_contexts();

        let plaintext = b"public key bytes";
        let sealed = sender.encrypt_message(plaintext, 0).unwrap();

        assert_eq!(sealed.len(), plaintext.len() + MESSAGE_SIGNATURE_SIZE);
        assert_eq!(u32::from_le_bytes(sealed[0..4].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(sealed[12..16].try_into().unwrap()), 0);

        let opened = receiver.decrypt_message(&sealed, 0).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn tampered_sealed_message_is_detected() {
        let (mut sender, mut receiver) = looped_contexts();

        let mut sealed = sender.encrypt_message(b"public key bytes", 0).unwrap();
        sealed[MESSAGE_SIGNATURE_SIZE] ^= 0x01;

        assert!(matches!(
            receiver.decrypt_message(&sealed, 0),
            Err(NlaError::MessageAltered(_))
        ));
    }
}
