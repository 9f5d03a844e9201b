//! Client and Server Security Data blocks (TS_UD_CS_SEC / TS_UD_SC_SEC1).

use bitflags::bitflags;
use num_bigint::BigUint;
use sablerdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};

pub const SERVER_RANDOM_LEN: usize = 32;

const PROPRIETARY_CERTIFICATE_VERSION: u32 = 1;
const RSA_KEY_MAGIC: u32 = 0x3141_5352; // "RSA1"
const BB_RSA_KEY_BLOB: u16 = 0x0006;
const RSA_EXCHANGE_ALGORITHM: u32 = 0x0000_0001;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EncryptionMethod: u32 {
        const BIT_40 = 0x0000_0001;
        const BIT_128 = 0x0000_0002;
        const BIT_56 = 0x0000_0008;
        const FIPS = 0x0000_0010;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum EncryptionLevel {
    None = 0,
    Low = 1,
    ClientCompatible = 2,
    High = 3,
    Fips = 4,
}

impl EncryptionLevel {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Low),
            2 => Some(Self::ClientCompatible),
            3 => Some(Self::High),
            4 => Some(Self::Fips),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSecurityData {
    pub encryption_methods: EncryptionMethod,
    pub ext_encryption_methods: u32,
}

impl ClientSecurityData {
    const NAME: &'static str = "ClientSecurityData";

    const FIXED_PART_SIZE: usize = 4 /* encryptionMethods */ + 4 /* extEncryptionMethods */;

    pub fn no_security() -> Self {
        Self {
            encryption_methods: EncryptionMethod::empty(),
            ext_encryption_methods: 0,
        }
    }
}

impl Encode for ClientSecurityData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.encryption_methods.bits());
        dst.write_u32(self.ext_encryption_methods);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ClientSecurityData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let encryption_methods = EncryptionMethod::from_bits_truncate(src.read_u32());
        let ext_encryption_methods = src.read_u32();

        Ok(Self {
            encryption_methods,
            ext_encryption_methods,
        })
    }
}

/// The server's RSA public key, from the proprietary server certificate.
///
/// The modulus is kept in the wire's little-endian order; it is consumed by
/// the Security Exchange encryption which produces a little-endian result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    pub public_exponent: u32,
    pub modulus: Vec<u8>,
}

impl RsaPublicKey {
    /// `input^e mod n`, little-endian in and out, padded to the key length.
    pub fn encrypt(&self, input: &[u8]) -> Vec<u8> {
        let modulus = BigUint::from_bytes_le(&self.modulus);
        let exponent = BigUint::from(self.public_exponent);
        let message = BigUint::from_bytes_le(input);

        let mut encrypted = message.modpow(&exponent, &modulus).to_bytes_le();
        encrypted.resize(self.modulus.len(), 0);

        encrypted
    }
}

/// Server certificate carried in TS_UD_SC_SEC1.
///
/// Only the proprietary (version 1) certificate is supported; it is the one
/// servers send when Enhanced RDP Security is not in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCertificate {
    pub public_key: RsaPublicKey,
}

impl ServerCertificate {
    const NAME: &'static str = "ServerCertificate";

    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: 4 + 4 + 4 + 2 + 2);

        let version = src.read_u32();
        if version & 0x7FFF_FFFF != PROPRIETARY_CERTIFICATE_VERSION {
            return Err(invalid_field_err!("dwVersion", "unsupported server certificate version"));
        }

        let _sig_alg_id = src.read_u32();
        let key_alg_id = src.read_u32();
        if key_alg_id != RSA_EXCHANGE_ALGORITHM {
            return Err(invalid_field_err!("dwKeyAlgId", "unexpected key algorithm"));
        }

        let blob_type = src.read_u16();
        if blob_type != BB_RSA_KEY_BLOB {
            return Err(invalid_field_err!("wPublicKeyBlobType", "expected an RSA key blob"));
        }

        let blob_len = usize::from(src.read_u16());
        ensure_size!(ctx: Self::NAME, in: src, size: blob_len);
        let mut blob = ReadCursor::new(src.read_slice(blob_len));

        ensure_size!(ctx: Self::NAME, in: blob, size: 4 * 5);
        let magic = blob.read_u32();
        if magic != RSA_KEY_MAGIC {
            return Err(invalid_field_err!("magic", "invalid RSA public key magic"));
        }

        let keylen = blob.read_u32() as usize;
        let _bitlen = blob.read_u32();
        let _datalen = blob.read_u32();
        let public_exponent = blob.read_u32();

        ensure_size!(ctx: Self::NAME, in: blob, size: keylen);
        // The blob pads the modulus with 8 zero bytes at the high end.
        let modulus = blob.read_slice(keylen);
        let modulus = modulus[..keylen.saturating_sub(8)].to_vec();

        // The signature blob trailing the key is not verified: the
        // certificate chain this library trusts is the TLS one.

        Ok(Self {
            public_key: RsaPublicKey {
                public_exponent,
                modulus,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSecurityData {
    pub encryption_method: EncryptionMethod,
    pub encryption_level: EncryptionLevel,
    pub server_random: Option<[u8; SERVER_RANDOM_LEN]>,
    pub server_cert: Option<ServerCertificate>,
    /// The raw certificate blob, kept for diagnostics.
    pub server_cert_blob: Vec<u8>,
}

impl ServerSecurityData {
    const NAME: &'static str = "ServerSecurityData";

    const FIXED_PART_SIZE: usize = 4 /* encryptionMethod */ + 4 /* encryptionLevel */;

    pub fn no_security() -> Self {
        Self {
            encryption_method: EncryptionMethod::empty(),
            encryption_level: EncryptionLevel::None,
            server_random: None,
            server_cert: None,
            server_cert_blob: Vec::new(),
        }
    }
}

impl Encode for ServerSecurityData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.encryption_method.bits());
        dst.write_u32(self.encryption_level as u32);

        if self.server_random.is_some() || !self.server_cert_blob.is_empty() {
            let random_len = self.server_random.map_or(0, |r| r.len());
            dst.write_u32(cast_length!("serverRandomLen", random_len)?);
            dst.write_u32(cast_length!("serverCertLen", self.server_cert_blob.len())?);

            if let Some(random) = &self.server_random {
                dst.write_slice(random);
            }
            dst.write_slice(&self.server_cert_blob);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let mut size = Self::FIXED_PART_SIZE;

        if self.server_random.is_some() || !self.server_cert_blob.is_empty() {
            size += 4 + 4 + self.server_random.map_or(0, |r| r.len()) + self.server_cert_blob.len();
        }

        size
    }
}

impl<'de> Decode<'de> for ServerSecurityData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let encryption_method = EncryptionMethod::from_bits_truncate(src.read_u32());
        let encryption_level = EncryptionLevel::from_u32(src.read_u32())
            .ok_or_else(|| invalid_field_err!("encryptionLevel", "invalid encryption level"))?;

        if encryption_method.is_empty() && encryption_level == EncryptionLevel::None {
            return Ok(Self {
                encryption_method,
                encryption_level,
                server_random: None,
                server_cert: None,
                server_cert_blob: Vec::new(),
            });
        }

        ensure_size!(ctx: Self::NAME, in: src, size: 4 + 4);
        let random_len = src.read_u32() as usize;
        let cert_len = src.read_u32() as usize;

        if random_len != SERVER_RANDOM_LEN {
            return Err(invalid_field_err!("serverRandomLen", "unexpected server random length"));
        }

        ensure_size!(ctx: Self::NAME, in: src, size: random_len + cert_len);

        let mut server_random = [0u8; SERVER_RANDOM_LEN];
        server_random.copy_from_slice(src.read_slice(random_len));

        let server_cert_blob = src.read_slice(cert_len).to_vec();
        let server_cert = if server_cert_blob.is_empty() {
            None
        } else {
            Some(ServerCertificate::decode(&mut ReadCursor::new(&server_cert_blob))?)
        };

        Ok(Self {
            encryption_method,
            encryption_level,
            server_random: Some(server_random),
            server_cert,
            server_cert_blob,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_core::decode;

    #[test]
    fn no_security_round_trips() {
        let encoded = [0u8; 8];
        let decoded: ServerSecurityData = decode(&encoded).unwrap();
        assert_eq!(decoded, ServerSecurityData::no_security());
    }

    #[test]
    fn rsa_public_key_encrypt_matches_modpow() {
        // 64-bit toy key: n = p*q with small primes, e = 65537.
        let n: u64 = 0xC4F8_E9E1_5DCA_DF2B;
        let key = RsaPublicKey {
            public_exponent: 65537,
            modulus: n.to_le_bytes().to_vec(),
        };

        let message: u64 = 0x0102_0304;
        let encrypted = key.encrypt(&message.to_le_bytes());
        assert_eq!(encrypted.len(), 8);

        let expected = BigUint::from(message)
            .modpow(&BigUint::from(65537u32), &BigUint::from(n))
            .to_bytes_le();
        assert_eq!(&encrypted[..expected.len()], expected.as_slice());
    }
}
