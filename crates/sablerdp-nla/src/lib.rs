//! Network Level Authentication for the RDP connection sequence.
//!
//! Implements the CredSSP TSRequest ladder of [MS-CSSP] over a native NTLMv2
//! implementation of [MS-NLMP], with the NTLM tokens wrapped in SPNEGO. The
//! TLS public key of the already-upgraded stream binds the inner
//! authentication to the outer channel.

mod credssp;
mod crypto;
mod der;
mod ntlm;
mod rc4;
mod spnego;

pub use credssp::{CredSspClient, CredSspState, TsRequest, PUB_KEY_AUTH_NONCE_SIZE};
pub use ntlm::AuthIdentity;

use thiserror::Error;

/// NTSTATUS for a rejected logon, surfaced through the TSRequest error code.
const STATUS_LOGON_FAILURE: u32 = 0xC000_006D;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NlaError {
    #[error("invalid {name}: {reason}")]
    InvalidToken { name: &'static str, reason: &'static str },
    #[error("message out of sequence: {0}")]
    OutOfSequence(&'static str),
    #[error("message integrity check failed: {0}")]
    MessageAltered(&'static str),
    #[error("the server rejected the credentials")]
    CredentialsRejected,
    #[error("the server reported NLA error code 0x{code:08X}")]
    ServerError { code: u32 },
    #[error("malformed DER: {0}")]
    Der(&'static str),
}

impl NlaError {
    pub(crate) fn from_server_code(code: u32) -> Self {
        if code == STATUS_LOGON_FAILURE {
            Self::CredentialsRejected
        } else {
            Self::ServerError { code }
        }
    }

    /// True when the failure means the credentials were wrong, as opposed to
    /// the server refusing the authentication method.
    pub fn is_credentials_rejected(&self) -> bool {
        matches!(self, Self::CredentialsRejected)
    }
}

pub type NlaResult<T> = Result<T, NlaError>;
