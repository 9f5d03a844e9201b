use thiserror::Error;

use sablerdp_connector::{ConnectorError, ConnectorErrorKind};
use sablerdp_pdu::mcs::DisconnectReason;
use sablerdp_session::SessionError;
use sablerdp_video::VideoError;

pub type ClientResult<T> = Result<T, ClientError>;

/// The failure taxonomy of the façade.
///
/// Transport, framing, negotiation and authentication failures are fatal to
/// the session. Encoder failures are fatal to streaming only. Bitmap decode
/// failures never surface here: the affected rectangle is skipped and the
/// session continues.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport failure")]
    Transport(#[from] std::io::Error),

    #[error("connection sequence failed")]
    Connect(#[from] ConnectorError),

    #[error("session failure")]
    Session(#[from] SessionError),

    #[error("video pipeline failure")]
    Video(#[from] VideoError),

    #[error("timed out during {0}")]
    Timeout(&'static str),

    #[error("the server disconnected: {}", .0.description())]
    Disconnected(DisconnectReason),

    #[error("the session is not connected")]
    NotConnected,

    #[error("streaming is disabled for this session")]
    StreamingDisabled,
}

impl ClientError {
    /// True when the server rejected the credentials themselves, as opposed
    /// to refusing the authentication method.
    pub fn is_credentials_rejected(&self) -> bool {
        match self {
            Self::Connect(error) => match error.kind() {
                ConnectorErrorKind::Nla(nla) => nla.is_credentials_rejected(),
                _ => false,
            },
            _ => false,
        }
    }

    /// True when the server refused the requested security protocols or
    /// authentication method.
    pub fn is_access_denied(&self) -> bool {
        match self {
            Self::Connect(error) => matches!(
                error.kind(),
                ConnectorErrorKind::AccessDenied | ConnectorErrorKind::Negotiation(_)
            ),
            _ => false,
        }
    }
}
