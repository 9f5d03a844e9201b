//! State machines driving the RDP connection sequence, sans-io: each
//! sequence consumes the next inbound frame and fills an output buffer, and
//! reports through [`PduHint`] how many bytes the next step needs.

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

mod channel_connection;
mod connection;
mod connection_finalization;
pub mod credssp;
mod license_exchange;

use core::any::Any;
use core::fmt;
use std::borrow::Cow;

use sablerdp_core::{encode_buf, encode_vec, Encode, WriteBuf};
use sablerdp_pdu::nego::FailureCode;
use sablerdp_pdu::rdp::client_info::PerformanceFlags;
use sablerdp_pdu::rdp::headers::{
    CompressionFlags, ShareControlHeader, ShareControlPdu, ShareDataHeader, ShareDataPdu, StreamPriority,
};
use sablerdp_pdu::x224::{X224, X224Data};
use sablerdp_pdu::{mcs, PduHint};

pub use self::channel_connection::{ChannelConnectionSequence, ChannelConnectionState};
pub use self::connection::{ClientConnector, ClientConnectorState, ConnectionResult};
pub use self::connection_finalization::{ConnectionFinalizationSequence, ConnectionFinalizationState};
pub use self::license_exchange::{LicenseExchangeSequence, LicenseExchangeState};

pub use sablerdp_nla::AuthIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopSize {
    pub width: u16,
    pub height: u16,
}

/// Everything the connection sequence needs to know up front.
#[derive(Debug, Clone)]
pub struct Config {
    /// The initial desktop size to request.
    pub desktop_size: DesktopSize,
    pub credentials: AuthIdentity,
    /// Allow the legacy TLS + graphical logon security protocol.
    pub enable_tls: bool,
    /// Allow CredSSP/NLA (recommended; see [`sablerdp_nla`]).
    pub enable_credssp: bool,
    /// The build number advertised in the Client Core Data.
    pub client_build: u32,
    /// Name of the client computer, truncated to 15 characters on the wire.
    pub client_name: String,
    pub keyboard_type: u32,
    pub keyboard_subtype: u32,
    pub keyboard_functional_keys_count: u32,
    pub ime_file_name: String,
    pub dig_product_id: String,
    /// The client address reported in the extended client info.
    pub client_address: String,
    /// Session niceties traded away when the caller asked for a fast session.
    pub performance_flags: PerformanceFlags,
}

impl Config {
    /// The performance flag set for "fast" sessions: wallpaper, animations,
    /// themes and the cursor shadow are turned off.
    pub fn fast_path_performance_flags() -> PerformanceFlags {
        PerformanceFlags::DISABLE_WALLPAPER
            | PerformanceFlags::DISABLE_FULL_WINDOW_DRAG
            | PerformanceFlags::DISABLE_MENU_ANIMATIONS
            | PerformanceFlags::DISABLE_THEMING
            | PerformanceFlags::DISABLE_CURSOR_SHADOW
    }
}

/// A named, inspectable step of a sans-io sequence.
pub trait State: Send + fmt::Debug + 'static {
    fn name(&self) -> &'static str;
    fn is_terminal(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

sablerdp_core::assert_obj_safe!(State);

impl State for () {
    fn name(&self) -> &'static str {
        "()"
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// How many bytes a sequence step wrote into the output buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Written {
    Nothing,
    Size(core::num::NonZeroUsize),
}

impl Written {
    #[inline]
    pub fn from_size(value: usize) -> ConnectorResult<Self> {
        core::num::NonZeroUsize::new(value)
            .map(Self::Size)
            .ok_or_else(|| general_err!("invalid written length (can't be zero)"))
    }

    #[inline]
    pub fn is_nothing(self) -> bool {
        matches!(self, Self::Nothing)
    }

    #[inline]
    pub fn size(self) -> Option<usize> {
        if let Self::Size(size) = self {
            Some(size.get())
        } else {
            None
        }
    }
}

/// A sans-io sub-sequence of the connection FSM.
pub trait Sequence: Send {
    /// How to frame the next inbound read, or `None` when the next step
    /// only writes.
    fn next_pdu_hint(&self) -> Option<&dyn PduHint>;

    fn state(&self) -> &dyn State;

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written>;

    fn step_no_input(&mut self, output: &mut WriteBuf) -> ConnectorResult<Written> {
        self.step(&[], output)
    }
}

sablerdp_core::assert_obj_safe!(Sequence);

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[non_exhaustive]
#[derive(Debug)]
pub enum ConnectorErrorKind {
    Encode(sablerdp_core::EncodeError),
    Decode(sablerdp_core::DecodeError),
    Nla(sablerdp_nla::NlaError),
    /// The server refused the requested security protocols.
    Negotiation(FailureCode),
    /// The server refused the authentication method or session.
    AccessDenied,
    Reason(String),
    General,
    Custom,
}

impl fmt::Display for ConnectorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            ConnectorErrorKind::Encode(_) => write!(f, "encode error"),
            ConnectorErrorKind::Decode(_) => write!(f, "decode error"),
            ConnectorErrorKind::Nla(_) => write!(f, "CredSSP"),
            ConnectorErrorKind::Negotiation(code) => write!(f, "negotiation failure: {}", code.description()),
            ConnectorErrorKind::AccessDenied => write!(f, "access denied"),
            ConnectorErrorKind::Reason(description) => write!(f, "reason: {description}"),
            ConnectorErrorKind::General => write!(f, "general error"),
            ConnectorErrorKind::Custom => write!(f, "custom error"),
        }
    }
}

impl std::error::Error for ConnectorErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            ConnectorErrorKind::Encode(e) => Some(e),
            ConnectorErrorKind::Decode(e) => Some(e),
            ConnectorErrorKind::Nla(e) => Some(e),
            _ => None,
        }
    }
}

pub type ConnectorError = sablerdp_error::Error<ConnectorErrorKind>;

pub trait ConnectorErrorExt {
    fn encode(error: sablerdp_core::EncodeError) -> Self;
    fn decode(error: sablerdp_core::DecodeError) -> Self;
    fn nla(error: sablerdp_nla::NlaError) -> Self;
    fn general(context: &'static str) -> Self;
    fn reason(context: &'static str, reason: impl Into<String>) -> Self;
    fn custom<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static;
}

impl ConnectorErrorExt for ConnectorError {
    fn encode(error: sablerdp_core::EncodeError) -> Self {
        Self::new("encode error", ConnectorErrorKind::Encode(error))
    }

    fn decode(error: sablerdp_core::DecodeError) -> Self {
        Self::new("decode error", ConnectorErrorKind::Decode(error))
    }

    fn nla(error: sablerdp_nla::NlaError) -> Self {
        Self::new("CredSSP", ConnectorErrorKind::Nla(error))
    }

    fn general(context: &'static str) -> Self {
        Self::new(context, ConnectorErrorKind::General)
    }

    fn reason(context: &'static str, reason: impl Into<String>) -> Self {
        Self::new(context, ConnectorErrorKind::Reason(reason.into()))
    }

    fn custom<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        Self::new(context, ConnectorErrorKind::Custom).with_source(e)
    }
}

pub trait ConnectorResultExt {
    #[must_use]
    fn with_context(self, context: &'static str) -> Self;
}

impl<T> ConnectorResultExt for ConnectorResult<T> {
    fn with_context(self, context: &'static str) -> Self {
        self.map_err(|mut e| {
            e.context = context;
            e
        })
    }
}

/// Encodes `x224_msg` as the user data of a TPKT-framed X.224 data TPDU.
pub fn encode_x224_packet<T>(x224_msg: &T, buf: &mut WriteBuf) -> ConnectorResult<usize>
where
    T: Encode,
{
    let x224_msg_buf = encode_vec(x224_msg).map_err(ConnectorError::encode)?;

    let pdu = X224Data {
        data: Cow::Owned(x224_msg_buf),
    };

    let written = encode_buf(&X224(pdu), buf).map_err(ConnectorError::encode)?;

    Ok(written)
}

/// Encodes `user_msg` into an MCS Send Data Request on `channel_id`.
pub fn encode_send_data_request<T: Encode>(
    initiator_id: u16,
    channel_id: u16,
    user_msg: &T,
    buf: &mut WriteBuf,
) -> ConnectorResult<usize> {
    let user_data = encode_vec(user_msg).map_err(ConnectorError::encode)?;

    let pdu = mcs::SendDataRequest {
        initiator_id,
        channel_id,
        user_data: Cow::Owned(user_data),
    };

    let written = encode_buf(&X224(pdu), buf).map_err(ConnectorError::encode)?;

    Ok(written)
}

/// Wraps a Share Data PDU in the Share Control envelope and sends it on the
/// I/O channel.
pub fn encode_share_data(
    user_channel_id: u16,
    io_channel_id: u16,
    share_id: u32,
    pdu: ShareDataPdu,
    buf: &mut WriteBuf,
) -> ConnectorResult<usize> {
    let share_control = ShareControlHeader {
        share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
            share_data_pdu: pdu,
            stream_priority: StreamPriority::Medium,
            compression_flags: CompressionFlags::empty(),
        }),
        pdu_source: user_channel_id,
        share_id,
    };

    encode_send_data_request(user_channel_id, io_channel_id, &share_control, buf)
}

/// Decodes a TPKT frame into the MCS Send Data Indication it carries.
pub fn decode_send_data_indication(input: &[u8]) -> ConnectorResult<mcs::SendDataIndication<'_>> {
    let message = sablerdp_core::decode::<X224<mcs::McsMessage<'_>>>(input)
        .map_err(ConnectorError::decode)?
        .0;

    match message {
        mcs::McsMessage::SendDataIndication(indication) => Ok(indication),
        mcs::McsMessage::DisconnectProviderUltimatum(ultimatum) => Err(reason_err!(
            "McsMessage",
            "server disconnected: {}",
            ultimatum.reason.description()
        )),
        _ => Err(general_err!("unexpected MCS message (expected Send Data Indication)")),
    }
}

/// Decodes the Share Control envelope of a Send Data Indication payload.
pub fn decode_share_control(indication: mcs::SendDataIndication<'_>) -> ConnectorResult<ShareControlHeader> {
    sablerdp_core::decode::<ShareControlHeader>(indication.user_data.as_ref()).map_err(ConnectorError::decode)
}

/// Extracts a Share Data PDU from a full inbound frame.
pub fn decode_share_data(input: &[u8]) -> ConnectorResult<ShareDataPdu> {
    let indication = decode_send_data_indication(input)?;
    let share_control = decode_share_control(indication)?;

    match share_control.share_control_pdu {
        ShareControlPdu::Data(header) => Ok(header.share_data_pdu),
        _ => Err(general_err!("unexpected share control PDU (expected a data PDU)")),
    }
}
