//! T.125 MCS: Connect Initial / Response (BER) and the domain PDUs
//! (PER headers) multiplexing the RDP channels.
//!
//! ```asn1
//! Connect-Initial ::= [APPLICATION 101] IMPLICIT SEQUENCE
//! {
//!     callingDomainSelector    OCTET_STRING,
//!     calledDomainSelector     OCTET_STRING,
//!     upwardFlag               BOOLEAN,
//!     targetParameters         DomainParameters,
//!     minimumParameters        DomainParameters,
//!     maximumParameters        DomainParameters,
//!     userData                 OCTET_STRING
//! }
//!
//! Connect-Response ::= [APPLICATION 102] IMPLICIT SEQUENCE
//! {
//!     result                   Result,
//!     calledConnectId          INTEGER (0..MAX),
//!     domainParameters         DomainParameters,
//!     userData                 OCTET_STRING
//! }
//! ```
//!
//! Domain PDUs are identified by their CHOICE byte: the application tag
//! number in the high six bits (`0x64 >> 2 == 25` Send Data Request,
//! `0x68 >> 2 == 26` Send Data Indication, `0x2E >> 2 == 11` Attach User
//! Confirm, `0x3E >> 2 == 15` Channel Join Confirm).

use std::borrow::Cow;

use sablerdp_core::{
    cast_length, ensure_size, invalid_field_err, invalid_field_err_with_source, other_err, read_padding,
    unexpected_message_type_err, Decode, DecodeResult, Encode, EncodeResult, IntoOwned, ReadCursor, WriteCursor,
};

use crate::gcc::{ConferenceCreateRequest, ConferenceCreateResponse};
use crate::tpdu::{TpduCode, TpduHeader};
use crate::tpkt::TpktHeader;
use crate::x224::{user_data_size, X224Pdu};
use crate::{ber, per};

pub const RESULT_ENUM_LENGTH: u8 = 16;

const BASE_CHANNEL_ID: u16 = 1001;
const SEND_DATA_PDU_DATA_PRIORITY_AND_SEGMENTATION: u8 = 0x70;

macro_rules! per_field_err {
    ($field_name:expr) => {{
        |error| invalid_field_err_with_source(Self::MCS_NAME, $field_name, "PER", error)
    }};
}

/// An MCS domain PDU carried in an X.224 data TPDU.
#[doc(hidden)]
pub trait McsPdu<'de>: Sized {
    const MCS_NAME: &'static str;

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()>;

    fn mcs_body_decode(src: &mut ReadCursor<'de>, tpdu_user_data_size: usize) -> DecodeResult<Self>;

    fn mcs_size(&self) -> usize;

    fn name(&self) -> &'static str {
        Self::MCS_NAME
    }
}

impl<'de, T> X224Pdu<'de> for T
where
    T: McsPdu<'de>,
{
    const X224_NAME: &'static str = T::MCS_NAME;

    const TPDU_CODE: TpduCode = TpduCode::DATA;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        self.mcs_body_encode(dst)
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, tpkt: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        let tpdu_user_data_size = user_data_size(tpkt, tpdu);
        T::mcs_body_decode(src, tpdu_user_data_size)
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        0
    }

    fn tpdu_user_data_size(&self) -> usize {
        self.mcs_size()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
enum DomainMcsPdu {
    ErectDomainRequest = 1,
    DisconnectProviderUltimatum = 8,
    AttachUserRequest = 10,
    AttachUserConfirm = 11,
    ChannelJoinRequest = 14,
    ChannelJoinConfirm = 15,
    SendDataRequest = 25,
    SendDataIndication = 26,
}

impl DomainMcsPdu {
    fn check_expected(self, name: &'static str, expected: DomainMcsPdu) -> DecodeResult<()> {
        if self != expected {
            Err(unexpected_message_type_err!(name, self.as_u8()))
        } else {
            Ok(())
        }
    }

    fn from_choice(choice: u8) -> Option<Self> {
        Self::from_u8(choice >> 2)
    }

    fn to_choice(self) -> u8 {
        self.as_u8() << 2
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ErectDomainRequest),
            8 => Some(Self::DisconnectProviderUltimatum),
            10 => Some(Self::AttachUserRequest),
            11 => Some(Self::AttachUserConfirm),
            14 => Some(Self::ChannelJoinRequest),
            15 => Some(Self::ChannelJoinConfirm),
            25 => Some(Self::SendDataRequest),
            26 => Some(Self::SendDataIndication),
            _ => None,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

fn read_mcspdu_header(src: &mut ReadCursor<'_>, ctx: &'static str) -> DecodeResult<DomainMcsPdu> {
    let choice = src.try_read_u8().map_err(|e| other_err!(ctx, source: e))?;

    DomainMcsPdu::from_choice(choice)
        .ok_or_else(|| invalid_field_err(ctx, "domain-mcspdu", "unexpected application tag for CHOICE"))
}

fn peek_mcspdu_header(src: &mut ReadCursor<'_>, ctx: &'static str) -> DecodeResult<DomainMcsPdu> {
    let choice = src.try_peek_u8().map_err(|e| other_err!(ctx, source: e))?;

    DomainMcsPdu::from_choice(choice)
        .ok_or_else(|| invalid_field_err(ctx, "domain-mcspdu", "unexpected application tag for CHOICE"))
}

fn write_mcspdu_header(dst: &mut WriteCursor<'_>, domain_mcspdu: DomainMcsPdu, options: u8) {
    let choice = domain_mcspdu.to_choice();

    debug_assert_eq!(options & !0b11, 0);
    debug_assert_eq!(choice & 0b11, 0);

    dst.write_u8(choice | options);
}

/// T.125 domain parameters negotiated through Connect Initial / Response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainParameters {
    pub max_channel_ids: u32,
    pub max_user_ids: u32,
    pub max_token_ids: u32,
    pub num_priorities: u32,
    pub min_throughput: u32,
    pub max_height: u32,
    pub max_mcs_pdu_size: u32,
    pub protocol_version: u32,
}

impl DomainParameters {
    pub fn target() -> Self {
        Self {
            max_channel_ids: 34,
            max_user_ids: 2,
            max_token_ids: 0,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size: 0xFFFF,
            protocol_version: 2,
        }
    }

    pub fn min() -> Self {
        Self {
            max_channel_ids: 1,
            max_user_ids: 1,
            max_token_ids: 1,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size: 0x420,
            protocol_version: 2,
        }
    }

    pub fn max() -> Self {
        Self {
            max_channel_ids: 0xFFFF,
            max_user_ids: 0xFC17,
            max_token_ids: 0xFFFF,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size: 0xFFFF,
            protocol_version: 2,
        }
    }

    fn content_size(&self) -> u16 {
        (ber::sizeof_integer(self.max_channel_ids)
            + ber::sizeof_integer(self.max_user_ids)
            + ber::sizeof_integer(self.max_token_ids)
            + ber::sizeof_integer(self.num_priorities)
            + ber::sizeof_integer(self.min_throughput)
            + ber::sizeof_integer(self.max_height)
            + ber::sizeof_integer(self.max_mcs_pdu_size)
            + ber::sizeof_integer(self.protocol_version)) as u16
    }

    fn size(&self) -> usize {
        let content = self.content_size();
        ber::sizeof_sequence_tag(content) + usize::from(content)
    }

    fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ber::write_sequence_tag(dst, self.content_size())?;
        ber::write_integer(dst, self.max_channel_ids)?;
        ber::write_integer(dst, self.max_user_ids)?;
        ber::write_integer(dst, self.max_token_ids)?;
        ber::write_integer(dst, self.num_priorities)?;
        ber::write_integer(dst, self.min_throughput)?;
        ber::write_integer(dst, self.max_height)?;
        ber::write_integer(dst, self.max_mcs_pdu_size)?;
        ber::write_integer(dst, self.protocol_version)?;

        Ok(())
    }

    fn read(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ber::read_sequence_tag(src)?;

        Ok(Self {
            max_channel_ids: ber::read_integer(src)? as u32,
            max_user_ids: ber::read_integer(src)? as u32,
            max_token_ids: ber::read_integer(src)? as u32,
            num_priorities: ber::read_integer(src)? as u32,
            min_throughput: ber::read_integer(src)? as u32,
            max_height: ber::read_integer(src)? as u32,
            max_mcs_pdu_size: ber::read_integer(src)? as u32,
            protocol_version: ber::read_integer(src)? as u32,
        })
    }
}

/// MCS Connect Initial, sent as BER inside an X.224 data TPDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInitial {
    pub conference_create_request: ConferenceCreateRequest,
    pub calling_domain_selector: Vec<u8>,
    pub called_domain_selector: Vec<u8>,
    pub upward_flag: bool,
    pub target_parameters: DomainParameters,
    pub min_parameters: DomainParameters,
    pub max_parameters: DomainParameters,
}

impl ConnectInitial {
    pub const NAME: &'static str = "ConnectInitial";

    const APPLICATION_TAG: u8 = 101;

    pub fn with_gcc_blocks(gcc_blocks: crate::gcc::ClientGccBlocks) -> Self {
        Self {
            conference_create_request: ConferenceCreateRequest { gcc_blocks },
            calling_domain_selector: vec![0x01],
            called_domain_selector: vec![0x01],
            upward_flag: true,
            target_parameters: DomainParameters::target(),
            min_parameters: DomainParameters::min(),
            max_parameters: DomainParameters::max(),
        }
    }

    fn fields_size(&self) -> usize {
        let user_data_len = self.conference_create_request.size();

        ber::sizeof_octet_string(self.calling_domain_selector.len() as u16)
            + ber::sizeof_octet_string(self.called_domain_selector.len() as u16)
            + ber::SIZEOF_BOOL
            + self.target_parameters.size()
            + self.min_parameters.size()
            + self.max_parameters.size()
            + ber::sizeof_octet_string(user_data_len as u16)
    }
}

impl Encode for ConnectInitial {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        ber::write_application_tag(dst, Self::APPLICATION_TAG, cast_length!("fields", self.fields_size())?)?;
        ber::write_octet_string(dst, &self.calling_domain_selector)?;
        ber::write_octet_string(dst, &self.called_domain_selector)?;
        ber::write_bool(dst, self.upward_flag)?;
        self.target_parameters.write(dst)?;
        self.min_parameters.write(dst)?;
        self.max_parameters.write(dst)?;
        ber::write_octet_string_tag(dst, cast_length!("userData", self.conference_create_request.size())?)?;
        self.conference_create_request.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let fields = self.fields_size();
        ber::sizeof_application_tag(Self::APPLICATION_TAG, fields as u16) + fields
    }
}

impl<'de> Decode<'de> for ConnectInitial {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ber::read_application_tag(src, Self::APPLICATION_TAG)?;

        let calling_domain_selector = ber::read_octet_string(src)?;
        let called_domain_selector = ber::read_octet_string(src)?;
        let upward_flag = ber::read_bool(src)?;
        let target_parameters = DomainParameters::read(src)?;
        let min_parameters = DomainParameters::read(src)?;
        let max_parameters = DomainParameters::read(src)?;

        let user_data_len = usize::from(ber::read_octet_string_tag(src)?);
        ensure_size!(ctx: Self::NAME, in: src, size: user_data_len);
        let conference_create_request = ConferenceCreateRequest::decode(src)?;

        Ok(Self {
            conference_create_request,
            calling_domain_selector,
            called_domain_selector,
            upward_flag,
            target_parameters,
            min_parameters,
            max_parameters,
        })
    }
}

/// MCS Connect Response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub conference_create_response: ConferenceCreateResponse,
    pub result: u8,
    pub called_connect_id: u32,
    pub domain_parameters: DomainParameters,
}

impl ConnectResponse {
    pub const NAME: &'static str = "ConnectResponse";

    const APPLICATION_TAG: u8 = 102;

    fn fields_size(&self) -> usize {
        let user_data_len = self.conference_create_response.size();

        ber::SIZEOF_ENUMERATED
            + ber::sizeof_integer(self.called_connect_id)
            + self.domain_parameters.size()
            + ber::sizeof_octet_string(user_data_len as u16)
    }
}

impl Encode for ConnectResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        ber::write_application_tag(dst, Self::APPLICATION_TAG, cast_length!("fields", self.fields_size())?)?;
        ber::write_enumerated(dst, self.result)?;
        ber::write_integer(dst, self.called_connect_id)?;
        self.domain_parameters.write(dst)?;
        ber::write_octet_string_tag(dst, cast_length!("userData", self.conference_create_response.size())?)?;
        self.conference_create_response.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let fields = self.fields_size();
        ber::sizeof_application_tag(Self::APPLICATION_TAG, fields as u16) + fields
    }
}

impl<'de> Decode<'de> for ConnectResponse {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ber::read_application_tag(src, Self::APPLICATION_TAG)?;

        let result = ber::read_enumerated(src, RESULT_ENUM_LENGTH)?;
        let called_connect_id = ber::read_integer(src)? as u32;
        let domain_parameters = DomainParameters::read(src)?;

        let user_data_len = usize::from(ber::read_octet_string_tag(src)?);
        ensure_size!(ctx: Self::NAME, in: src, size: user_data_len);
        let conference_create_response = ConferenceCreateResponse::decode(src)?;

        Ok(Self {
            conference_create_response,
            result,
            called_connect_id,
            domain_parameters,
        })
    }
}

/// The domain PDUs exchanged after Connect: the union the active stage
/// demultiplexes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McsMessage<'a> {
    ErectDomainRequest(ErectDomainPdu),
    AttachUserRequest(AttachUserRequest),
    AttachUserConfirm(AttachUserConfirm),
    ChannelJoinRequest(ChannelJoinRequest),
    ChannelJoinConfirm(ChannelJoinConfirm),
    SendDataRequest(SendDataRequest<'a>),
    SendDataIndication(SendDataIndication<'a>),
    DisconnectProviderUltimatum(DisconnectProviderUltimatum),
}

pub type OwnedMcsMessage = McsMessage<'static>;

impl IntoOwned for McsMessage<'_> {
    type Owned = OwnedMcsMessage;

    fn into_owned(self) -> Self::Owned {
        match self {
            Self::ErectDomainRequest(msg) => McsMessage::ErectDomainRequest(msg),
            Self::AttachUserRequest(msg) => McsMessage::AttachUserRequest(msg),
            Self::AttachUserConfirm(msg) => McsMessage::AttachUserConfirm(msg),
            Self::ChannelJoinRequest(msg) => McsMessage::ChannelJoinRequest(msg),
            Self::ChannelJoinConfirm(msg) => McsMessage::ChannelJoinConfirm(msg),
            Self::SendDataRequest(msg) => McsMessage::SendDataRequest(msg.into_owned()),
            Self::SendDataIndication(msg) => McsMessage::SendDataIndication(msg.into_owned()),
            Self::DisconnectProviderUltimatum(msg) => McsMessage::DisconnectProviderUltimatum(msg),
        }
    }
}

impl<'de> McsPdu<'de> for McsMessage<'de> {
    const MCS_NAME: &'static str = "McsMessage";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            Self::ErectDomainRequest(msg) => msg.mcs_body_encode(dst),
            Self::AttachUserRequest(msg) => msg.mcs_body_encode(dst),
            Self::AttachUserConfirm(msg) => msg.mcs_body_encode(dst),
            Self::ChannelJoinRequest(msg) => msg.mcs_body_encode(dst),
            Self::ChannelJoinConfirm(msg) => msg.mcs_body_encode(dst),
            Self::SendDataRequest(msg) => msg.mcs_body_encode(dst),
            Self::SendDataIndication(msg) => msg.mcs_body_encode(dst),
            Self::DisconnectProviderUltimatum(msg) => msg.mcs_body_encode(dst),
        }
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, tpdu_user_data_size: usize) -> DecodeResult<Self> {
        match peek_mcspdu_header(src, Self::MCS_NAME)? {
            DomainMcsPdu::ErectDomainRequest => Ok(McsMessage::ErectDomainRequest(ErectDomainPdu::mcs_body_decode(
                src,
                tpdu_user_data_size,
            )?)),
            DomainMcsPdu::AttachUserRequest => Ok(McsMessage::AttachUserRequest(AttachUserRequest::mcs_body_decode(
                src,
                tpdu_user_data_size,
            )?)),
            DomainMcsPdu::AttachUserConfirm => Ok(McsMessage::AttachUserConfirm(AttachUserConfirm::mcs_body_decode(
                src,
                tpdu_user_data_size,
            )?)),
            DomainMcsPdu::ChannelJoinRequest => Ok(McsMessage::ChannelJoinRequest(
                ChannelJoinRequest::mcs_body_decode(src, tpdu_user_data_size)?,
            )),
            DomainMcsPdu::ChannelJoinConfirm => Ok(McsMessage::ChannelJoinConfirm(
                ChannelJoinConfirm::mcs_body_decode(src, tpdu_user_data_size)?,
            )),
            DomainMcsPdu::SendDataRequest => Ok(McsMessage::SendDataRequest(SendDataRequest::mcs_body_decode(
                src,
                tpdu_user_data_size,
            )?)),
            DomainMcsPdu::SendDataIndication => Ok(McsMessage::SendDataIndication(
                SendDataIndication::mcs_body_decode(src, tpdu_user_data_size)?,
            )),
            DomainMcsPdu::DisconnectProviderUltimatum => Ok(McsMessage::DisconnectProviderUltimatum(
                DisconnectProviderUltimatum::mcs_body_decode(src, tpdu_user_data_size)?,
            )),
        }
    }

    fn mcs_size(&self) -> usize {
        match self {
            Self::ErectDomainRequest(msg) => msg.mcs_size(),
            Self::AttachUserRequest(msg) => msg.mcs_size(),
            Self::AttachUserConfirm(msg) => msg.mcs_size(),
            Self::ChannelJoinRequest(msg) => msg.mcs_size(),
            Self::ChannelJoinConfirm(msg) => msg.mcs_size(),
            Self::SendDataRequest(msg) => msg.mcs_size(),
            Self::SendDataIndication(msg) => msg.mcs_size(),
            Self::DisconnectProviderUltimatum(msg) => msg.mcs_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErectDomainPdu {
    pub sub_height: u32,
    pub sub_interval: u32,
}

impl<'de> McsPdu<'de> for ErectDomainPdu {
    const MCS_NAME: &'static str = "ErectDomainPdu";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::ErectDomainRequest, 0);

        per::write_u32(dst, self.sub_height);
        per::write_u32(dst, self.sub_interval);

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, _: usize) -> DecodeResult<Self> {
        read_mcspdu_header(src, Self::MCS_NAME)?.check_expected(Self::MCS_NAME, DomainMcsPdu::ErectDomainRequest)?;

        let sub_height = per::read_u32(src).map_err(per_field_err!("subHeight"))?;
        let sub_interval = per::read_u32(src).map_err(per_field_err!("subInterval"))?;

        Ok(Self {
            sub_height,
            sub_interval,
        })
    }

    fn mcs_size(&self) -> usize {
        per::CHOICE_SIZE + per::sizeof_u32(self.sub_height) + per::sizeof_u32(self.sub_interval)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachUserRequest;

impl<'de> McsPdu<'de> for AttachUserRequest {
    const MCS_NAME: &'static str = "AttachUserRequest";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::AttachUserRequest, 0);

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, _: usize) -> DecodeResult<Self> {
        read_mcspdu_header(src, Self::MCS_NAME)?.check_expected(Self::MCS_NAME, DomainMcsPdu::AttachUserRequest)?;

        Ok(Self)
    }

    fn mcs_size(&self) -> usize {
        per::CHOICE_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachUserConfirm {
    pub result: u8,
    pub initiator_id: u16,
}

impl<'de> McsPdu<'de> for AttachUserConfirm {
    const MCS_NAME: &'static str = "AttachUserConfirm";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::AttachUserConfirm, 2);

        per::write_enum(dst, self.result);
        per::write_u16(dst, self.initiator_id, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, _: usize) -> DecodeResult<Self> {
        read_mcspdu_header(src, Self::MCS_NAME)?.check_expected(Self::MCS_NAME, DomainMcsPdu::AttachUserConfirm)?;

        let result = per::read_enum(src, RESULT_ENUM_LENGTH).map_err(per_field_err!("result"))?;
        let user_id = per::read_u16(src, BASE_CHANNEL_ID).map_err(per_field_err!("userId"))?;

        Ok(Self {
            result,
            initiator_id: user_id,
        })
    }

    fn mcs_size(&self) -> usize {
        per::CHOICE_SIZE + per::ENUM_SIZE + per::U16_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelJoinRequest {
    pub initiator_id: u16,
    pub channel_id: u16,
}

impl<'de> McsPdu<'de> for ChannelJoinRequest {
    const MCS_NAME: &'static str = "ChannelJoinRequest";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::ChannelJoinRequest, 0);

        per::write_u16(dst, self.initiator_id, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        per::write_u16(dst, self.channel_id, 0).map_err(per_field_err!("channelId"))?;

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, _: usize) -> DecodeResult<Self> {
        read_mcspdu_header(src, Self::MCS_NAME)?.check_expected(Self::MCS_NAME, DomainMcsPdu::ChannelJoinRequest)?;

        let initiator_id = per::read_u16(src, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        let channel_id = per::read_u16(src, 0).map_err(per_field_err!("channelId"))?;

        Ok(Self {
            initiator_id,
            channel_id,
        })
    }

    fn mcs_size(&self) -> usize {
        per::CHOICE_SIZE + per::U16_SIZE * 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelJoinConfirm {
    pub result: u8,
    pub initiator_id: u16,
    pub requested_channel_id: u16,
    pub channel_id: u16,
}

impl<'de> McsPdu<'de> for ChannelJoinConfirm {
    const MCS_NAME: &'static str = "ChannelJoinConfirm";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::ChannelJoinConfirm, 2);

        per::write_enum(dst, self.result);
        per::write_u16(dst, self.initiator_id, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        per::write_u16(dst, self.requested_channel_id, 0).map_err(per_field_err!("requested"))?;
        per::write_u16(dst, self.channel_id, 0).map_err(per_field_err!("channelId"))?;

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, _: usize) -> DecodeResult<Self> {
        read_mcspdu_header(src, Self::MCS_NAME)?.check_expected(Self::MCS_NAME, DomainMcsPdu::ChannelJoinConfirm)?;

        let result = per::read_enum(src, RESULT_ENUM_LENGTH).map_err(per_field_err!("result"))?;
        let initiator_id = per::read_u16(src, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        let requested_channel_id = per::read_u16(src, 0).map_err(per_field_err!("requested"))?;
        let channel_id = per::read_u16(src, 0).map_err(per_field_err!("channelId"))?;

        Ok(Self {
            result,
            initiator_id,
            requested_channel_id,
            channel_id,
        })
    }

    fn mcs_size(&self) -> usize {
        per::CHOICE_SIZE + per::ENUM_SIZE + per::U16_SIZE * 3
    }
}

/// Client-to-server channel payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDataRequest<'a> {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: Cow<'a, [u8]>,
}

pub type OwnedSendDataRequest = SendDataRequest<'static>;

impl IntoOwned for SendDataRequest<'_> {
    type Owned = OwnedSendDataRequest;

    fn into_owned(self) -> Self::Owned {
        SendDataRequest {
            user_data: Cow::Owned(self.user_data.into_owned()),
            ..self
        }
    }
}

impl<'de> McsPdu<'de> for SendDataRequest<'de> {
    const MCS_NAME: &'static str = "SendDataRequest";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::SendDataRequest, 0);

        per::write_u16(dst, self.initiator_id, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        per::write_u16(dst, self.channel_id, 0).map_err(per_field_err!("channelId"))?;

        dst.write_u8(SEND_DATA_PDU_DATA_PRIORITY_AND_SEGMENTATION);

        per::write_length(dst, cast_length!("userDataLen", self.user_data.len())?);
        dst.write_slice(&self.user_data);

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, tpdu_user_data_size: usize) -> DecodeResult<Self> {
        let src_len_before = src.len();

        read_mcspdu_header(src, Self::MCS_NAME)?.check_expected(Self::MCS_NAME, DomainMcsPdu::SendDataRequest)?;

        let initiator_id = per::read_u16(src, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        let channel_id = per::read_u16(src, 0).map_err(per_field_err!("channelId"))?;

        // dataPriority + segmentation
        ensure_size!(ctx: Self::MCS_NAME, in: src, size: 1);
        read_padding!(src, 1);

        let (length, _) = per::read_length(src).map_err(per_field_err!("userDataLen"))?;
        let length = usize::from(length);

        let read_so_far = src_len_before - src.len();
        if read_so_far + length > tpdu_user_data_size {
            return Err(invalid_field_err(Self::MCS_NAME, "userData", "advertised length too big"));
        }

        ensure_size!(ctx: Self::MCS_NAME, in: src, size: length);
        let user_data = Cow::Borrowed(src.read_slice(length));

        Ok(Self {
            initiator_id,
            channel_id,
            user_data,
        })
    }

    fn mcs_size(&self) -> usize {
        per::CHOICE_SIZE
            + per::U16_SIZE * 2
            + 1
            + per::sizeof_length(self.user_data.len() as u16)
            + self.user_data.len()
    }
}

/// Server-to-client channel payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDataIndication<'a> {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: Cow<'a, [u8]>,
}

pub type OwnedSendDataIndication = SendDataIndication<'static>;

impl IntoOwned for SendDataIndication<'_> {
    type Owned = OwnedSendDataIndication;

    fn into_owned(self) -> Self::Owned {
        SendDataIndication {
            user_data: Cow::Owned(self.user_data.into_owned()),
            ..self
        }
    }
}

impl<'de> McsPdu<'de> for SendDataIndication<'de> {
    const MCS_NAME: &'static str = "SendDataIndication";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::SendDataIndication, 0);

        per::write_u16(dst, self.initiator_id, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        per::write_u16(dst, self.channel_id, 0).map_err(per_field_err!("channelId"))?;

        dst.write_u8(SEND_DATA_PDU_DATA_PRIORITY_AND_SEGMENTATION);

        per::write_length(dst, cast_length!("userDataLen", self.user_data.len())?);
        dst.write_slice(&self.user_data);

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, tpdu_user_data_size: usize) -> DecodeResult<Self> {
        let src_len_before = src.len();

        read_mcspdu_header(src, Self::MCS_NAME)?.check_expected(Self::MCS_NAME, DomainMcsPdu::SendDataIndication)?;

        let initiator_id = per::read_u16(src, BASE_CHANNEL_ID).map_err(per_field_err!("initiator"))?;
        let channel_id = per::read_u16(src, 0).map_err(per_field_err!("channelId"))?;

        // dataPriority + segmentation
        ensure_size!(ctx: Self::MCS_NAME, in: src, size: 1);
        read_padding!(src, 1);

        let (length, _) = per::read_length(src).map_err(per_field_err!("userDataLen"))?;
        let length = usize::from(length);

        let read_so_far = src_len_before - src.len();
        if read_so_far + length > tpdu_user_data_size {
            return Err(invalid_field_err(Self::MCS_NAME, "userData", "advertised length too big"));
        }

        ensure_size!(ctx: Self::MCS_NAME, in: src, size: length);
        let user_data = Cow::Borrowed(src.read_slice(length));

        Ok(Self {
            initiator_id,
            channel_id,
            user_data,
        })
    }

    fn mcs_size(&self) -> usize {
        per::CHOICE_SIZE
            + per::U16_SIZE * 2
            + 1
            + per::sizeof_length(self.user_data.len() as u16)
            + self.user_data.len()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectReason {
    DomainDisconnected = 0,
    ProviderInitiated = 1,
    TokenPurged = 2,
    UserRequested = 3,
    ChannelPurged = 4,
}

impl DisconnectReason {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::DomainDisconnected),
            1 => Some(Self::ProviderInitiated),
            2 => Some(Self::TokenPurged),
            3 => Some(Self::UserRequested),
            4 => Some(Self::ChannelPurged),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::DomainDisconnected => "domain disconnected",
            Self::ProviderInitiated => "server-initiated disconnect",
            Self::TokenPurged => "token purged",
            Self::UserRequested => "user-requested disconnect",
            Self::ChannelPurged => "channel purged",
        }
    }
}

/// Disconnect Provider Ultimatum; the 3-bit reason straddles the CHOICE
/// options bits and the following byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectProviderUltimatum {
    pub reason: DisconnectReason,
}

impl DisconnectProviderUltimatum {
    pub fn from_reason(reason: DisconnectReason) -> Self {
        Self { reason }
    }
}

impl<'de> McsPdu<'de> for DisconnectProviderUltimatum {
    const MCS_NAME: &'static str = "DisconnectProviderUltimatum";

    fn mcs_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        let reason = self.reason as u8;

        write_mcspdu_header(dst, DomainMcsPdu::DisconnectProviderUltimatum, reason >> 1);
        dst.write_u8((reason & 0x01) << 7);

        Ok(())
    }

    fn mcs_body_decode(src: &mut ReadCursor<'de>, _: usize) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::MCS_NAME, in: src, size: 2);

        let b1 = src.read_u8();
        let b2 = src.read_u8();

        DomainMcsPdu::from_choice(b1)
            .ok_or_else(|| invalid_field_err(Self::MCS_NAME, "domain-mcspdu", "unexpected CHOICE"))?
            .check_expected(Self::MCS_NAME, DomainMcsPdu::DisconnectProviderUltimatum)?;

        let reason = ((b1 & 0x01) << 1) | (b2 >> 7);

        Ok(Self {
            reason: DisconnectReason::from_u8(reason)
                .ok_or_else(|| invalid_field_err(Self::MCS_NAME, "reason", "invalid disconnect reason"))?,
        })
    }

    fn mcs_size(&self) -> usize {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x224::X224;
    use sablerdp_core::{decode, encode_vec};

    #[test]
    fn erect_domain_request_bytes() {
        let pdu = X224(ErectDomainPdu {
            sub_height: 0,
            sub_interval: 0,
        });

        let encoded = encode_vec(&pdu).unwrap();
        // TPKT + data TPDU + choice 0x04 + two PER u32 zeros
        assert_eq!(encoded[7..], [0x04, 0x01, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn attach_user_confirm_is_parsed_by_choice_byte() {
        // Choice 0x2E: AttachUserConfirm (11 << 2) with initiator present.
        let body = [0x2E, 0x00, 0x00, 0x06];
        let mut frame = vec![0x03, 0x00, 0x00, 0x0B, 0x02, 0xF0, 0x80];
        frame.extend_from_slice(&body);

        let decoded: X224<AttachUserConfirm> = decode(&frame).unwrap();
        assert_eq!(decoded.0.result, 0);
        assert_eq!(decoded.0.initiator_id, 1007);
    }

    #[test]
    fn channel_join_confirm_round_trip() {
        let pdu = ChannelJoinConfirm {
            result: 0,
            initiator_id: 1007,
            requested_channel_id: 1003,
            channel_id: 1003,
        };

        let encoded = encode_vec(&X224(pdu.clone())).unwrap();
        // Choice byte 0x3E: ChannelJoinConfirm (15 << 2) | options 2.
        assert_eq!(encoded[7], 0x3E);

        let decoded: X224<ChannelJoinConfirm> = decode(&encoded).unwrap();
        assert_eq!(decoded.0, pdu);
    }

    #[test]
    fn send_data_request_layout() {
        let pdu = SendDataRequest {
            initiator_id: 1007,
            channel_id: 1003,
            user_data: Cow::Borrowed(&[0xAA, 0xBB]),
        };

        let encoded = encode_vec(&X224(pdu.clone())).unwrap();
        let body = &encoded[7..];

        assert_eq!(body[0], 0x64); // SendDataRequest choice (25 << 2)
        assert_eq!(u16::from_be_bytes([body[1], body[2]]), 6); // initiator - 1001
        assert_eq!(u16::from_be_bytes([body[3], body[4]]), 1003);
        assert_eq!(body[5], 0x70); // complete PDU segmentation
        assert_eq!(body[6], 2); // PER length
        assert_eq!(&body[7..], [0xAA, 0xBB]);

        let decoded: X224<SendDataRequest<'_>> = decode(&encoded).unwrap();
        assert_eq!(decoded.0, pdu);
    }

    #[test]
    fn send_data_indication_choice_byte_is_0x68() {
        let pdu = SendDataIndication {
            initiator_id: 1002,
            channel_id: 1003,
            user_data: Cow::Borrowed(&[0x01]),
        };

        let encoded = encode_vec(&X224(pdu)).unwrap();
        assert_eq!(encoded[7], 0x68);
    }

    #[test]
    fn disconnect_provider_ultimatum_round_trip() {
        let pdu = DisconnectProviderUltimatum::from_reason(DisconnectReason::UserRequested);

        let encoded = encode_vec(&X224(pdu.clone())).unwrap();
        let decoded: X224<DisconnectProviderUltimatum> = decode(&encoded).unwrap();
        assert_eq!(decoded.0, pdu);
    }

    #[test]
    fn connect_initial_uses_application_tag_101() {
        use crate::gcc;
        use crate::nego::SecurityProtocol;

        let connect_initial = ConnectInitial::with_gcc_blocks(gcc::ClientGccBlocks {
            core: gcc::ClientCoreData {
                version: gcc::RdpVersion::V5_PLUS,
                desktop_width: 800,
                desktop_height: 600,
                keyboard_layout: 0,
                client_build: 0,
                client_name: "t".to_owned(),
                keyboard_type: 4,
                keyboard_subtype: 0,
                keyboard_functional_keys_count: 12,
                ime_file_name: String::new(),
                high_color_depth: gcc::HighColorDepth::Bpp24,
                supported_color_depths: gcc::SupportedColorDepths::BPP24,
                early_capability_flags: gcc::ClientEarlyCapabilityFlags::empty(),
                dig_product_id: String::new(),
                connection_type: gcc::ConnectionType::Lan,
                server_selected_protocol: SecurityProtocol::HYBRID,
            },
            security: gcc::ClientSecurityData::no_security(),
            network: gcc::ClientNetworkData { channels: Vec::new() },
            cluster: None,
        });

        let encoded = encode_vec(&connect_initial).unwrap();
        assert_eq!(encoded[0], 0x7F);
        assert_eq!(encoded[1], 101);

        let decoded: ConnectInitial = decode(&encoded).unwrap();
        assert_eq!(decoded, connect_initial);
    }
}
