//! GCC Conference Create Request / Response, the PER-encoded wrappers the
//! MCS Connect user data travels in (T.124 with the H.221 non-standard keys
//! `Duca` and `McDn`).

use sablerdp_core::{
    cast_length, ensure_size, invalid_field_err, other_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

use super::{ClientGccBlocks, ServerGccBlocks};
use crate::per;

const CONFERENCE_OBJECT_ID: [u8; 6] = [0, 0, 20, 124, 0, 1];
const CLIENT_TO_SERVER_H221_KEY: &[u8; 4] = b"Duca";
const SERVER_TO_CLIENT_H221_KEY: &[u8; 4] = b"McDn";
const GCC_USER_ID_MIN: u16 = 1001;

const REQUEST_CONNECT_PDU_SIZE: usize = 12;
const RESPONSE_CONNECT_PDU_SIZE: usize = 13;
const OBJECT_IDENTIFIER_KEY: u8 = 0;
const CONFERENCE_CREATE_REQUEST_CHOICE: u8 = 0;
const CONFERENCE_CREATE_RESPONSE_CHOICE: u8 = 0x14;
const USER_DATA_SELECTION: u8 = 8;
const USER_DATA_NUMBER_OF_SETS: u8 = 1;
const H221_NON_STANDARD_CHOICE: u8 = 0xC0;
const H221_KEY_MIN_LENGTH: usize = 4;
const CONFERENCE_NAME: &[u8] = b"1";
const RESPONSE_TAG: u32 = 1;
const RESPONSE_RESULT_SUCCESS: u8 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConferenceCreateRequest {
    pub gcc_blocks: ClientGccBlocks,
}

impl ConferenceCreateRequest {
    const NAME: &'static str = "ConferenceCreateRequest";
}

impl Encode for ConferenceCreateRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let gcc_blocks_len = self.gcc_blocks.size();

        // ConnectData::Key: select OBJECT_IDENTIFIER, the T.124 protocol id
        per::write_choice(dst, OBJECT_IDENTIFIER_KEY);
        per::write_object_id(dst, CONFERENCE_OBJECT_ID);

        // ConnectData::connectPDU: length of the remainder
        per::write_length(dst, cast_length!("connectPduLen", gcc_blocks_len + REQUEST_CONNECT_PDU_SIZE)?);
        // ConnectGCCPDU CHOICE: conferenceCreateRequest
        per::write_choice(dst, CONFERENCE_CREATE_REQUEST_CHOICE);
        // ConferenceCreateRequest: select the optional userData field
        per::write_selection(dst, USER_DATA_SELECTION);
        // ConferenceName
        per::write_numeric_string(dst, CONFERENCE_NAME, 1).map_err(|e| other_err!("confName", source: e))?;
        per::write_padding(dst, 1);
        // UserData: one h221NonStandard set keyed "Duca"
        per::write_number_of_sets(dst, USER_DATA_NUMBER_OF_SETS);
        per::write_choice(dst, H221_NON_STANDARD_CHOICE);
        per::write_octet_string(dst, CLIENT_TO_SERVER_H221_KEY, H221_KEY_MIN_LENGTH)
            .map_err(|e| other_err!("client-to-server key", source: e))?;
        // The value: the concatenated client GCC blocks
        per::write_length(dst, cast_length!("gccBlocksLen", gcc_blocks_len)?);
        self.gcc_blocks.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let gcc_blocks_len = self.gcc_blocks.size();
        let connect_pdu_len = (gcc_blocks_len + REQUEST_CONNECT_PDU_SIZE) as u16;

        per::CHOICE_SIZE
            + CONFERENCE_OBJECT_ID.len()
            + per::sizeof_length(connect_pdu_len)
            + REQUEST_CONNECT_PDU_SIZE
            + per::sizeof_length(gcc_blocks_len as u16)
            + gcc_blocks_len
    }
}

impl<'de> Decode<'de> for ConferenceCreateRequest {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != OBJECT_IDENTIFIER_KEY {
            return Err(invalid_field_err!("ConnectData::Key", "unexpected key type"));
        }
        if per::read_object_id(src).map_err(|e| other_err!("objectId", source: e))? != CONFERENCE_OBJECT_ID {
            return Err(invalid_field_err!("ConnectData::Key", "unexpected object id"));
        }

        let _length = per::read_length(src).map_err(|e| other_err!("len", source: e))?;

        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != CONFERENCE_CREATE_REQUEST_CHOICE {
            return Err(invalid_field_err!("connectPDU", "expected a ConferenceCreateRequest"));
        }

        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_selection(src) != USER_DATA_SELECTION {
            return Err(invalid_field_err!("selection", "expected the userData selection"));
        }

        per::read_numeric_string(src, 1).map_err(|e| other_err!("confName", source: e))?;
        per::read_padding(src, 1);

        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_number_of_sets(src) != USER_DATA_NUMBER_OF_SETS {
            return Err(invalid_field_err!("userData", "expected exactly one user data set"));
        }
        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != H221_NON_STANDARD_CHOICE {
            return Err(invalid_field_err!("userData", "expected an h221NonStandard set"));
        }
        if per::read_octet_string(src, H221_KEY_MIN_LENGTH).map_err(|e| other_err!("h221 key", source: e))?
            != CLIENT_TO_SERVER_H221_KEY
        {
            return Err(invalid_field_err!("userData", "invalid client-to-server H.221 key"));
        }

        let _gcc_blocks_len = per::read_length(src).map_err(|e| other_err!("len", source: e))?;
        let gcc_blocks = ClientGccBlocks::decode(src)?;

        Ok(Self { gcc_blocks })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConferenceCreateResponse {
    pub user_id: u16,
    pub gcc_blocks: ServerGccBlocks,
}

impl ConferenceCreateResponse {
    const NAME: &'static str = "ConferenceCreateResponse";
}

impl Encode for ConferenceCreateResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let gcc_blocks_len = self.gcc_blocks.size();

        per::write_choice(dst, OBJECT_IDENTIFIER_KEY);
        per::write_object_id(dst, CONFERENCE_OBJECT_ID);

        // Ignored by clients per [MS-RDPBCGR].
        per::write_length(dst, cast_length!("connectPduLen", gcc_blocks_len + RESPONSE_CONNECT_PDU_SIZE)?);
        per::write_choice(dst, CONFERENCE_CREATE_RESPONSE_CHOICE);
        // nodeID
        per::write_u16(dst, self.user_id, GCC_USER_ID_MIN).map_err(|e| other_err!("nodeId", source: e))?;
        // tag, result
        per::write_u32(dst, RESPONSE_TAG);
        per::write_enum(dst, RESPONSE_RESULT_SUCCESS);
        per::write_number_of_sets(dst, USER_DATA_NUMBER_OF_SETS);
        per::write_choice(dst, H221_NON_STANDARD_CHOICE);
        per::write_octet_string(dst, SERVER_TO_CLIENT_H221_KEY, H221_KEY_MIN_LENGTH)
            .map_err(|e| other_err!("server-to-client key", source: e))?;
        per::write_length(dst, cast_length!("gccBlocksLen", gcc_blocks_len)?);
        self.gcc_blocks.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let gcc_blocks_len = self.gcc_blocks.size();
        let connect_pdu_len = (gcc_blocks_len + RESPONSE_CONNECT_PDU_SIZE) as u16;

        per::CHOICE_SIZE
            + CONFERENCE_OBJECT_ID.len()
            + per::sizeof_length(connect_pdu_len)
            + RESPONSE_CONNECT_PDU_SIZE
            + per::sizeof_length(gcc_blocks_len as u16)
            + gcc_blocks_len
    }
}

impl<'de> Decode<'de> for ConferenceCreateResponse {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != OBJECT_IDENTIFIER_KEY {
            return Err(invalid_field_err!("ConnectData::Key", "unexpected key type"));
        }
        if per::read_object_id(src).map_err(|e| other_err!("objectId", source: e))? != CONFERENCE_OBJECT_ID {
            return Err(invalid_field_err!("ConnectData::Key", "unexpected object id"));
        }

        let _length = per::read_length(src).map_err(|e| other_err!("len", source: e))?;

        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != CONFERENCE_CREATE_RESPONSE_CHOICE {
            return Err(invalid_field_err!("connectPDU", "expected a ConferenceCreateResponse"));
        }

        let user_id = per::read_u16(src, GCC_USER_ID_MIN).map_err(|e| other_err!("nodeId", source: e))?;
        per::read_u32(src).map_err(|e| other_err!("tag", source: e))?;

        ensure_size!(in: src, size: per::ENUM_SIZE);
        let result = per::read_enum(src, 16).map_err(|e| other_err!("result", source: e))?;
        if result != RESPONSE_RESULT_SUCCESS {
            return Err(invalid_field_err!("result", "conference create request was rejected"));
        }

        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_number_of_sets(src) != USER_DATA_NUMBER_OF_SETS {
            return Err(invalid_field_err!("userData", "expected exactly one user data set"));
        }
        ensure_size!(in: src, size: per::CHOICE_SIZE);
        if per::read_choice(src) != H221_NON_STANDARD_CHOICE {
            return Err(invalid_field_err!("userData", "expected an h221NonStandard set"));
        }
        if per::read_octet_string(src, H221_KEY_MIN_LENGTH).map_err(|e| other_err!("h221 key", source: e))?
            != SERVER_TO_CLIENT_H221_KEY
        {
            return Err(invalid_field_err!("userData", "invalid server-to-client H.221 key"));
        }

        let _gcc_blocks_len = per::read_length(src).map_err(|e| other_err!("len", source: e))?;
        let gcc_blocks = ServerGccBlocks::decode(src)?;

        Ok(Self { user_id, gcc_blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcc;
    use crate::nego::SecurityProtocol;
    use sablerdp_core::{decode, encode_vec};

    fn client_blocks() -> ClientGccBlocks {
        ClientGccBlocks {
            core: gcc::ClientCoreData {
                version: gcc::RdpVersion::V5_PLUS,
                desktop_width: 1024,
                desktop_height: 768,
                keyboard_layout: 0,
                client_build: 2600,
                client_name: "sable".to_owned(),
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
        }
    }

    #[test]
    fn conference_create_request_round_trip() {
        let request = ConferenceCreateRequest {
            gcc_blocks: client_blocks(),
        };

        let encoded = encode_vec(&request).unwrap();
        assert_eq!(encoded.len(), request.size());

        // T.124 object identifier and the Duca H.221 key are on the wire.
        assert_eq!(&encoded[1..7], [0x05, 0x00, 0x14, 0x7C, 0x00, 0x01]);
        assert!(encoded.windows(4).any(|w| w == b"Duca"));

        let decoded: ConferenceCreateRequest = decode(&encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn conference_create_response_round_trip() {
        let response = ConferenceCreateResponse {
            user_id: 1002,
            gcc_blocks: ServerGccBlocks {
                core: gcc::ServerCoreData {
                    version: gcc::RdpVersion::V5_PLUS,
                    client_requested_protocols: Some(SecurityProtocol::HYBRID),
                    early_capability_flags: None,
                },
                network: gcc::ServerNetworkData {
                    io_channel: 1003,
                    channel_ids: Vec::new(),
                },
                security: gcc::ServerSecurityData::no_security(),
            },
        };

        let encoded = encode_vec(&response).unwrap();
        assert_eq!(encoded.len(), response.size());
        assert!(encoded.windows(4).any(|w| w == b"McDn"));

        let decoded: ConferenceCreateResponse = decode(&encoded).unwrap();
        assert_eq!(decoded, response);
    }
}
