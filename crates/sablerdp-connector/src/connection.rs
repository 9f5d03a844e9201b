//! The client connection sequence, end to end: connection initiation,
//! security upgrade, CredSSP, basic settings exchange, channel connection,
//! (optional) security exchange, secure settings, licensing, capability
//! exchange and finalization.

use core::mem;

use rand::rngs::OsRng;
use rand::RngCore as _;
use sablerdp_core::{decode, WriteBuf};
use sablerdp_pdu::rdp::capability_sets::{self, CapabilitySet, ClientConfirmActive};
use sablerdp_pdu::rdp::headers::{ShareControlHeader, ShareControlPdu};
use sablerdp_pdu::x224::X224;
use sablerdp_pdu::{gcc, mcs, nego, rdp, PduHint};

use crate::channel_connection::{ChannelConnectionSequence, ChannelConnectionState};
use crate::connection_finalization::ConnectionFinalizationSequence;
use crate::license_exchange::LicenseExchangeSequence;
use crate::{
    encode_send_data_request, encode_x224_packet, Config, ConnectorError, ConnectorErrorExt as _, ConnectorErrorKind,
    ConnectorResult, DesktopSize, Sequence, State, Written,
};

const CLIENT_RANDOM_SIZE: usize = 32;

/// What the rest of the library needs to know once the sequence completed.
#[derive(Debug, Clone)]
pub struct ConnectionResult {
    pub io_channel_id: u16,
    pub user_channel_id: u16,
    pub share_id: u32,
    pub desktop_size: DesktopSize,
    pub joined_channel_ids: Vec<u16>,
    pub selected_protocol: nego::SecurityProtocol,
}

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum ClientConnectorState {
    #[default]
    Consumed,

    ConnectionInitiationSendRequest,
    ConnectionInitiationWaitConfirm {
        requested_protocol: nego::SecurityProtocol,
    },
    EnhancedSecurityUpgrade {
        selected_protocol: nego::SecurityProtocol,
    },
    Credssp {
        selected_protocol: nego::SecurityProtocol,
    },
    BasicSettingsExchangeSendInitial {
        selected_protocol: nego::SecurityProtocol,
    },
    BasicSettingsExchangeWaitResponse {
        selected_protocol: nego::SecurityProtocol,
        connect_initial: Box<mcs::ConnectInitial>,
    },
    ChannelConnection {
        selected_protocol: nego::SecurityProtocol,
        io_channel_id: u16,
        joined_channel_ids: Vec<u16>,
        server_security: Box<gcc::ServerSecurityData>,
        channel_connection: ChannelConnectionSequence,
    },
    SecurityExchange {
        selected_protocol: nego::SecurityProtocol,
        io_channel_id: u16,
        user_channel_id: u16,
        joined_channel_ids: Vec<u16>,
        server_security: Box<gcc::ServerSecurityData>,
    },
    SecureSettingsExchange {
        selected_protocol: nego::SecurityProtocol,
        io_channel_id: u16,
        user_channel_id: u16,
        joined_channel_ids: Vec<u16>,
    },
    LicensingExchange {
        selected_protocol: nego::SecurityProtocol,
        io_channel_id: u16,
        user_channel_id: u16,
        joined_channel_ids: Vec<u16>,
        license_exchange: LicenseExchangeSequence,
    },
    CapabilitiesExchange {
        selected_protocol: nego::SecurityProtocol,
        io_channel_id: u16,
        user_channel_id: u16,
        joined_channel_ids: Vec<u16>,
    },
    ConnectionFinalization {
        selected_protocol: nego::SecurityProtocol,
        io_channel_id: u16,
        user_channel_id: u16,
        share_id: u32,
        desktop_size: DesktopSize,
        joined_channel_ids: Vec<u16>,
        finalization: ConnectionFinalizationSequence,
    },
    Connected {
        result: ConnectionResult,
    },
}

impl State for ClientConnectorState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::ConnectionInitiationSendRequest => "ConnectionInitiationSendRequest",
            Self::ConnectionInitiationWaitConfirm { .. } => "ConnectionInitiationWaitConfirm",
            Self::EnhancedSecurityUpgrade { .. } => "EnhancedSecurityUpgrade",
            Self::Credssp { .. } => "Credssp",
            Self::BasicSettingsExchangeSendInitial { .. } => "BasicSettingsExchangeSendInitial",
            Self::BasicSettingsExchangeWaitResponse { .. } => "BasicSettingsExchangeWaitResponse",
            Self::ChannelConnection { .. } => "ChannelConnection",
            Self::SecurityExchange { .. } => "SecurityExchange",
            Self::SecureSettingsExchange { .. } => "SecureSettingsExchange",
            Self::LicensingExchange { .. } => "LicensingExchange",
            Self::CapabilitiesExchange { .. } => "CapabilitiesExchange",
            Self::ConnectionFinalization { .. } => "ConnectionFinalization",
            Self::Connected { .. } => "Connected",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

/// Drives the whole connection sequence; the caller performs the TLS upgrade
/// and CredSSP when the corresponding states are reached.
#[derive(Debug)]
pub struct ClientConnector {
    pub config: Config,
    pub state: ClientConnectorState,
}

impl ClientConnector {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: ClientConnectorState::ConnectionInitiationSendRequest,
        }
    }

    /// True when the caller must upgrade the socket to TLS in place.
    pub fn should_perform_security_upgrade(&self) -> bool {
        match &self.state {
            ClientConnectorState::EnhancedSecurityUpgrade { selected_protocol } => selected_protocol
                .intersects(nego::SecurityProtocol::SSL | nego::SecurityProtocol::HYBRID),
            _ => false,
        }
    }

    pub fn mark_security_upgrade_as_done(&mut self) {
        assert!(matches!(self.state, ClientConnectorState::EnhancedSecurityUpgrade { .. }));
        self.step(&[], &mut WriteBuf::new()).expect("transition to next state");
    }

    /// True when the caller must run the CredSSP exchange on the upgraded
    /// stream.
    pub fn should_perform_credssp(&self) -> bool {
        matches!(self.state, ClientConnectorState::Credssp { .. })
    }

    pub fn mark_credssp_as_done(&mut self) {
        assert!(self.should_perform_credssp());
        let res = self.step(&[], &mut WriteBuf::new()).expect("transition to next state");
        debug_assert!(!self.should_perform_credssp());
        debug_assert!(res.is_nothing());
    }
}

impl Sequence for ClientConnector {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match &self.state {
            ClientConnectorState::ConnectionInitiationWaitConfirm { .. } => Some(&sablerdp_pdu::X224_HINT),
            ClientConnectorState::BasicSettingsExchangeWaitResponse { .. } => Some(&sablerdp_pdu::X224_HINT),
            ClientConnectorState::ChannelConnection { channel_connection, .. } => channel_connection.next_pdu_hint(),
            ClientConnectorState::LicensingExchange { license_exchange, .. } => license_exchange.next_pdu_hint(),
            ClientConnectorState::CapabilitiesExchange { .. } => Some(&sablerdp_pdu::X224_HINT),
            ClientConnectorState::ConnectionFinalization { finalization, .. } => finalization.next_pdu_hint(),
            _ => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            ClientConnectorState::Consumed => {
                return Err(general_err!("connector sequence state is consumed (this is a bug)"))
            }

            //== Connection Initiation ==//
            // Advertise the supported security protocols: Standard RDP
            // security is the implicit zero, TLS and CredSSP are flags.
            ClientConnectorState::ConnectionInitiationSendRequest => {
                debug!("Connection Initiation");

                let mut requested_protocol = nego::SecurityProtocol::RDP;

                if self.config.enable_tls {
                    requested_protocol |= nego::SecurityProtocol::SSL;
                }

                if self.config.enable_credssp {
                    requested_protocol |= nego::SecurityProtocol::SSL | nego::SecurityProtocol::HYBRID;
                }

                let connection_request = nego::ConnectionRequest {
                    cookie: Some(nego::Cookie(cookie_identifier(&self.config.credentials.username))),
                    flags: nego::RequestFlags::empty(),
                    protocol: requested_protocol,
                };

                debug!(message = ?connection_request, "Send");

                let written =
                    sablerdp_core::encode_buf(&X224(connection_request), output).map_err(ConnectorError::encode)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::ConnectionInitiationWaitConfirm { requested_protocol },
                )
            }

            ClientConnectorState::ConnectionInitiationWaitConfirm { requested_protocol } => {
                let connection_confirm = decode::<X224<nego::ConnectionConfirm>>(input)
                    .map_err(ConnectorError::decode)?
                    .0;

                debug!(message = ?connection_confirm, "Received");

                let (flags, selected_protocol) = match connection_confirm {
                    nego::ConnectionConfirm::Response { flags, protocol } => (flags, protocol),
                    nego::ConnectionConfirm::Failure { code } => {
                        error!(?code, "Received connection failure code");
                        return Err(ConnectorError::new(
                            "negotiation failure",
                            ConnectorErrorKind::Negotiation(code),
                        ));
                    }
                };

                info!(?selected_protocol, ?flags, "Server confirmed connection");

                // An empty response is the server falling back to standard
                // RDP security; anything else must be a subset of what was
                // requested.
                if !selected_protocol.is_standard_rdp_security() && !selected_protocol.intersects(requested_protocol) {
                    return Err(reason_err!(
                        "Initiation",
                        "client advertised {requested_protocol:?}, but the server selected {selected_protocol:?}",
                    ));
                }

                (
                    Written::Nothing,
                    ClientConnectorState::EnhancedSecurityUpgrade { selected_protocol },
                )
            }

            //== Upgrade to Enhanced RDP Security ==//
            // The caller performs the in-place TLS handshake when the
            // selected protocol needs one, then re-enters.
            ClientConnectorState::EnhancedSecurityUpgrade { selected_protocol } => {
                let next_state = if selected_protocol.intersects(nego::SecurityProtocol::HYBRID) {
                    debug!("Begin NLA using CredSSP");
                    ClientConnectorState::Credssp { selected_protocol }
                } else {
                    ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol }
                };

                (Written::Nothing, next_state)
            }

            //== CredSSP ==//
            // Driven by the caller on the upgraded stream.
            ClientConnectorState::Credssp { selected_protocol } => (
                Written::Nothing,
                ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol },
            ),

            //== Basic Settings Exchange ==//
            ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol } => {
                debug!("Basic Settings Exchange");

                let client_gcc_blocks = create_gcc_blocks(&self.config, selected_protocol);
                let connect_initial = mcs::ConnectInitial::with_gcc_blocks(client_gcc_blocks);

                debug!(message = ?connect_initial, "Send");

                let written = encode_x224_packet(&connect_initial, output)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::BasicSettingsExchangeWaitResponse {
                        selected_protocol,
                        connect_initial: Box::new(connect_initial),
                    },
                )
            }

            ClientConnectorState::BasicSettingsExchangeWaitResponse {
                selected_protocol,
                connect_initial: _,
            } => {
                let x224_payload = decode::<X224<sablerdp_pdu::x224::X224Data<'_>>>(input)
                    .map_err(ConnectorError::decode)?
                    .0;
                let connect_response =
                    decode::<mcs::ConnectResponse>(x224_payload.data.as_ref()).map_err(ConnectorError::decode)?;

                debug!(message = ?connect_response, "Received");

                if connect_response.result != 0 {
                    return Err(reason_err!(
                        "ConnectResponse",
                        "MCS connect rejected (result {})",
                        connect_response.result,
                    ));
                }

                let server_blocks = connect_response.conference_create_response.gcc_blocks;
                let io_channel_id = server_blocks.io_channel_id();
                let channel_ids = server_blocks.channel_ids();
                let server_security = server_blocks.security;

                debug!(?channel_ids, io_channel_id);

                (
                    Written::Nothing,
                    ClientConnectorState::ChannelConnection {
                        selected_protocol,
                        io_channel_id,
                        joined_channel_ids: Vec::new(),
                        server_security: Box::new(server_security),
                        channel_connection: ChannelConnectionSequence::new(io_channel_id, channel_ids),
                    },
                )
            }

            //== Channel Connection ==//
            ClientConnectorState::ChannelConnection {
                selected_protocol,
                io_channel_id,
                mut joined_channel_ids,
                server_security,
                mut channel_connection,
            } => {
                let written = channel_connection.step(input, output)?;

                if let ChannelConnectionState::WaitChannelJoinConfirm {
                    expected_channel_id, ..
                } = &channel_connection.state
                {
                    if !joined_channel_ids.contains(expected_channel_id) {
                        joined_channel_ids.push(*expected_channel_id);
                    }
                }

                let next_state = if let ChannelConnectionState::AllJoined { user_channel_id } = channel_connection.state
                {
                    ClientConnectorState::SecurityExchange {
                        selected_protocol,
                        io_channel_id,
                        user_channel_id,
                        joined_channel_ids,
                        server_security,
                    }
                } else {
                    ClientConnectorState::ChannelConnection {
                        selected_protocol,
                        io_channel_id,
                        joined_channel_ids,
                        server_security,
                        channel_connection,
                    }
                };

                (written, next_state)
            }

            //== RDP Security Commencement ==//
            // Under Standard RDP Security the client random travels to the
            // server encrypted with the certificate's RSA public key.
            // Enhanced security (TLS/CredSSP) skips this.
            ClientConnectorState::SecurityExchange {
                selected_protocol,
                io_channel_id,
                user_channel_id,
                joined_channel_ids,
                server_security,
            } => {
                let needs_exchange =
                    selected_protocol.is_standard_rdp_security() && !server_security.encryption_method.is_empty();

                let (written, next_state) = if needs_exchange {
                    let server_cert = server_security.server_cert.as_ref().ok_or_else(|| {
                        general_err!("server negotiated encryption without sending a certificate")
                    })?;

                    let mut client_random = [0u8; CLIENT_RANDOM_SIZE];
                    OsRng.fill_bytes(&mut client_random);

                    let security_exchange = rdp::SecurityExchangePdu {
                        encrypted_client_random: server_cert.public_key.encrypt(&client_random),
                    };

                    debug!("Send Security Exchange PDU");
                    // Session-level RC4 encryption is not implemented; after
                    // this point the server still expects encrypted PDUs
                    // when the encryption level is above None.
                    warn!("Standard RDP security selected: session encryption is not supported by this client");

                    let written =
                        encode_send_data_request(user_channel_id, io_channel_id, &security_exchange, output)?;

                    (
                        Written::from_size(written)?,
                        ClientConnectorState::SecureSettingsExchange {
                            selected_protocol,
                            io_channel_id,
                            user_channel_id,
                            joined_channel_ids,
                        },
                    )
                } else {
                    (
                        Written::Nothing,
                        ClientConnectorState::SecureSettingsExchange {
                            selected_protocol,
                            io_channel_id,
                            user_channel_id,
                            joined_channel_ids,
                        },
                    )
                };

                (written, next_state)
            }

            //== Secure Settings Exchange ==//
            ClientConnectorState::SecureSettingsExchange {
                selected_protocol,
                io_channel_id,
                user_channel_id,
                joined_channel_ids,
            } => {
                debug!("Secure Settings Exchange");

                let client_info = create_client_info_pdu(&self.config);

                let written = encode_send_data_request(user_channel_id, io_channel_id, &client_info, output)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::LicensingExchange {
                        selected_protocol,
                        io_channel_id,
                        user_channel_id,
                        joined_channel_ids,
                        license_exchange: LicenseExchangeSequence::new(),
                    },
                )
            }

            //== Licensing ==//
            ClientConnectorState::LicensingExchange {
                selected_protocol,
                io_channel_id,
                user_channel_id,
                joined_channel_ids,
                mut license_exchange,
            } => {
                debug!("Licensing Exchange");

                let written = license_exchange.step(input, output)?;

                let next_state = if license_exchange.state.is_terminal() {
                    ClientConnectorState::CapabilitiesExchange {
                        selected_protocol,
                        io_channel_id,
                        user_channel_id,
                        joined_channel_ids,
                    }
                } else {
                    ClientConnectorState::LicensingExchange {
                        selected_protocol,
                        io_channel_id,
                        user_channel_id,
                        joined_channel_ids,
                        license_exchange,
                    }
                };

                (written, next_state)
            }

            //== Capability Exchange ==//
            // Parse the Demand Active, remember its share id and reply with
            // the full Confirm Active capability list.
            ClientConnectorState::CapabilitiesExchange {
                selected_protocol,
                io_channel_id,
                user_channel_id,
                joined_channel_ids,
            } => {
                debug!("Capabilities Exchange");

                let indication = crate::decode_send_data_indication(input)?;
                let share_control = crate::decode_share_control(indication)?;

                let demand_active = match share_control.share_control_pdu {
                    ShareControlPdu::ServerDemandActive(demand_active) => demand_active,
                    _ => {
                        return Err(general_err!(
                            "unexpected share control PDU (expected Server Demand Active)"
                        ))
                    }
                };

                debug!(share_id = demand_active.share_id, "Received Server Demand Active");

                // The server's bitmap capability is authoritative for the
                // session's desktop size.
                let desktop_size = demand_active
                    .capability_sets
                    .iter()
                    .find_map(|set| match set {
                        CapabilitySet::Bitmap(bitmap) => Some(DesktopSize {
                            width: bitmap.desktop_width,
                            height: bitmap.desktop_height,
                        }),
                        _ => None,
                    })
                    .unwrap_or(self.config.desktop_size);

                let share_id = demand_active.share_id;

                let confirm_active = ShareControlHeader {
                    share_control_pdu: ShareControlPdu::ClientConfirmActive(ClientConfirmActive {
                        share_id,
                        capability_sets: create_client_capability_sets(&self.config, desktop_size),
                    }),
                    pdu_source: user_channel_id,
                    share_id,
                };

                let written = encode_send_data_request(user_channel_id, io_channel_id, &confirm_active, output)?;

                (
                    Written::from_size(written)?,
                    ClientConnectorState::ConnectionFinalization {
                        selected_protocol,
                        io_channel_id,
                        user_channel_id,
                        share_id,
                        desktop_size,
                        joined_channel_ids,
                        finalization: ConnectionFinalizationSequence::new(io_channel_id, user_channel_id, share_id),
                    },
                )
            }

            //== Connection Finalization ==//
            ClientConnectorState::ConnectionFinalization {
                selected_protocol,
                io_channel_id,
                user_channel_id,
                share_id,
                desktop_size,
                joined_channel_ids,
                mut finalization,
            } => {
                let written = finalization.step(input, output)?;

                let next_state = if finalization.state().is_terminal() {
                    ClientConnectorState::Connected {
                        result: ConnectionResult {
                            io_channel_id,
                            user_channel_id,
                            share_id,
                            desktop_size,
                            joined_channel_ids,
                            selected_protocol,
                        },
                    }
                } else {
                    ClientConnectorState::ConnectionFinalization {
                        selected_protocol,
                        io_channel_id,
                        user_channel_id,
                        share_id,
                        desktop_size,
                        joined_channel_ids,
                        finalization,
                    }
                };

                (written, next_state)
            }

            //== Connected ==//
            ClientConnectorState::Connected { .. } => return Err(general_err!("already connected")),
        };

        self.state = next_state;

        Ok(written)
    }
}

/// The routing cookie identifier: the 9 first characters of the username, as
/// `mstsc` does.
fn cookie_identifier(username: &str) -> String {
    username.chars().take(9).collect()
}

fn create_gcc_blocks(config: &Config, selected_protocol: nego::SecurityProtocol) -> gcc::ClientGccBlocks {
    gcc::ClientGccBlocks {
        core: gcc::ClientCoreData {
            version: gcc::RdpVersion::V5_PLUS,
            desktop_width: config.desktop_size.width,
            desktop_height: config.desktop_size.height,
            keyboard_layout: 0, // the server's default
            client_build: config.client_build,
            client_name: config.client_name.clone(),
            keyboard_type: config.keyboard_type,
            keyboard_subtype: config.keyboard_subtype,
            keyboard_functional_keys_count: config.keyboard_functional_keys_count,
            ime_file_name: config.ime_file_name.clone(),
            high_color_depth: gcc::HighColorDepth::Bpp24,
            supported_color_depths: gcc::SupportedColorDepths::BPP24 | gcc::SupportedColorDepths::BPP16,
            early_capability_flags: gcc::ClientEarlyCapabilityFlags::VALID_CONNECTION_TYPE
                | gcc::ClientEarlyCapabilityFlags::SUPPORT_ERR_INFO_PDU,
            dig_product_id: config.dig_product_id.clone(),
            connection_type: gcc::ConnectionType::Lan,
            server_selected_protocol: selected_protocol,
        },
        security: gcc::ClientSecurityData::no_security(),
        network: gcc::ClientNetworkData { channels: Vec::new() },
        cluster: Some(gcc::ClientClusterData {
            flags: gcc::RedirectionFlags::REDIRECTION_SUPPORTED,
            redirection_version: gcc::RedirectionVersion::V4,
            redirected_session_id: 0,
        }),
    }
}

fn create_client_info_pdu(config: &Config) -> rdp::ClientInfoPdu {
    use sablerdp_pdu::rdp::client_info::{
        AddressFamily, ClientInfo, ClientInfoFlags, Credentials, ExtendedClientInfo,
    };

    let flags = ClientInfoFlags::MOUSE
        | ClientInfoFlags::UNICODE
        | ClientInfoFlags::LOGON_NOTIFY
        | ClientInfoFlags::DISABLE_CTRL_ALT_DEL
        | ClientInfoFlags::ENABLE_WINDOWS_KEY
        | ClientInfoFlags::MAXIMIZE_SHELL
        | ClientInfoFlags::AUTOLOGON;

    let client_info = ClientInfo {
        credentials: Credentials {
            username: config.credentials.username.clone(),
            password: config.credentials.password.clone(),
            domain: config.credentials.domain.clone(),
        },
        code_page: 0, // ignored when the keyboard layout is zero
        flags,
        alternate_shell: String::new(),
        work_dir: String::new(),
        extra_info: ExtendedClientInfo {
            address_family: if config.client_address.contains(':') {
                AddressFamily::Inet6
            } else {
                AddressFamily::Inet
            },
            address: config.client_address.clone(),
            dir: String::new(),
            performance_flags: config.performance_flags,
        },
    };

    rdp::ClientInfoPdu::new(client_info)
}

/// The full Confirm Active capability list, with all draw orders disabled:
/// this client renders from bitmap updates only.
fn create_client_capability_sets(config: &Config, desktop_size: DesktopSize) -> Vec<CapabilitySet> {
    vec![
        CapabilitySet::General(capability_sets::General {
            major_platform_type: capability_sets::MajorPlatformType::Unix,
            minor_platform_type: capability_sets::MinorPlatformType::NativeXServer,
            extra_flags: capability_sets::GeneralExtraFlags::FASTPATH_OUTPUT_SUPPORTED
                | capability_sets::GeneralExtraFlags::NO_BITMAP_COMPRESSION_HDR
                | capability_sets::GeneralExtraFlags::LONG_CREDENTIALS_SUPPORTED,
            refresh_rect_support: true,
            suppress_output_support: true,
        }),
        CapabilitySet::Bitmap(capability_sets::Bitmap {
            preferred_bits_per_pixel: 24,
            desktop_width: desktop_size.width,
            desktop_height: desktop_size.height,
            desktop_resize_supported: false,
            drawing_flags: capability_sets::BitmapDrawingFlags::empty(),
        }),
        CapabilitySet::Order(capability_sets::Order::bitmap_only()),
        CapabilitySet::BitmapCacheRev2(capability_sets::BitmapCacheRev2::disabled()),
        CapabilitySet::Input(capability_sets::Input {
            input_flags: capability_sets::InputFlags::SCANCODES
                | capability_sets::InputFlags::UNICODE
                | capability_sets::InputFlags::MOUSEX,
            keyboard_layout: 0,
            keyboard_type: config.keyboard_type,
            keyboard_subtype: config.keyboard_subtype,
            keyboard_function_key: config.keyboard_functional_keys_count,
        }),
        CapabilitySet::Pointer(capability_sets::Pointer {
            color_pointer_cache_size: 20,
            pointer_cache_size: 20,
        }),
        CapabilitySet::Brush(capability_sets::Brush {
            support_level: capability_sets::BrushSupportLevel::Default,
        }),
        CapabilitySet::GlyphCache(capability_sets::GlyphCache::unsupported()),
        CapabilitySet::OffscreenBitmapCache(capability_sets::OffscreenBitmapCache {
            supported: false,
            cache_size: 0,
            cache_entries: 0,
        }),
        CapabilitySet::VirtualChannel(capability_sets::VirtualChannel {
            flags: capability_sets::VirtualChannelFlags::empty(),
            chunk_size: None,
        }),
        CapabilitySet::Sound(capability_sets::Sound {
            flags: capability_sets::SoundFlags::empty(),
        }),
        CapabilitySet::Share(capability_sets::Share { node_id: 0 }),
        CapabilitySet::Font(capability_sets::Font {
            flags: capability_sets::FontSupportFlags::FONTSUPPORT_FONTLIST,
        }),
        CapabilitySet::ColorCache(capability_sets::ColorCache { cache_size: 6 }),
        CapabilitySet::Control(capability_sets::Control),
        CapabilitySet::WindowActivation(capability_sets::WindowActivation),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuthIdentity;

    fn config() -> Config {
        Config {
            desktop_size: DesktopSize {
                width: 1024,
                height: 768,
            },
            credentials: AuthIdentity {
                username: "automation".to_owned(),
                password: "hunter2".to_owned(),
                domain: None,
            },
            enable_tls: true,
            enable_credssp: true,
            client_build: 0,
            client_name: "sable".to_owned(),
            keyboard_type: 4,
            keyboard_subtype: 0,
            keyboard_functional_keys_count: 12,
            ime_file_name: String::new(),
            dig_product_id: String::new(),
            client_address: "192.0.2.10".to_owned(),
            performance_flags: Config::fast_path_performance_flags(),
        }
    }

    #[test]
    fn connection_request_advertises_tls_and_credssp() {
        let mut connector = ClientConnector::new(config());
        let mut buf = WriteBuf::new();

        let written = connector.step_no_input(&mut buf).unwrap();
        assert!(written.size().is_some());

        let frame = buf.filled();
        // The routing cookie truncated to nine characters.
        let cookie = b"Cookie: mstshash=automatio\r\n";
        assert_eq!(&frame[11..11 + cookie.len()], cookie);

        // Requested protocols: SSL | HYBRID.
        let protocols = u32::from_le_bytes(frame[frame.len() - 4..].try_into().unwrap());
        assert_eq!(protocols, 0x03);
    }

    #[test]
    fn negotiation_failure_is_fatal_with_the_server_code() {
        let mut connector = ClientConnector::new(config());
        let mut buf = WriteBuf::new();
        connector.step_no_input(&mut buf).unwrap();

        let failure = [
            0x03, 0x00, 0x00, 0x13, 0x0E, 0xD0, 0x00, 0x00, 0x12, 0x34, 0x00, // headers
            0x03, 0x00, 0x08, 0x00, 0x05, 0x00, 0x00, 0x00, // HYBRID_REQUIRED_BY_SERVER
        ];

        buf.clear();
        let err = connector.step(&failure, &mut buf).unwrap_err();
        assert!(matches!(err.kind(), ConnectorErrorKind::Negotiation(_)));
    }

    #[test]
    fn security_upgrade_is_requested_for_hybrid() {
        let mut connector = ClientConnector::new(config());
        let mut buf = WriteBuf::new();
        connector.step_no_input(&mut buf).unwrap();

        let confirm = [
            0x03, 0x00, 0x00, 0x13, 0x0E, 0xD0, 0x00, 0x00, 0x12, 0x34, 0x00, // headers
            0x02, 0x00, 0x08, 0x00, 0x02, 0x00, 0x00, 0x00, // selected HYBRID
        ];

        buf.clear();
        connector.step(&confirm, &mut buf).unwrap();

        assert!(connector.should_perform_security_upgrade());
        connector.mark_security_upgrade_as_done();
        assert!(connector.should_perform_credssp());
        connector.mark_credssp_as_done();
        assert!(matches!(
            connector.state,
            ClientConnectorState::BasicSettingsExchangeSendInitial { .. }
        ));
    }
}
