//! GCC user data blocks carried inside the MCS Connect Initial / Response.
//!
//! Each block is wrapped in a TS_UD_HEADER: a little-endian block type
//! followed by the block length including the 4-byte header itself.

use sablerdp_core::{
    cast_length, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

pub mod cluster_data;
pub mod conference_create;
pub mod core_data;
pub mod network_data;
pub mod security_data;

pub use self::cluster_data::{ClientClusterData, RedirectionFlags, RedirectionVersion};
pub use self::conference_create::{ConferenceCreateRequest, ConferenceCreateResponse};
pub use self::core_data::{
    ClientCoreData, ClientEarlyCapabilityFlags, ColorDepth, ConnectionType, HighColorDepth, RdpVersion,
    SecureAccessSequence, ServerCoreData, SupportedColorDepths,
};
pub use self::network_data::{ChannelDef, ChannelName, ChannelOptions, ClientNetworkData, ServerNetworkData};
pub use self::security_data::{
    ClientSecurityData, EncryptionLevel, EncryptionMethod, RsaPublicKey, ServerCertificate, ServerSecurityData,
};

const USER_DATA_HEADER_SIZE: usize = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
enum ClientBlockType {
    Core = 0xC001,
    Security = 0xC002,
    Network = 0xC003,
    Cluster = 0xC004,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
enum ServerBlockType {
    Core = 0x0C01,
    Security = 0x0C02,
    Network = 0x0C03,
}

/// The client-to-server user data blocks, in the order the server expects
/// them: CS_CORE, CS_SECURITY, CS_NET, CS_CLUSTER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGccBlocks {
    pub core: ClientCoreData,
    pub security: ClientSecurityData,
    pub network: ClientNetworkData,
    pub cluster: Option<ClientClusterData>,
}

impl ClientGccBlocks {
    const NAME: &'static str = "ClientGccBlocks";
}

impl Encode for ClientGccBlocks {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        write_block(dst, ClientBlockType::Core as u16, &self.core)?;
        write_block(dst, ClientBlockType::Security as u16, &self.security)?;
        write_block(dst, ClientBlockType::Network as u16, &self.network)?;

        if let Some(cluster) = &self.cluster {
            write_block(dst, ClientBlockType::Cluster as u16, cluster)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let mut size = USER_DATA_HEADER_SIZE * 3 + self.core.size() + self.security.size() + self.network.size();

        if let Some(cluster) = &self.cluster {
            size += USER_DATA_HEADER_SIZE + cluster.size();
        }

        size
    }
}

impl<'de> Decode<'de> for ClientGccBlocks {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let mut core = None;
        let mut security = None;
        let mut network = None;
        let mut cluster = None;

        while src.len() >= USER_DATA_HEADER_SIZE {
            let (block_type, mut block) = read_block(src)?;

            match block_type {
                t if t == ClientBlockType::Core as u16 => core = Some(ClientCoreData::decode(&mut block)?),
                t if t == ClientBlockType::Security as u16 => security = Some(ClientSecurityData::decode(&mut block)?),
                t if t == ClientBlockType::Network as u16 => network = Some(ClientNetworkData::decode(&mut block)?),
                t if t == ClientBlockType::Cluster as u16 => cluster = Some(ClientClusterData::decode(&mut block)?),
                // Unknown client blocks are skipped, as servers do.
                _ => {}
            }
        }

        Ok(Self {
            core: core.ok_or_else(|| invalid_field_err!("coreData", "missing client core data"))?,
            security: security.ok_or_else(|| invalid_field_err!("securityData", "missing client security data"))?,
            network: network.ok_or_else(|| invalid_field_err!("networkData", "missing client network data"))?,
            cluster,
        })
    }
}

/// The server-to-client user data blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerGccBlocks {
    pub core: ServerCoreData,
    pub network: ServerNetworkData,
    pub security: ServerSecurityData,
}

impl ServerGccBlocks {
    const NAME: &'static str = "ServerGccBlocks";

    pub fn io_channel_id(&self) -> u16 {
        self.network.io_channel
    }

    pub fn channel_ids(&self) -> Vec<u16> {
        self.network.channel_ids.clone()
    }
}

impl Encode for ServerGccBlocks {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        write_block(dst, ServerBlockType::Core as u16, &self.core)?;
        write_block(dst, ServerBlockType::Network as u16, &self.network)?;
        write_block(dst, ServerBlockType::Security as u16, &self.security)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        USER_DATA_HEADER_SIZE * 3 + self.core.size() + self.network.size() + self.security.size()
    }
}

impl<'de> Decode<'de> for ServerGccBlocks {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let mut core = None;
        let mut network = None;
        let mut security = None;

        while src.len() >= USER_DATA_HEADER_SIZE {
            let (block_type, mut block) = read_block(src)?;

            match block_type {
                t if t == ServerBlockType::Core as u16 => core = Some(ServerCoreData::decode(&mut block)?),
                t if t == ServerBlockType::Network as u16 => network = Some(ServerNetworkData::decode(&mut block)?),
                t if t == ServerBlockType::Security as u16 => security = Some(ServerSecurityData::decode(&mut block)?),
                _ => {}
            }
        }

        Ok(Self {
            core: core.ok_or_else(|| invalid_field_err!("coreData", "missing server core data"))?,
            network: network.ok_or_else(|| invalid_field_err!("networkData", "missing server network data"))?,
            security: security.ok_or_else(|| invalid_field_err!("securityData", "missing server security data"))?,
        })
    }
}

fn write_block<T: Encode>(dst: &mut WriteCursor<'_>, block_type: u16, block: &T) -> EncodeResult<()> {
    dst.write_u16(block_type);
    dst.write_u16(cast_length!("blockLen", block.size() + USER_DATA_HEADER_SIZE)?);
    block.encode(dst)
}

fn read_block<'a>(src: &mut ReadCursor<'a>) -> DecodeResult<(u16, ReadCursor<'a>)> {
    let block_type = src.read_u16();
    let block_length = usize::from(src.read_u16());

    if block_length <= USER_DATA_HEADER_SIZE {
        return Err(invalid_field_err!("blockLen", "user data block length too small"));
    }

    let data_length = block_length - USER_DATA_HEADER_SIZE;
    ensure_size!(ctx: "UserDataHeader", in: src, size: data_length);

    Ok((block_type, ReadCursor::new(src.read_slice(data_length))))
}
