//! Glue between the sans-io connection sequence and the CredSSP client: the
//! TSRequest frame hint and the per-leg stepping.

use sablerdp_core::{DecodeResult, WriteBuf};
use sablerdp_nla::{AuthIdentity, CredSspClient, TsRequest};
use sablerdp_pdu::PduHint;

use crate::{ConnectorError, ConnectorErrorExt as _, ConnectorResult, Written};

#[derive(Clone, Copy, Debug)]
struct CredsspTsRequestHint;

const CREDSSP_TS_REQUEST_HINT: CredsspTsRequestHint = CredsspTsRequestHint;

impl PduHint for CredsspTsRequestHint {
    fn find_size(&self, bytes: &[u8]) -> DecodeResult<Option<usize>> {
        Ok(TsRequest::frame_length(bytes))
    }
}

/// Runs the CredSSP ladder as a sans-io sequence: TSRequests in, TSRequests
/// out, until [`CredsspSequence::is_done`].
pub struct CredsspSequence {
    client: CredSspClient,
    first_leg_sent: bool,
}

impl CredsspSequence {
    /// `server_public_key` is the DER SubjectPublicKey extracted from the
    /// TLS certificate during the security upgrade.
    pub fn new(credentials: AuthIdentity, server_public_key: Vec<u8>) -> Self {
        Self {
            client: CredSspClient::new(server_public_key, credentials),
            first_leg_sent: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.client.is_done()
    }

    pub fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        if !self.first_leg_sent || self.client.is_done() {
            None
        } else {
            Some(&CREDSSP_TS_REQUEST_HINT)
        }
    }

    /// Feeds the next server TSRequest (or nothing, for the first leg) and
    /// writes the client's reply into `output`.
    pub fn step(&mut self, input: Option<&[u8]>, output: &mut WriteBuf) -> ConnectorResult<Written> {
        let request = input
            .map(TsRequest::decode)
            .transpose()
            .map_err(ConnectorError::nla)?;

        if let Some(request) = &request {
            debug!(version = request.version, "Received TSRequest");
        }

        let reply = self.client.process(request).map_err(ConnectorError::nla)?;

        self.first_leg_sent = true;

        match reply {
            Some(reply) => {
                let encoded = reply.encode();
                output.write_slice(&encoded);
                Written::from_size(encoded.len())
            }
            None => Ok(Written::Nothing),
        }
    }
}
