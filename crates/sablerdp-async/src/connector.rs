//! Async drivers for the connection sequence: everything before the TLS
//! upgrade, the CredSSP exchange, and everything after.
//!
//! Every step is bounded by the caller's step timeout; a step that does not
//! complete in time fails the whole connection.

use std::time::Duration;

use sablerdp_connector::credssp::CredsspSequence;
use sablerdp_connector::{
    AuthIdentity, ClientConnector, ClientConnectorState, ConnectionResult, ConnectorError, ConnectorErrorExt as _,
    ConnectorResult, Sequence as _, State as _,
};
use sablerdp_core::WriteBuf;

use crate::framed::{single_sequence_step, Framed, FramedRead, FramedWrite};

#[non_exhaustive]
pub struct ShouldUpgrade;

/// Drives the sequence until the TLS upgrade point (or to completion, when
/// the server fell back to standard RDP security and no upgrade happens).
pub async fn connect_begin<S>(
    framed: &mut Framed<S>,
    connector: &mut ClientConnector,
    step_timeout: Duration,
) -> ConnectorResult<ShouldUpgrade>
where
    S: Sync + FramedRead + FramedWrite,
{
    let mut buf = WriteBuf::new();

    info!("Begin connection procedure");

    while !connector.should_perform_security_upgrade() && !connector.state.is_terminal() {
        timed_step(framed, connector, &mut buf, step_timeout).await?;
    }

    Ok(ShouldUpgrade)
}

#[non_exhaustive]
pub struct Upgraded;

/// Marks the in-place TLS upgrade as done, transitioning the connector past
/// its upgrade state.
pub fn mark_as_upgraded(_: ShouldUpgrade, connector: &mut ClientConnector) -> Upgraded {
    trace!("Marked as upgraded");

    if connector.should_perform_security_upgrade() {
        connector.mark_security_upgrade_as_done();
    }

    Upgraded
}

/// Drives the sequence to completion on the upgraded stream, running the
/// CredSSP exchange first when the connector asks for it.
pub async fn connect_finalize<S>(
    _: Upgraded,
    framed: &mut Framed<S>,
    mut connector: ClientConnector,
    server_public_key: Vec<u8>,
    step_timeout: Duration,
) -> ConnectorResult<ConnectionResult>
where
    S: FramedRead + FramedWrite,
{
    let mut buf = WriteBuf::new();

    if connector.should_perform_credssp() {
        perform_credssp_steps(
            framed,
            connector.config.credentials.clone(),
            &mut buf,
            server_public_key,
            step_timeout,
        )
        .await?;
        connector.mark_credssp_as_done();
    }

    let result = loop {
        // The sequence may already have completed before the upgrade point
        // (standard RDP security has no upgrade).
        if matches!(connector.state, ClientConnectorState::Connected { .. }) {
            match core::mem::take(&mut connector.state) {
                ClientConnectorState::Connected { result } => break result,
                _ => unreachable!("just matched"),
            }
        }

        timed_step(framed, &mut connector, &mut buf, step_timeout).await?;
    };

    info!("Connected with success");

    Ok(result)
}

async fn timed_step<S>(
    framed: &mut Framed<S>,
    connector: &mut ClientConnector,
    buf: &mut WriteBuf,
    step_timeout: Duration,
) -> ConnectorResult<()>
where
    S: FramedRead + FramedWrite,
{
    tokio::time::timeout(step_timeout, single_sequence_step(framed, connector, buf))
        .await
        .map_err(|_| step_timeout_err(connector.state.name()))?
}

fn step_timeout_err(state: &'static str) -> ConnectorError {
    ConnectorError::reason(state, "connection sequence step timed out")
}

async fn perform_credssp_steps<S>(
    framed: &mut Framed<S>,
    credentials: AuthIdentity,
    buf: &mut WriteBuf,
    server_public_key: Vec<u8>,
    step_timeout: Duration,
) -> ConnectorResult<()>
where
    S: FramedRead + FramedWrite,
{
    let mut credssp = CredsspSequence::new(credentials, server_public_key);

    while !credssp.is_done() {
        buf.clear();

        let input;
        let input_ref = if let Some(hint) = credssp.next_pdu_hint() {
            debug!(hint = ?hint, "Wait for TSRequest");

            input = tokio::time::timeout(step_timeout, framed.read_by_hint(hint))
                .await
                .map_err(|_| step_timeout_err("Credssp"))?
                .map_err(|e| sablerdp_connector::custom_err!("read frame by hint", e))?;

            Some(&input[..])
        } else {
            None
        };

        let written = credssp.step(input_ref, buf)?;

        if let Some(response_len) = written.size() {
            let response = &buf[..response_len];
            trace!(response_len, "Send TSRequest");
            tokio::time::timeout(step_timeout, framed.write_all(response))
                .await
                .map_err(|_| step_timeout_err("Credssp"))?
                .map_err(|e| sablerdp_connector::custom_err!("write all", e))?;
        }
    }

    Ok(())
}
