//! Connection finalization: Synchronize, Control (Cooperate), Control
//! (Request Control), Font List, then the server's four replies.

use std::mem;

use sablerdp_pdu::rdp::capability_sets::SERVER_CHANNEL_ID;
use sablerdp_pdu::rdp::finalization_messages::{ControlAction, ControlPdu, FontPdu, SynchronizePdu};
use sablerdp_pdu::rdp::headers::ShareDataPdu;
use sablerdp_pdu::PduHint;

use sablerdp_core::WriteBuf;

use crate::{decode_share_data, encode_share_data, ConnectorResult, Sequence, State, Written};

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum ConnectionFinalizationState {
    #[default]
    Consumed,

    SendSynchronize,
    SendControlCooperate,
    SendRequestControl,
    SendFontList,

    WaitForResponse,

    Finished,
}

impl State for ConnectionFinalizationState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::SendSynchronize => "SendSynchronize",
            Self::SendControlCooperate => "SendControlCooperate",
            Self::SendRequestControl => "SendRequestControl",
            Self::SendFontList => "SendFontList",
            Self::WaitForResponse => "WaitForResponse",
            Self::Finished => "Finished",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

#[derive(Debug)]
pub struct ConnectionFinalizationSequence {
    pub state: ConnectionFinalizationState,
    io_channel_id: u16,
    user_channel_id: u16,
    share_id: u32,
}

impl ConnectionFinalizationSequence {
    pub fn new(io_channel_id: u16, user_channel_id: u16, share_id: u32) -> Self {
        Self {
            state: ConnectionFinalizationState::SendSynchronize,
            io_channel_id,
            user_channel_id,
            share_id,
        }
    }
}

impl Sequence for ConnectionFinalizationSequence {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match self.state {
            ConnectionFinalizationState::WaitForResponse => Some(&sablerdp_pdu::X224_HINT),
            _ => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            ConnectionFinalizationState::Consumed => {
                return Err(general_err!(
                    "connection finalization sequence state is consumed (this is a bug)"
                ))
            }

            ConnectionFinalizationState::SendSynchronize => {
                let message = ShareDataPdu::Synchronize(SynchronizePdu {
                    target_user_id: self.user_channel_id,
                });

                debug!(?message, "Send");

                let written = encode_share_data(self.user_channel_id, self.io_channel_id, self.share_id, message, output)?;

                (
                    Written::from_size(written)?,
                    ConnectionFinalizationState::SendControlCooperate,
                )
            }

            ConnectionFinalizationState::SendControlCooperate => {
                let message = ShareDataPdu::Control(ControlPdu {
                    action: ControlAction::Cooperate,
                    grant_id: 0,
                    control_id: 0,
                });

                debug!(?message, "Send");

                let written = encode_share_data(self.user_channel_id, self.io_channel_id, self.share_id, message, output)?;

                (
                    Written::from_size(written)?,
                    ConnectionFinalizationState::SendRequestControl,
                )
            }

            ConnectionFinalizationState::SendRequestControl => {
                let message = ShareDataPdu::Control(ControlPdu {
                    action: ControlAction::RequestControl,
                    grant_id: 0,
                    control_id: 0,
                });

                debug!(?message, "Send");

                let written = encode_share_data(self.user_channel_id, self.io_channel_id, self.share_id, message, output)?;

                (Written::from_size(written)?, ConnectionFinalizationState::SendFontList)
            }

            ConnectionFinalizationState::SendFontList => {
                let message = ShareDataPdu::FontList(FontPdu::default());

                debug!(?message, "Send");

                let written = encode_share_data(self.user_channel_id, self.io_channel_id, self.share_id, message, output)?;

                (
                    Written::from_size(written)?,
                    ConnectionFinalizationState::WaitForResponse,
                )
            }

            ConnectionFinalizationState::WaitForResponse => {
                let message = decode_share_data(input)?;

                debug!(?message, "Received");

                let next_state = match message {
                    ShareDataPdu::Synchronize(_) => {
                        debug!("Server Synchronize");
                        ConnectionFinalizationState::WaitForResponse
                    }
                    ShareDataPdu::Control(control_pdu) => match control_pdu.action {
                        ControlAction::Cooperate => {
                            if control_pdu.grant_id == 0 && control_pdu.control_id == 0 {
                                debug!("Server Control (Cooperate)");
                                ConnectionFinalizationState::WaitForResponse
                            } else {
                                return Err(general_err!("invalid Control Cooperate PDU"));
                            }
                        }
                        ControlAction::GrantedControl => {
                            if control_pdu.grant_id == self.user_channel_id
                                && control_pdu.control_id == u32::from(SERVER_CHANNEL_ID)
                            {
                                debug!("Server Control (Granted Control)");
                                ConnectionFinalizationState::WaitForResponse
                            } else {
                                return Err(general_err!("invalid Granted Control PDU"));
                            }
                        }
                        _ => return Err(general_err!("unexpected control action")),
                    },
                    ShareDataPdu::ServerSetErrorInfo(pdu) => {
                        if pdu.0.is_error() {
                            return Err(reason_err!("Finalization", "{}", pdu.0.description()));
                        }
                        ConnectionFinalizationState::WaitForResponse
                    }
                    // Upon the Font Map PDU the server may start sending
                    // graphics output.
                    ShareDataPdu::FontMap(_) => ConnectionFinalizationState::Finished,
                    _ => return Err(general_err!("unexpected server message during finalization")),
                };

                (Written::Nothing, next_state)
            }

            ConnectionFinalizationState::Finished => return Err(general_err!("finalization already finished")),
        };

        self.state = next_state;

        Ok(written)
    }
}
