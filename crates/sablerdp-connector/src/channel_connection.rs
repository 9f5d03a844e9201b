//! MCS channel connection: Erect Domain, Attach User, and one Channel Join
//! round trip per channel, each confirmed before the next is sent.

use std::collections::VecDeque;
use std::mem;

use sablerdp_core::WriteBuf;
use sablerdp_pdu::x224::X224;
use sablerdp_pdu::{mcs, PduHint};

use crate::{ConnectorError, ConnectorErrorExt as _, ConnectorResult, Sequence, State, Written};

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum ChannelConnectionState {
    #[default]
    Consumed,

    SendErectDomainRequest,
    SendAttachUserRequest,
    WaitAttachUserConfirm,
    SendChannelJoinRequest {
        user_channel_id: u16,
        remaining_channel_ids: VecDeque<u16>,
    },
    WaitChannelJoinConfirm {
        user_channel_id: u16,
        expected_channel_id: u16,
        remaining_channel_ids: VecDeque<u16>,
    },
    AllJoined {
        user_channel_id: u16,
    },
}

impl State for ChannelConnectionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::SendErectDomainRequest => "SendErectDomainRequest",
            Self::SendAttachUserRequest => "SendAttachUserRequest",
            Self::WaitAttachUserConfirm => "WaitAttachUserConfirm",
            Self::SendChannelJoinRequest { .. } => "SendChannelJoinRequest",
            Self::WaitChannelJoinConfirm { .. } => "WaitChannelJoinConfirm",
            Self::AllJoined { .. } => "AllJoined",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::AllJoined { .. })
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

#[derive(Debug)]
pub struct ChannelConnectionSequence {
    pub state: ChannelConnectionState,
    channel_ids: VecDeque<u16>,
}

impl ChannelConnectionSequence {
    /// `channel_ids` are the server-granted channels; the I/O channel must
    /// be among them and is joined first.
    pub fn new(io_channel_id: u16, channel_ids: Vec<u16>) -> Self {
        let mut ordered: VecDeque<u16> = VecDeque::with_capacity(channel_ids.len() + 1);
        ordered.push_back(io_channel_id);
        ordered.extend(channel_ids.into_iter().filter(|id| *id != io_channel_id));

        Self {
            state: ChannelConnectionState::SendErectDomainRequest,
            channel_ids: ordered,
        }
    }

    pub fn user_channel_id(&self) -> Option<u16> {
        match self.state {
            ChannelConnectionState::AllJoined { user_channel_id } => Some(user_channel_id),
            _ => None,
        }
    }
}

impl Sequence for ChannelConnectionSequence {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match self.state {
            ChannelConnectionState::WaitAttachUserConfirm => Some(&sablerdp_pdu::X224_HINT),
            ChannelConnectionState::WaitChannelJoinConfirm { .. } => Some(&sablerdp_pdu::X224_HINT),
            _ => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            ChannelConnectionState::Consumed => {
                return Err(general_err!("channel connection sequence state is consumed (this is a bug)"))
            }

            ChannelConnectionState::SendErectDomainRequest => {
                let erect_domain_request = mcs::ErectDomainPdu {
                    sub_height: 0,
                    sub_interval: 0,
                };

                debug!(message = ?erect_domain_request, "Send");

                let written =
                    sablerdp_core::encode_buf(&X224(erect_domain_request), output).map_err(ConnectorError::encode)?;

                (
                    Written::from_size(written)?,
                    ChannelConnectionState::SendAttachUserRequest,
                )
            }

            ChannelConnectionState::SendAttachUserRequest => {
                let attach_user_request = mcs::AttachUserRequest;

                debug!(message = ?attach_user_request, "Send");

                let written =
                    sablerdp_core::encode_buf(&X224(attach_user_request), output).map_err(ConnectorError::encode)?;

                (
                    Written::from_size(written)?,
                    ChannelConnectionState::WaitAttachUserConfirm,
                )
            }

            ChannelConnectionState::WaitAttachUserConfirm => {
                let attach_user_confirm = sablerdp_core::decode::<X224<mcs::AttachUserConfirm>>(input)
                    .map_err(ConnectorError::decode)?
                    .0;

                if attach_user_confirm.result != 0 {
                    return Err(reason_err!(
                        "AttachUserConfirm",
                        "server rejected the attach user request (result {})",
                        attach_user_confirm.result,
                    ));
                }

                let user_channel_id = attach_user_confirm.initiator_id;

                debug!(message = ?attach_user_confirm, user_channel_id, "Received");

                // The user channel is joined as well, first.
                let mut remaining = mem::take(&mut self.channel_ids);
                remaining.push_front(user_channel_id);

                (
                    Written::Nothing,
                    ChannelConnectionState::SendChannelJoinRequest {
                        user_channel_id,
                        remaining_channel_ids: remaining,
                    },
                )
            }

            // One join at a time: the next request is not sent until the
            // previous confirm arrived.
            ChannelConnectionState::SendChannelJoinRequest {
                user_channel_id,
                mut remaining_channel_ids,
            } => {
                let Some(channel_id) = remaining_channel_ids.pop_front() else {
                    return Err(general_err!("no channel left to join (this is a bug)"));
                };

                let channel_join_request = mcs::ChannelJoinRequest {
                    initiator_id: user_channel_id,
                    channel_id,
                };

                debug!(message = ?channel_join_request, "Send");

                let written =
                    sablerdp_core::encode_buf(&X224(channel_join_request), output).map_err(ConnectorError::encode)?;

                (
                    Written::from_size(written)?,
                    ChannelConnectionState::WaitChannelJoinConfirm {
                        user_channel_id,
                        expected_channel_id: channel_id,
                        remaining_channel_ids,
                    },
                )
            }

            ChannelConnectionState::WaitChannelJoinConfirm {
                user_channel_id,
                expected_channel_id,
                remaining_channel_ids,
            } => {
                let channel_join_confirm = sablerdp_core::decode::<X224<mcs::ChannelJoinConfirm>>(input)
                    .map_err(ConnectorError::decode)?
                    .0;

                debug!(message = ?channel_join_confirm, "Received");

                if channel_join_confirm.initiator_id != user_channel_id {
                    warn!(
                        channel_join_confirm.initiator_id,
                        user_channel_id, "Inconsistent initiator ID for MCS Channel Join Confirm",
                    );
                }

                if channel_join_confirm.requested_channel_id != expected_channel_id {
                    return Err(reason_err!(
                        "ChannelJoinConfirm",
                        "unexpected requested channel ID: got {}, expected {}",
                        channel_join_confirm.requested_channel_id,
                        expected_channel_id,
                    ));
                }

                if channel_join_confirm.channel_id != channel_join_confirm.requested_channel_id {
                    return Err(reason_err!(
                        "ChannelJoinConfirm",
                        "channel joined with a different ID than requested: requested {}, got {}",
                        channel_join_confirm.requested_channel_id,
                        channel_join_confirm.channel_id,
                    ));
                }

                if channel_join_confirm.result != 0 {
                    return Err(reason_err!(
                        "ChannelJoinConfirm",
                        "server rejected the join of channel {} (result {})",
                        expected_channel_id,
                        channel_join_confirm.result,
                    ));
                }

                let next_state = if remaining_channel_ids.is_empty() {
                    ChannelConnectionState::AllJoined { user_channel_id }
                } else {
                    ChannelConnectionState::SendChannelJoinRequest {
                        user_channel_id,
                        remaining_channel_ids,
                    }
                };

                (Written::Nothing, next_state)
            }

            ChannelConnectionState::AllJoined { .. } => return Err(general_err!("all channels are already joined")),
        };

        self.state = next_state;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_core::encode_vec;

    fn confirm_frame(initiator_id: u16, channel_id: u16) -> Vec<u8> {
        encode_vec(&X224(mcs::ChannelJoinConfirm {
            result: 0,
            initiator_id,
            requested_channel_id: channel_id,
            channel_id,
        }))
        .unwrap()
    }

    #[test]
    fn channels_are_joined_one_at_a_time() {
        let mut sequence = ChannelConnectionSequence::new(1003, vec![1004, 1005]);
        let mut buf = WriteBuf::new();

        // Erect domain + attach user.
        sequence.step_no_input(&mut buf).unwrap();
        buf.clear();
        sequence.step_no_input(&mut buf).unwrap();
        buf.clear();

        let attach_confirm = encode_vec(&X224(mcs::AttachUserConfirm {
            result: 0,
            initiator_id: 1007,
        }))
        .unwrap();
        sequence.step(&attach_confirm, &mut buf).unwrap();

        // Join order: the user channel, the I/O channel, then the rest.
        for expected in [1007u16, 1003, 1004, 1005] {
            buf.clear();
            let written = sequence.step_no_input(&mut buf).unwrap();
            assert!(written.size().is_some(), "join request for {expected} must be written");

            buf.clear();
            sequence.step(&confirm_frame(1007, expected), &mut buf).unwrap();
        }

        assert!(sequence.state.is_terminal());
        assert_eq!(sequence.user_channel_id(), Some(1007));
    }

    #[test]
    fn unexpected_channel_confirm_fails_the_sequence() {
        let mut sequence = ChannelConnectionSequence::new(1003, vec![]);
        let mut buf = WriteBuf::new();

        sequence.step_no_input(&mut buf).unwrap();
        buf.clear();
        sequence.step_no_input(&mut buf).unwrap();
        buf.clear();

        let attach_confirm = encode_vec(&X224(mcs::AttachUserConfirm {
            result: 0,
            initiator_id: 1007,
        }))
        .unwrap();
        sequence.step(&attach_confirm, &mut buf).unwrap();

        buf.clear();
        sequence.step_no_input(&mut buf).unwrap();

        // Confirm for a channel that was never requested.
        buf.clear();
        assert!(sequence.step(&confirm_frame(1007, 1999), &mut buf).is_err());
    }
}
