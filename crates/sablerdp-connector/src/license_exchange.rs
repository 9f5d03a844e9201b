//! Licensing: this client accepts the "license error — valid client" short
//! circuit and treats every other licensing reply as fatal.

use std::mem;

use sablerdp_core::WriteBuf;
use sablerdp_pdu::rdp::server_license::LicenseMessage;
use sablerdp_pdu::PduHint;

use crate::{
    decode_send_data_indication, ConnectorError, ConnectorErrorExt as _, ConnectorResult, Sequence, State, Written,
};

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum LicenseExchangeState {
    #[default]
    Consumed,

    WaitLicenseMessage,
    Finished,
}

impl State for LicenseExchangeState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::WaitLicenseMessage => "WaitLicenseMessage",
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
pub struct LicenseExchangeSequence {
    pub state: LicenseExchangeState,
}

impl LicenseExchangeSequence {
    pub fn new() -> Self {
        Self {
            state: LicenseExchangeState::WaitLicenseMessage,
        }
    }
}

impl Default for LicenseExchangeSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequence for LicenseExchangeSequence {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match self.state {
            LicenseExchangeState::WaitLicenseMessage => Some(&sablerdp_pdu::X224_HINT),
            _ => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], _output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            LicenseExchangeState::Consumed => {
                return Err(general_err!("license exchange sequence state is consumed (this is a bug)"))
            }

            LicenseExchangeState::WaitLicenseMessage => {
                let indication = decode_send_data_indication(input)?;
                let message = sablerdp_core::decode::<LicenseMessage>(indication.user_data.as_ref())
                    .map_err(ConnectorError::decode)?;

                match message {
                    LicenseMessage::ValidClient => {
                        debug!("Server granted the valid-client license short circuit");
                        (Written::Nothing, LicenseExchangeState::Finished)
                    }
                    LicenseMessage::ErrorAlert {
                        error_code,
                        state_transition,
                    } => {
                        return Err(reason_err!(
                            "LicenseExchange",
                            "licensing error alert: code 0x{error_code:08X}, state transition {state_transition}",
                        ))
                    }
                    LicenseMessage::Unsupported { msg_type } => {
                        return Err(reason_err!(
                            "LicenseExchange",
                            "server started a full licensing exchange (message type 0x{msg_type:02X}), which this client does not support",
                        ))
                    }
                }
            }

            LicenseExchangeState::Finished => return Err(general_err!("license exchange is already finished")),
        };

        self.state = next_state;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_core::encode_vec;
    use sablerdp_pdu::mcs::SendDataIndication;
    use sablerdp_pdu::x224::X224;
    use std::borrow::Cow;

    fn license_frame(payload: &[u8]) -> Vec<u8> {
        encode_vec(&X224(SendDataIndication {
            initiator_id: 1002,
            channel_id: 1003,
            user_data: Cow::Borrowed(payload),
        }))
        .unwrap()
    }

    #[test]
    fn valid_client_completes_the_sequence() {
        let payload = [
            0x80, 0x00, 0x00, 0x00, // SEC_LICENSE_PKT
            0xFF, 0x03, 0x10, 0x00, // ERROR_ALERT preamble
            0x07, 0x00, 0x00, 0x00, // STATUS_VALID_CLIENT
            0x02, 0x00, 0x00, 0x00, // ST_NO_TRANSITION
            0x28, 0x00, 0x00, 0x00, // empty error blob
        ];

        let mut sequence = LicenseExchangeSequence::new();
        let mut buf = WriteBuf::new();

        sequence.step(&license_frame(&payload), &mut buf).unwrap();
        assert!(sequence.state.is_terminal());
    }

    #[test]
    fn full_licensing_exchange_is_fatal() {
        let payload = [
            0x80, 0x00, 0x00, 0x00, // SEC_LICENSE_PKT
            0x01, 0x03, 0x04, 0x00, // LICENSE_REQUEST preamble
        ];

        let mut sequence = LicenseExchangeSequence::new();
        let mut buf = WriteBuf::new();

        assert!(sequence.step(&license_frame(&payload), &mut buf).is_err());
    }
}
