use sablerdp_connector::ConnectionResult;
use sablerdp_core::WriteBuf;
use sablerdp_pdu::geometry::InclusiveRectangle;
use sablerdp_pdu::input::InputEvent;
use sablerdp_pdu::mcs::DisconnectReason;
use sablerdp_pdu::rdp::headers::ShareDataPdu;
use sablerdp_pdu::rdp::refresh_rectangle::RefreshRectanglePdu;
use sablerdp_pdu::Action;

use crate::fast_path::{self, FastPathOutput};
use crate::surface::DisplaySurface;
use crate::x224::{self, X224Output};
use crate::SessionResult;

/// Dispatches inbound frames of an active session by framing action and
/// feeds the display surface; encodes outbound input and control PDUs.
pub struct ActiveStage {
    x224_processor: x224::Processor,
    fast_path_processor: fast_path::Processor,
}

/// The session-level effects of one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveStageOutput {
    /// Bytes to write back to the server.
    ResponseFrame(Vec<u8>),
    /// Part of the surface changed.
    GraphicsUpdate(InclusiveRectangle),
    /// The pointer state changed.
    PointerUpdate,
    /// The share was deactivated; the server will re-run the capability
    /// exchange.
    DeactivateAll,
    /// The session ended.
    Terminate(DisconnectReason),
}

impl ActiveStage {
    pub fn new(connection_result: &ConnectionResult) -> Self {
        let x224_processor = x224::ProcessorBuilder {
            user_channel_id: connection_result.user_channel_id,
            io_channel_id: connection_result.io_channel_id,
            share_id: connection_result.share_id,
            joined_channel_ids: connection_result.joined_channel_ids.clone(),
        }
        .build();

        Self {
            x224_processor,
            fast_path_processor: fast_path::Processor::new(),
        }
    }

    /// Processes one inbound frame against the surface.
    pub fn process(
        &mut self,
        surface: &mut DisplaySurface,
        action: Action,
        frame: &[u8],
    ) -> SessionResult<Vec<ActiveStageOutput>> {
        let mut outputs = Vec::new();

        match action {
            Action::FastPath => match self.fast_path_processor.process(surface, frame)? {
                FastPathOutput::GraphicsUpdate(rectangle) => outputs.push(ActiveStageOutput::GraphicsUpdate(rectangle)),
                FastPathOutput::PointerUpdate => outputs.push(ActiveStageOutput::PointerUpdate),
                FastPathOutput::Nothing => {}
            },
            Action::X224 => {
                let mut response = WriteBuf::new();
                match self.x224_processor.process(surface, frame, &mut response)? {
                    X224Output::GraphicsUpdate(rectangle) => {
                        outputs.push(ActiveStageOutput::GraphicsUpdate(rectangle))
                    }
                    X224Output::Disconnected(reason) => outputs.push(ActiveStageOutput::Terminate(reason)),
                    X224Output::DeactivateAll => outputs.push(ActiveStageOutput::DeactivateAll),
                    X224Output::Nothing => {}
                }

                if response.filled_len() > 0 {
                    outputs.push(ActiveStageOutput::ResponseFrame(response.filled().to_vec()));
                }
            }
        }

        Ok(outputs)
    }

    /// Encodes a batch of input events into an outbound frame.
    pub fn encode_input_events(&self, events: Vec<InputEvent>, output: &mut WriteBuf) -> SessionResult<usize> {
        self.x224_processor.encode_input_events(events, output)
    }

    /// Encodes a Refresh Rect PDU asking the server to repaint everything.
    pub fn encode_refresh_rect(&self, width: u16, height: u16, output: &mut WriteBuf) -> SessionResult<usize> {
        self.x224_processor
            .encode_share_data(ShareDataPdu::RefreshRectangle(RefreshRectanglePdu::full_desktop(width, height)), output)
    }

    /// Encodes an arbitrary share data PDU (suppress output, shutdown
    /// request).
    pub fn encode_share_data(&self, pdu: ShareDataPdu, output: &mut WriteBuf) -> SessionResult<usize> {
        self.x224_processor.encode_share_data(pdu, output)
    }
}
