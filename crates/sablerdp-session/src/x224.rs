//! Slow-path (X.224/MCS framed) processing during the active stage.

use sablerdp_connector::{decode_send_data_indication, decode_share_control, encode_share_data};
use sablerdp_core::WriteBuf;
use sablerdp_pdu::geometry::InclusiveRectangle;
use sablerdp_pdu::mcs::{self, DisconnectReason};
use sablerdp_pdu::rdp::headers::{ShareControlPdu, ShareDataPdu};
use sablerdp_pdu::update::ShareUpdate;
use sablerdp_pdu::x224::X224;

use crate::surface::DisplaySurface;
use crate::{session_reason_err, SessionErrorExt as _, SessionResult};

/// What a processed slow-path frame produced.
#[derive(Debug, Clone, PartialEq)]
pub enum X224Output {
    /// Part of the surface changed.
    GraphicsUpdate(InclusiveRectangle),
    /// The server ended the session.
    Disconnected(DisconnectReason),
    /// The server deactivated the share; a new capability exchange follows.
    DeactivateAll,
    Nothing,
}

pub struct Processor {
    user_channel_id: u16,
    io_channel_id: u16,
    share_id: u32,
    joined_channel_ids: Vec<u16>,
}

pub struct ProcessorBuilder {
    pub user_channel_id: u16,
    pub io_channel_id: u16,
    pub share_id: u32,
    pub joined_channel_ids: Vec<u16>,
}

impl ProcessorBuilder {
    pub fn build(self) -> Processor {
        Processor {
            user_channel_id: self.user_channel_id,
            io_channel_id: self.io_channel_id,
            share_id: self.share_id,
            joined_channel_ids: self.joined_channel_ids,
        }
    }
}

impl Processor {
    /// Processes one X.224-framed frame against the surface, possibly
    /// producing a response in `output`.
    pub fn process(
        &mut self,
        surface: &mut DisplaySurface,
        frame: &[u8],
        output: &mut WriteBuf,
    ) -> SessionResult<X224Output> {
        // A Disconnect Provider Ultimatum arrives on the MCS layer itself.
        if let Ok(message) = sablerdp_core::decode::<X224<mcs::McsMessage<'_>>>(frame) {
            if let mcs::McsMessage::DisconnectProviderUltimatum(ultimatum) = message.0 {
                info!(reason = ultimatum.reason.description(), "Server disconnected");
                return Ok(X224Output::Disconnected(ultimatum.reason));
            }
        }

        let indication =
            decode_send_data_indication(frame).map_err(|e| crate::SessionError::custom("activeStage", e))?;

        let channel_id = indication.channel_id;
        if !self.joined_channel_ids.contains(&channel_id) {
            return Err(session_reason_err!(
                "activeStage",
                "Send Data Indication on channel {channel_id}, which was never joined",
            ));
        }

        if channel_id != self.io_channel_id {
            // Joined but unused virtual channel traffic.
            debug!(channel_id, "Ignoring traffic on a non-I/O channel");
            return Ok(X224Output::Nothing);
        }

        let share_control =
            decode_share_control(indication).map_err(|e| crate::SessionError::custom("activeStage", e))?;

        match share_control.share_control_pdu {
            ShareControlPdu::Data(header) => self.process_share_data(surface, header.share_data_pdu, output),
            ShareControlPdu::ServerDeactivateAll => Ok(X224Output::DeactivateAll),
            other => Err(session_reason_err!(
                "activeStage",
                "unexpected share control PDU: {:?}",
                other.share_header_type(),
            )),
        }
    }

    fn process_share_data(
        &mut self,
        surface: &mut DisplaySurface,
        pdu: ShareDataPdu,
        output: &mut WriteBuf,
    ) -> SessionResult<X224Output> {
        match pdu {
            ShareDataPdu::Update(ShareUpdate::Bitmap(update)) => {
                let mut update_rectangle: Option<InclusiveRectangle> = None;
                let mut decode_buffer = Vec::new();

                for rectangle in &update.rectangles {
                    if rectangle
                        .compression_flags
                        .contains(sablerdp_pdu::bitmap::Compression::BITMAP_COMPRESSION)
                    {
                        match sablerdp_graphics::rle::decompress(
                            &rectangle.bitmap_data,
                            &mut decode_buffer,
                            usize::from(rectangle.width),
                            usize::from(rectangle.height),
                            usize::from(rectangle.bits_per_pixel),
                        ) {
                            Ok(format) => {
                                surface.apply_decompressed_bitmap(&rectangle.rectangle, format, &decode_buffer);
                            }
                            Err(error) => {
                                warn!(%error, "Invalid RLE-compressed bitmap; skipping the rectangle");
                                continue;
                            }
                        }
                    } else {
                        surface.apply_bitmap(&rectangle.rectangle, rectangle.bits_per_pixel, &rectangle.bitmap_data);
                    }

                    update_rectangle = Some(match update_rectangle {
                        Some(current) => current.union(&rectangle.rectangle),
                        None => rectangle.rectangle.clone(),
                    });
                }

                Ok(match update_rectangle {
                    Some(rectangle) => X224Output::GraphicsUpdate(rectangle),
                    None => X224Output::Nothing,
                })
            }
            ShareDataPdu::Update(_) => Ok(X224Output::Nothing),
            ShareDataPdu::Input(input_pdu) => {
                // Server-originated input (keyboard LED synchronize); noted
                // and acknowledged by continuing.
                debug!(events = input_pdu.0.len(), "Server input event");
                Ok(X224Output::Nothing)
            }
            ShareDataPdu::SetKeyboardIndicators(_) => Ok(X224Output::Nothing),
            ShareDataPdu::SaveSessionInfo(_) => {
                debug!("Logon notification received");
                Ok(X224Output::Nothing)
            }
            ShareDataPdu::ServerSetErrorInfo(pdu) => {
                if pdu.0.is_error() {
                    Err(session_reason_err!("activeStage", "{}", pdu.0.description()))
                } else {
                    Ok(X224Output::Nothing)
                }
            }
            ShareDataPdu::ShutdownDenied => {
                // The server refused a graceful shutdown; answer with the
                // provider ultimatum as mstsc does.
                debug!("Server denied the shutdown request");

                let ultimatum = mcs::DisconnectProviderUltimatum::from_reason(DisconnectReason::UserRequested);
                sablerdp_core::encode_buf(&X224(ultimatum), output).map_err(crate::SessionError::encode)?;

                Ok(X224Output::Nothing)
            }
            other => {
                debug!(pdu_type = ?other.share_header_type(), "Ignoring share data PDU");
                Ok(X224Output::Nothing)
            }
        }
    }

    /// Encodes an input event PDU for the I/O channel.
    pub fn encode_input_events(
        &self,
        events: Vec<sablerdp_pdu::input::InputEvent>,
        output: &mut WriteBuf,
    ) -> SessionResult<usize> {
        encode_share_data(
            self.user_channel_id,
            self.io_channel_id,
            self.share_id,
            ShareDataPdu::Input(sablerdp_pdu::input::InputEventPdu(events)),
            output,
        )
        .map_err(|e| crate::SessionError::custom("encodeInput", e))
    }

    /// Encodes an arbitrary share data PDU for the I/O channel.
    pub fn encode_share_data(&self, pdu: ShareDataPdu, output: &mut WriteBuf) -> SessionResult<usize> {
        encode_share_data(self.user_channel_id, self.io_channel_id, self.share_id, pdu, output)
            .map_err(|e| crate::SessionError::custom("encodeShareData", e))
    }
}
