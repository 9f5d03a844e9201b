//! Fast-Path update processing: fragment reassembly, bitmap decode (RLE on
//! a worker thread is the caller's concern; the decoder itself is pure),
//! and pointer updates.

use sablerdp_core::{decode_cursor, IntoOwned as _, ReadCursor};
use sablerdp_graphics::pointer::DecodedPointer;
use sablerdp_graphics::rle;
use sablerdp_pdu::bitmap::{BitmapUpdateData, Compression};
use sablerdp_pdu::fast_path::{FastPathHeader, FastPathUpdatePdu, Fragmentation, UpdateCode};
use sablerdp_pdu::geometry::InclusiveRectangle;
use sablerdp_pdu::pointer::{OwnedPointerUpdate, PointerAttribute, PointerUpdate, Point16};

use crate::surface::DisplaySurface;
use crate::{session_reason_err, SessionErrorExt as _, SessionResult};

/// What a processed fast-path frame produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPathOutput {
    /// Part of the surface changed.
    GraphicsUpdate(InclusiveRectangle),
    /// The pointer moved or changed shape.
    PointerUpdate,
    /// Nothing the display layer cares about.
    Nothing,
}

pub struct Processor {
    incomplete: IncompleteData,
    /// Cursors delivered earlier, by cache index.
    pointer_cache: Vec<Option<DecodedPointer>>,
}

impl Default for Processor {
    fn default() -> Self {
        Self {
            incomplete: IncompleteData::new(),
            pointer_cache: vec![None; 32],
        }
    }
}

impl Processor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one whole fast-path frame against the surface.
    pub fn process(&mut self, surface: &mut DisplaySurface, frame: &[u8]) -> SessionResult<FastPathOutput> {
        let mut src = ReadCursor::new(frame);

        let header: FastPathHeader = decode_cursor(&mut src).map_err(crate::SessionError::decode)?;
        trace!(fast_path_header = ?header, "Received Fast-Path packet");

        let update_pdu: FastPathUpdatePdu<'_> = decode_cursor(&mut src).map_err(crate::SessionError::decode)?;

        if update_pdu.compression_flags & 0x20 != 0 {
            // MPPC bulk compression was never advertised.
            return Err(session_reason_err!(
                "Fast-Path",
                "received a bulk-compressed update that was not negotiated",
            ));
        }

        let update_code = update_pdu.update_code;

        let Some(data) = self.incomplete.process(update_pdu.data, update_pdu.fragmentation) else {
            return Ok(FastPathOutput::Nothing);
        };

        match update_code {
            UpdateCode::Bitmap => self.process_bitmap_update(surface, &data),
            UpdateCode::PositionPointer => {
                let point: Point16 = sablerdp_core::decode(&data).map_err(crate::SessionError::decode)?;
                surface.update_pointer_position(point.x, point.y);
                Ok(FastPathOutput::PointerUpdate)
            }
            UpdateCode::HiddenPointer => {
                surface.set_pointer_visible(false);
                Ok(FastPathOutput::PointerUpdate)
            }
            UpdateCode::DefaultPointer => {
                surface.set_pointer_visible(true);
                surface.set_default_pointer();
                Ok(FastPathOutput::PointerUpdate)
            }
            UpdateCode::ColorPointer => {
                let attribute = sablerdp_core::decode::<sablerdp_pdu::pointer::ColorPointerAttribute<'_>>(&data)
                    .map_err(crate::SessionError::decode)?;
                self.install_pointer(surface, PointerUpdate::Color(attribute).into_owned());
                Ok(FastPathOutput::PointerUpdate)
            }
            UpdateCode::NewPointer => {
                let attribute =
                    sablerdp_core::decode::<PointerAttribute<'_>>(&data).map_err(crate::SessionError::decode)?;
                self.install_pointer(surface, PointerUpdate::New(attribute).into_owned());
                Ok(FastPathOutput::PointerUpdate)
            }
            UpdateCode::CachedPointer => {
                let attribute = sablerdp_core::decode::<sablerdp_pdu::pointer::CachedPointerAttribute>(&data)
                    .map_err(crate::SessionError::decode)?;

                let index = usize::from(attribute.cache_index);
                match self.pointer_cache.get(index).and_then(Option::as_ref) {
                    Some(pointer) => {
                        surface.update_pointer_bitmap(pointer.clone());
                        surface.set_pointer_visible(true);
                    }
                    None => warn!(index, "Cached pointer index not populated"),
                }
                Ok(FastPathOutput::PointerUpdate)
            }
            UpdateCode::Synchronize => Ok(FastPathOutput::Nothing),
            UpdateCode::Orders | UpdateCode::Palette | UpdateCode::SurfaceCommands | UpdateCode::LargePointer => {
                debug!(?update_code, "Skipping unsupported Fast-Path update");
                Ok(FastPathOutput::Nothing)
            }
        }
    }

    fn process_bitmap_update(&mut self, surface: &mut DisplaySurface, data: &[u8]) -> SessionResult<FastPathOutput> {
        let update = match sablerdp_core::decode::<BitmapUpdateData<'_>>(data) {
            Ok(update) => update,
            Err(error) => {
                // A malformed update loses its rectangles, not the session.
                warn!(%error, "Invalid bitmap update");
                return Ok(FastPathOutput::Nothing);
            }
        };

        let mut update_rectangle: Option<InclusiveRectangle> = None;
        let mut decode_buffer = Vec::new();

        for rectangle in &update.rectangles {
            trace!(?rectangle, "Bitmap rectangle");

            if rectangle.compression_flags.contains(Compression::BITMAP_COMPRESSION) {
                match rle::decompress(
                    rectangle.bitmap_data,
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
                surface.apply_bitmap(&rectangle.rectangle, rectangle.bits_per_pixel, rectangle.bitmap_data);
            }

            update_rectangle = Some(match update_rectangle {
                Some(current) => current.union(&rectangle.rectangle),
                None => rectangle.rectangle.clone(),
            });
        }

        Ok(match update_rectangle {
            Some(rectangle) => FastPathOutput::GraphicsUpdate(rectangle),
            None => FastPathOutput::Nothing,
        })
    }

    fn install_pointer(&mut self, surface: &mut DisplaySurface, update: OwnedPointerUpdate) {
        let OwnedPointerUpdate::Color(attribute) = update else {
            return;
        };

        match DecodedPointer::decode(&attribute) {
            Ok(pointer) => {
                let index = usize::from(attribute.cache_index);
                if let Some(slot) = self.pointer_cache.get_mut(index) {
                    *slot = Some(pointer.clone());
                }

                surface.update_pointer_bitmap(pointer);
                surface.set_pointer_visible(true);
            }
            Err(error) => warn!(%error, "Invalid pointer bitmap"),
        }
    }
}

/// Reassembles fragmented fast-path updates.
#[derive(Debug, PartialEq)]
struct IncompleteData {
    fragmented_data: Option<Vec<u8>>,
}

impl IncompleteData {
    fn new() -> Self {
        Self { fragmented_data: None }
    }

    fn process(&mut self, data: &[u8], fragmentation: Fragmentation) -> Option<Vec<u8>> {
        match fragmentation {
            Fragmentation::Single => {
                self.drop_pending();
                Some(data.to_vec())
            }
            Fragmentation::First => {
                self.drop_pending();
                self.fragmented_data = Some(data.to_vec());
                None
            }
            Fragmentation::Next => {
                self.append(data);
                None
            }
            Fragmentation::Last => {
                self.append(data);
                self.fragmented_data.take()
            }
        }
    }

    fn drop_pending(&mut self) {
        if self.fragmented_data.is_some() {
            warn!("Dropping incomplete fragmented Fast-Path update");
            self.fragmented_data = None;
        }
    }

    fn append(&mut self, data: &[u8]) {
        match self.fragmented_data.as_mut() {
            Some(fragmented_data) => fragmented_data.extend_from_slice(data),
            None => warn!("Fast-Path continuation fragment without a first fragment"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_update_frame(rect_payload: &[u8]) -> Vec<u8> {
        // Update PDU: header byte (bitmap, single), length, data.
        let mut update = vec![0x01];
        update.extend_from_slice(&(rect_payload.len() as u16).to_le_bytes());
        update.extend_from_slice(rect_payload);

        // Fast-path header: flags 0, total length.
        let total = 2 + update.len();
        let mut frame = vec![0x00, total as u8];
        frame.extend_from_slice(&update);
        frame
    }

    fn red_rectangle_payload() -> Vec<u8> {
        let mut payload = vec![
            0x01, 0x00, // updateType bitmap
            0x01, 0x00, // one rectangle
            0x05, 0x00, 0x05, 0x00, 0x0E, 0x00, 0x0E, 0x00, // (5,5)-(14,14)
            0x0A, 0x00, 0x0A, 0x00, // 10x10
            0x20, 0x00, // 32 bpp
            0x00, 0x00, // uncompressed
        ];
        let data: Vec<u8> = (0..100).flat_map(|_| [0x00u8, 0x00, 0xFF, 0x00]).collect();
        payload.extend_from_slice(&(data.len() as u16).to_le_bytes());
        payload.extend_from_slice(&data);
        payload
    }

    #[test]
    fn bitmap_update_reaches_the_surface() {
        let mut surface = DisplaySurface::new(64, 64, 30);
        let mut processor = Processor::new();

        let frame = bitmap_update_frame(&red_rectangle_payload());
        let output = processor.process(&mut surface, &frame).unwrap();

        assert!(matches!(output, FastPathOutput::GraphicsUpdate(_)));
        assert_eq!(surface.stats().bitmaps_applied, 1);
        assert_eq!(surface.raw().pixel(7, 7), Some([255, 0, 0]));
    }

    #[test]
    fn malformed_bitmap_data_is_survivable() {
        let mut surface = DisplaySurface::new(64, 64, 30);
        let mut processor = Processor::new();

        // Truncated rectangle header.
        let frame = bitmap_update_frame(&[0x01, 0x00, 0x01, 0x00, 0x05]);
        let output = processor.process(&mut surface, &frame).unwrap();

        assert_eq!(output, FastPathOutput::Nothing);
        assert_eq!(surface.stats().bitmaps_applied, 0);
    }

    #[test]
    fn fragments_are_reassembled_in_order() {
        let mut incomplete = IncompleteData::new();

        assert_eq!(incomplete.process(&[1, 2], Fragmentation::First), None);
        assert_eq!(incomplete.process(&[3], Fragmentation::Next), None);
        assert_eq!(
            incomplete.process(&[4, 5], Fragmentation::Last),
            Some(vec![1, 2, 3, 4, 5])
        );
    }

    #[test]
    fn pointer_position_update_moves_the_pointer() {
        let mut surface = DisplaySurface::new(64, 64, 30);
        let mut processor = Processor::new();

        // Position pointer update: code 8, single fragment.
        let mut update = vec![0x08];
        update.extend_from_slice(&4u16.to_le_bytes());
        update.extend_from_slice(&[0x0A, 0x00, 0x14, 0x00]);
        let total = 2 + update.len();
        let mut frame = vec![0x00, total as u8];
        frame.extend_from_slice(&update);

        let output = processor.process(&mut surface, &frame).unwrap();
        assert_eq!(output, FastPathOutput::PointerUpdate);
        assert_eq!(surface.pointer_position(), (10, 20));
    }
}
