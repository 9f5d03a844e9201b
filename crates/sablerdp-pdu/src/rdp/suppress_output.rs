//! Suppress Output PDU: turns the server's graphics stream off and on.

use sablerdp_core::{
    ensure_fixed_part_size, read_padding, write_padding, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

use crate::geometry::InclusiveRectangle;

const ALLOW_DISPLAY_UPDATES: u8 = 1;
const SUPPRESS_DISPLAY_UPDATES: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressOutputPdu {
    /// Present only when display updates are allowed again.
    pub desktop_rect: Option<InclusiveRectangle>,
}

impl SuppressOutputPdu {
    const NAME: &'static str = "SuppressOutputPdu";

    const FIXED_PART_SIZE: usize = 1 /* allowDisplayUpdates */ + 3 /* pad3Octets */;
}

impl Encode for SuppressOutputPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        match &self.desktop_rect {
            Some(rect) => {
                dst.write_u8(ALLOW_DISPLAY_UPDATES);
                write_padding!(dst, 3);
                rect.encode(dst)
            }
            None => {
                dst.write_u8(SUPPRESS_DISPLAY_UPDATES);
                write_padding!(dst, 3);
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + self
                .desktop_rect
                .as_ref()
                .map_or(0, |_| InclusiveRectangle::ENCODED_SIZE)
    }
}

impl<'de> Decode<'de> for SuppressOutputPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let allow_display_updates = src.read_u8();
        read_padding!(src, 3);

        let desktop_rect = if allow_display_updates == ALLOW_DISPLAY_UPDATES && src.len() >= InclusiveRectangle::ENCODED_SIZE
        {
            Some(InclusiveRectangle::decode(src)?)
        } else {
            None
        };

        Ok(Self { desktop_rect })
    }
}
