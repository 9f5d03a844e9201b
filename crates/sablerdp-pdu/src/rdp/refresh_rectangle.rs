//! Refresh Rect PDU: asks the server to redraw one or more areas.

use sablerdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, read_padding, write_padding, Decode, DecodeResult, Encode,
    EncodeResult, ReadCursor, WriteCursor,
};

use crate::geometry::InclusiveRectangle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRectanglePdu {
    pub areas: Vec<InclusiveRectangle>,
}

impl RefreshRectanglePdu {
    const NAME: &'static str = "RefreshRectanglePdu";

    const FIXED_PART_SIZE: usize = 1 /* numberOfAreas */ + 3 /* pad3Octets */;

    pub fn full_desktop(width: u16, height: u16) -> Self {
        Self {
            areas: vec![InclusiveRectangle {
                left: 0,
                top: 0,
                right: width.saturating_sub(1),
                bottom: height.saturating_sub(1),
            }],
        }
    }
}

impl Encode for RefreshRectanglePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u8(cast_length!("numberOfAreas", self.areas.len())?);
        write_padding!(dst, 3);

        for area in &self.areas {
            area.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.areas.len() * InclusiveRectangle::ENCODED_SIZE
    }
}

impl<'de> Decode<'de> for RefreshRectanglePdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let number_of_areas = usize::from(src.read_u8());
        read_padding!(src, 3);

        let areas = (0..number_of_areas)
            .map(|_| InclusiveRectangle::decode(src))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { areas })
    }
}
