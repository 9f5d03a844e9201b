use sablerdp_core::{ensure_fixed_part_size, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};

/// A rectangle with inclusive bounds, as used by bitmap updates and refresh
/// requests (TS_RECTANGLE16 in inclusive coordinates).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusiveRectangle {
    pub left: u16,
    pub top: u16,
    pub right: u16,
    pub bottom: u16,
}

impl InclusiveRectangle {
    pub const NAME: &'static str = "InclusiveRectangle";

    pub const ENCODED_SIZE: usize = 8;

    const FIXED_PART_SIZE: usize = Self::ENCODED_SIZE;

    pub fn width(&self) -> u16 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> u16 {
        self.bottom - self.top + 1
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

impl Encode for InclusiveRectangle {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.left);
        dst.write_u16(self.top);
        dst.write_u16(self.right);
        dst.write_u16(self.bottom);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for InclusiveRectangle {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let left = src.read_u16();
        let top = src.read_u16();
        let right = src.read_u16();
        let bottom = src.read_u16();

        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_core::{decode, encode_vec};

    #[test]
    fn rectangle_round_trip() {
        let rect = InclusiveRectangle {
            left: 5,
            top: 5,
            right: 14,
            bottom: 14,
        };

        assert_eq!(rect.width(), 10);
        assert_eq!(rect.height(), 10);

        let encoded = encode_vec(&rect).unwrap();
        assert_eq!(encoded, [5, 0, 5, 0, 14, 0, 14, 0]);

        let decoded: InclusiveRectangle = decode(&encoded).unwrap();
        assert_eq!(decoded, rect);
    }

    #[test]
    fn union_covers_both() {
        let a = InclusiveRectangle {
            left: 0,
            top: 0,
            right: 9,
            bottom: 9,
        };
        let b = InclusiveRectangle {
            left: 5,
            top: 12,
            right: 20,
            bottom: 30,
        };

        let u = a.union(&b);
        assert_eq!(
            u,
            InclusiveRectangle {
                left: 0,
                top: 0,
                right: 20,
                bottom: 30,
            }
        );
    }
}
