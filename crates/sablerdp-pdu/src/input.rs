//! Client input event PDUs (TS_INPUT_PDU_DATA and the per-event payloads).

use sablerdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, read_padding, write_padding, Decode,
    DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

pub mod mouse;
pub mod mouse_x;
pub mod scan_code;
pub mod sync;
pub mod unicode;

pub use self::mouse::MousePdu;
pub use self::mouse_x::MouseXPdu;
pub use self::scan_code::ScanCodePdu;
pub use self::sync::SyncPdu;
pub use self::unicode::UnicodePdu;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEventPdu(pub Vec<InputEvent>);

impl InputEventPdu {
    const NAME: &'static str = "InputEventPdu";

    const FIXED_PART_SIZE: usize = 2 /* numEvents */ + 2 /* pad */;
}

impl Encode for InputEventPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(cast_length!("numEvents", self.0.len())?);
        write_padding!(dst, 2);

        for event in self.0.iter() {
            event.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.0.iter().map(Encode::size).sum::<usize>()
    }
}

impl<'de> Decode<'de> for InputEventPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let number_of_events = src.read_u16();
        read_padding!(src, 2);

        let events = (0..number_of_events)
            .map(|_| InputEvent::decode(src))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(events))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Sync(SyncPdu),
    ScanCode(ScanCodePdu),
    Unicode(UnicodePdu),
    Mouse(MousePdu),
    MouseX(MouseXPdu),
}

impl InputEvent {
    const NAME: &'static str = "InputEvent";

    const FIXED_PART_SIZE: usize = 4 /* eventTime */ + 2 /* messageType */;
}

impl Encode for InputEvent {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(0); // eventTime is ignored by the server
        dst.write_u16(InputEventType::from(self).as_u16());

        match self {
            Self::Sync(pdu) => pdu.encode(dst),
            Self::ScanCode(pdu) => pdu.encode(dst),
            Self::Unicode(pdu) => pdu.encode(dst),
            Self::Mouse(pdu) => pdu.encode(dst),
            Self::MouseX(pdu) => pdu.encode(dst),
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + match self {
                Self::Sync(pdu) => pdu.size(),
                Self::ScanCode(pdu) => pdu.size(),
                Self::Unicode(pdu) => pdu.size(),
                Self::Mouse(pdu) => pdu.size(),
                Self::MouseX(pdu) => pdu.size(),
            }
    }
}

impl<'de> Decode<'de> for InputEvent {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let _event_time = src.read_u32(); // ignored by the server
        let event_type = src.read_u16();
        let event_type = InputEventType::from_u16(event_type)
            .ok_or_else(|| invalid_field_err!("messageType", "invalid input event type"))?;

        match event_type {
            InputEventType::Sync => Ok(Self::Sync(SyncPdu::decode(src)?)),
            InputEventType::ScanCode => Ok(Self::ScanCode(ScanCodePdu::decode(src)?)),
            InputEventType::Unicode => Ok(Self::Unicode(UnicodePdu::decode(src)?)),
            InputEventType::Mouse => Ok(Self::Mouse(MousePdu::decode(src)?)),
            InputEventType::MouseX => Ok(Self::MouseX(MouseXPdu::decode(src)?)),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum InputEventType {
    Sync = 0x0000,
    ScanCode = 0x0004,
    Unicode = 0x0005,
    Mouse = 0x8001,
    MouseX = 0x8002,
}

impl InputEventType {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Self::Sync),
            0x0004 => Some(Self::ScanCode),
            0x0005 => Some(Self::Unicode),
            0x8001 => Some(Self::Mouse),
            0x8002 => Some(Self::MouseX),
            _ => None,
        }
    }

    fn as_u16(self) -> u16 {
        self as u16
    }
}

impl From<&InputEvent> for InputEventType {
    fn from(event: &InputEvent) -> Self {
        match event {
            InputEvent::Sync(_) => Self::Sync,
            InputEvent::ScanCode(_) => Self::ScanCode,
            InputEvent::Unicode(_) => Self::Unicode,
            InputEvent::Mouse(_) => Self::Mouse,
            InputEvent::MouseX(_) => Self::MouseX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::mouse::PointerFlags;
    use sablerdp_core::encode_vec;

    #[test]
    fn each_event_occupies_twelve_bytes() {
        // 4 time + 2 type + 6 payload, as every payload is six bytes.
        let events = vec![
            InputEvent::Mouse(MousePdu {
                flags: PointerFlags::MOVE,
                number_of_wheel_rotation_units: 0,
                x_position: 1,
                y_position: 2,
            }),
            InputEvent::ScanCode(ScanCodePdu {
                flags: scan_code::KeyboardFlags::DOWN,
                key_code: 0x1C,
            }),
        ];

        let pdu = InputEventPdu(events);
        let encoded = encode_vec(&pdu).unwrap();

        assert_eq!(encoded.len(), 4 + 2 * 12);
        assert_eq!(u16::from_le_bytes([encoded[0], encoded[1]]), 2);
    }

    #[test]
    fn mouse_click_event_triple_matches_wire_expectations() {
        // A click at (100, 200): move, button1 down, button1 up.
        let events = [
            InputEvent::Mouse(MousePdu {
                flags: PointerFlags::MOVE,
                number_of_wheel_rotation_units: 0,
                x_position: 100,
                y_position: 200,
            }),
            InputEvent::Mouse(MousePdu {
                flags: PointerFlags::DOWN | PointerFlags::LEFT_BUTTON,
                number_of_wheel_rotation_units: 0,
                x_position: 100,
                y_position: 200,
            }),
            InputEvent::Mouse(MousePdu {
                flags: PointerFlags::LEFT_BUTTON,
                number_of_wheel_rotation_units: 0,
                x_position: 100,
                y_position: 200,
            }),
        ];

        let expected_flags = [0x0800u16, 0x9000, 0x1000];

        for (event, expected) in events.iter().zip(expected_flags) {
            let encoded = encode_vec(event).unwrap();
            assert_eq!(u16::from_le_bytes([encoded[4], encoded[5]]), 0x8001);
            assert_eq!(u16::from_le_bytes([encoded[6], encoded[7]]), expected);
            assert_eq!(u16::from_le_bytes([encoded[8], encoded[9]]), 100);
            assert_eq!(u16::from_le_bytes([encoded[10], encoded[11]]), 200);
        }
    }
}
