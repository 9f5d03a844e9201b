//! Builders turning caller intentions (click here, type this) into ordered
//! RDP input event lists, plus the web key code → scancode table.

pub mod keymap;

use std::time::Duration;

use smallvec::SmallVec;

use sablerdp_pdu::input::mouse::{MousePdu, PointerFlags};
use sablerdp_pdu::input::scan_code::{KeyboardFlags as ScanCodeFlags, ScanCodePdu};
use sablerdp_pdu::input::unicode::{KeyboardFlags as UnicodeFlags, UnicodePdu};
use sablerdp_pdu::input::InputEvent;

/// The spacing between the two clicks of a double-click; anything at or
/// under the system double-click interval is accepted by servers.
pub const DOUBLE_CLICK_INTERVAL: Duration = Duration::from_millis(250);

/// The scancode high byte selecting the extended-key flag.
pub const EXTENDED_SCANCODE_PREFIX: u16 = 0xE000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    fn flags(self) -> PointerFlags {
        match self {
            Self::Left => PointerFlags::LEFT_BUTTON,
            Self::Middle => PointerFlags::MIDDLE_BUTTON_OR_WHEEL,
            Self::Right => PointerFlags::RIGHT_BUTTON,
        }
    }
}

fn mouse_event(flags: PointerFlags, x: u16, y: u16) -> InputEvent {
    InputEvent::Mouse(MousePdu {
        flags,
        number_of_wheel_rotation_units: 0,
        x_position: x,
        y_position: y,
    })
}

/// A pointer move to absolute coordinates.
pub fn mouse_move(x: u16, y: u16) -> SmallVec<[InputEvent; 2]> {
    SmallVec::from_iter([mouse_event(PointerFlags::MOVE, x, y)])
}

pub fn mouse_button_down(button: MouseButton, x: u16, y: u16) -> SmallVec<[InputEvent; 2]> {
    SmallVec::from_iter([mouse_event(PointerFlags::DOWN | button.flags(), x, y)])
}

pub fn mouse_button_up(button: MouseButton, x: u16, y: u16) -> SmallVec<[InputEvent; 2]> {
    SmallVec::from_iter([mouse_event(button.flags(), x, y)])
}

/// A click: move to the target, press, release.
pub fn mouse_click(button: MouseButton, x: u16, y: u16) -> SmallVec<[InputEvent; 4]> {
    SmallVec::from_iter([
        mouse_event(PointerFlags::MOVE, x, y),
        mouse_event(PointerFlags::DOWN | button.flags(), x, y),
        mouse_event(button.flags(), x, y),
    ])
}

/// A drag: press at the origin, move, release at the destination.
pub fn mouse_drag(
    button: MouseButton,
    from_x: u16,
    from_y: u16,
    to_x: u16,
    to_y: u16,
) -> SmallVec<[InputEvent; 5]> {
    SmallVec::from_iter([
        mouse_event(PointerFlags::MOVE, from_x, from_y),
        mouse_event(PointerFlags::DOWN | button.flags(), from_x, from_y),
        mouse_event(PointerFlags::MOVE, to_x, to_y),
        mouse_event(button.flags(), to_x, to_y),
    ])
}

/// A vertical wheel rotation; positive is away from the user.
pub fn mouse_wheel(x: u16, y: u16, delta: i16) -> SmallVec<[InputEvent; 2]> {
    SmallVec::from_iter([InputEvent::Mouse(MousePdu {
        flags: PointerFlags::VERTICAL_WHEEL,
        number_of_wheel_rotation_units: delta,
        x_position: x,
        y_position: y,
    })])
}

fn scancode_flags(scancode: u16, release: bool) -> ScanCodeFlags {
    let mut flags = if release {
        ScanCodeFlags::RELEASE
    } else {
        ScanCodeFlags::DOWN
    };

    // The high byte of an extended scancode selects the flag.
    if scancode & EXTENDED_SCANCODE_PREFIX == EXTENDED_SCANCODE_PREFIX {
        flags |= ScanCodeFlags::EXTENDED;
    }

    flags
}

pub fn key_down(scancode: u16) -> SmallVec<[InputEvent; 2]> {
    SmallVec::from_iter([InputEvent::ScanCode(ScanCodePdu {
        flags: scancode_flags(scancode, false),
        key_code: scancode & 0xFF,
    })])
}

pub fn key_up(scancode: u16) -> SmallVec<[InputEvent; 2]> {
    SmallVec::from_iter([InputEvent::ScanCode(ScanCodePdu {
        flags: scancode_flags(scancode, true),
        key_code: scancode & 0xFF,
    })])
}

/// A full key stroke: press then release.
pub fn key_stroke(scancode: u16) -> SmallVec<[InputEvent; 2]> {
    let mut events = key_down(scancode);
    events.extend(key_up(scancode));
    events
}

/// Unicode key events for one character: a press and a release per UTF-16
/// code unit, so characters outside the BMP travel as surrogate pairs.
pub fn unicode_character(character: char) -> SmallVec<[InputEvent; 4]> {
    let mut units = [0u16; 2];
    let units = character.encode_utf16(&mut units);

    let mut events = SmallVec::new();

    for unit in units.iter() {
        events.push(InputEvent::Unicode(UnicodePdu {
            flags: UnicodeFlags::empty(),
            unicode_code: *unit,
        }));
        events.push(InputEvent::Unicode(UnicodePdu {
            flags: UnicodeFlags::RELEASE,
            unicode_code: *unit,
        }));
    }

    events
}

/// Unicode events typing the whole string, code point by code point.
pub fn unicode_text(text: &str) -> Vec<InputEvent> {
    text.chars().flat_map(|c| unicode_character(c).into_iter()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_is_move_down_up() {
        let events = mouse_click(MouseButton::Left, 100, 200);

        let flags: Vec<u16> = events
            .iter()
            .map(|event| match event {
                InputEvent::Mouse(pdu) => pdu.flags.bits(),
                _ => panic!("expected mouse events"),
            })
            .collect();

        assert_eq!(flags, [0x0800, 0x9000, 0x1000]);

        for event in &events {
            let InputEvent::Mouse(pdu) = event else {
                panic!("expected mouse events")
            };
            assert_eq!((pdu.x_position, pdu.y_position), (100, 200));
        }
    }

    #[test]
    fn extended_scancode_sets_the_flag() {
        let events = key_down(0xE048); // ArrowUp

        let InputEvent::ScanCode(pdu) = &events[0] else {
            panic!("expected a scancode event")
        };

        assert!(pdu.flags.contains(ScanCodeFlags::EXTENDED));
        assert_eq!(pdu.key_code, 0x48);
    }

    #[test]
    fn plain_scancode_has_no_extended_flag() {
        let events = key_stroke(0x1C); // Enter

        let InputEvent::ScanCode(down) = &events[0] else {
            panic!("expected a scancode event")
        };
        let InputEvent::ScanCode(up) = &events[1] else {
            panic!("expected a scancode event")
        };

        assert_eq!(down.flags, ScanCodeFlags::DOWN);
        assert_eq!(up.flags, ScanCodeFlags::RELEASE);
    }

    #[test]
    fn text_sends_press_and_release_per_code_point() {
        let events = unicode_text("Aé");

        assert_eq!(events.len(), 4);

        let codes: Vec<u16> = events
            .iter()
            .map(|event| match event {
                InputEvent::Unicode(pdu) => pdu.unicode_code,
                _ => panic!("expected unicode events"),
            })
            .collect();

        assert_eq!(codes, [0x0041, 0x0041, 0x00E9, 0x00E9]);
    }

    #[test]
    fn non_bmp_character_travels_as_a_surrogate_pair() {
        let events = unicode_text("🙂");

        // Two code units, each pressed and released.
        assert_eq!(events.len(), 4);

        let InputEvent::Unicode(first) = &events[0] else {
            panic!("expected unicode events")
        };
        assert!(matches!(first.unicode_code, 0xD800..=0xDBFF));
    }

    #[test]
    fn wheel_delta_is_carried() {
        let events = mouse_wheel(10, 10, -3);

        let InputEvent::Mouse(pdu) = &events[0] else {
            panic!("expected a mouse event")
        };

        assert!(pdu.flags.contains(PointerFlags::VERTICAL_WHEEL));
        assert_eq!(pdu.number_of_wheel_rotation_units, -3);
    }
}
