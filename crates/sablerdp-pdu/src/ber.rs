//! Basic Encoding Rules, the subset used by the MCS Connect Initial and
//! Connect Response PDUs.
//!
//! Lengths use the short form for `0..=127` and the long form (`0x81 L`,
//! `0x82 hi lo`) above; longer lengths never occur in this protocol.
//! Integers are encoded minimally and non-negative.

use sablerdp_core::{cast_length, ensure_size, invalid_field_err, DecodeResult, EncodeResult, ReadCursor, WriteCursor};

#[repr(u8)]
pub(crate) enum Pc {
    Primitive = 0x00,
    Construct = 0x20,
}

#[repr(u8)]
enum Class {
    Universal = 0x00,
    Application = 0x40,
}

#[repr(u8)]
enum Tag {
    Boolean = 0x01,
    Integer = 0x02,
    OctetString = 0x04,
    Enumerated = 0x0A,
    Sequence = 0x10,
}

pub(crate) const SIZEOF_ENUMERATED: usize = 3;
pub(crate) const SIZEOF_BOOL: usize = 3;

const TAG_MASK: u8 = 0x1F;

pub(crate) fn sizeof_application_tag(tagnum: u8, length: u16) -> usize {
    let tag_len = if tagnum > 0x1E { 2 } else { 1 };

    sizeof_length(length) + tag_len
}

pub(crate) fn sizeof_sequence_tag(length: u16) -> usize {
    1 + sizeof_length(length)
}

pub(crate) fn sizeof_octet_string(length: u16) -> usize {
    1 + sizeof_length(length) + usize::from(length)
}

pub(crate) fn sizeof_integer(value: u32) -> usize {
    if value < 0x0000_0080 {
        3
    } else if value < 0x0000_8000 {
        4
    } else if value < 0x0080_0000 {
        5
    } else {
        6
    }
}

pub(crate) fn write_sequence_tag(stream: &mut WriteCursor<'_>, length: u16) -> EncodeResult<usize> {
    write_universal_tag(stream, Tag::Sequence, Pc::Construct)?;

    write_length(stream, length).map(|length| length + 1)
}

pub(crate) fn read_sequence_tag(stream: &mut ReadCursor<'_>) -> DecodeResult<u16> {
    ensure_size!(in: stream, size: 1);
    let identifier = stream.read_u8();

    if identifier != Class::Universal as u8 | Pc::Construct as u8 | (TAG_MASK & Tag::Sequence as u8) {
        Err(invalid_field_err!("identifier", "invalid sequence tag identifier"))
    } else {
        read_length(stream)
    }
}

/// Application tags use the single-byte form for tag numbers below 31 and the
/// `0x7F`-prefixed multi-byte form otherwise (the MCS Connect PDUs use tag
/// numbers 101 and 102).
pub(crate) fn write_application_tag(stream: &mut WriteCursor<'_>, tagnum: u8, length: u16) -> EncodeResult<usize> {
    ensure_size!(in: stream, size: sizeof_application_tag(tagnum, length));

    let taglen = if tagnum > 0x1E {
        stream.write_u8(Class::Application as u8 | Pc::Construct as u8 | TAG_MASK);
        stream.write_u8(tagnum);
        2
    } else {
        stream.write_u8(Class::Application as u8 | Pc::Construct as u8 | (TAG_MASK & tagnum));
        1
    };

    write_length(stream, length).map(|length| length + taglen)
}

pub(crate) fn read_application_tag(stream: &mut ReadCursor<'_>, tagnum: u8) -> DecodeResult<u16> {
    ensure_size!(in: stream, size: 1);
    let identifier = stream.read_u8();

    if tagnum > 0x1E {
        if identifier != Class::Application as u8 | Pc::Construct as u8 | TAG_MASK {
            return Err(invalid_field_err!("identifier", "invalid application tag identifier"));
        }
        ensure_size!(in: stream, size: 1);
        if stream.read_u8() != tagnum {
            return Err(invalid_field_err!("tagnum", "unexpected application tag number"));
        }
    } else if identifier != Class::Application as u8 | Pc::Construct as u8 | (TAG_MASK & tagnum) {
        return Err(invalid_field_err!("identifier", "invalid application tag identifier"));
    }

    read_length(stream)
}

pub(crate) fn write_enumerated(stream: &mut WriteCursor<'_>, enumerated: u8) -> EncodeResult<usize> {
    let mut size = 0;
    size += write_universal_tag(stream, Tag::Enumerated, Pc::Primitive)?;
    size += write_length(stream, 1)?;
    ensure_size!(in: stream, size: 1);
    stream.write_u8(enumerated);
    size += 1;

    Ok(size)
}

pub(crate) fn read_enumerated(stream: &mut ReadCursor<'_>, count: u8) -> DecodeResult<u8> {
    read_universal_tag(stream, Tag::Enumerated, Pc::Primitive)?;

    let length = read_length(stream)?;
    if length != 1 {
        return Err(invalid_field_err!("len", "invalid enumerated len"));
    }

    ensure_size!(in: stream, size: 1);
    let enumerated = stream.read_u8();
    if enumerated == u8::MAX || enumerated + 1 > count {
        return Err(invalid_field_err!("enumerated", "invalid enumerated value"));
    }

    Ok(enumerated)
}

pub(crate) fn write_integer(stream: &mut WriteCursor<'_>, value: u32) -> EncodeResult<usize> {
    write_universal_tag(stream, Tag::Integer, Pc::Primitive)?;

    // A leading zero byte keeps the encoding non-negative when the top bit
    // of the next byte is set.
    if value < 0x0000_0080 {
        write_length(stream, 1)?;
        ensure_size!(in: stream, size: 1);
        stream.write_u8(value as u8);

        Ok(3)
    } else if value < 0x0000_8000 {
        write_length(stream, 2)?;
        ensure_size!(in: stream, size: 2);
        stream.write_u16_be(value as u16);

        Ok(4)
    } else if value < 0x0080_0000 {
        write_length(stream, 3)?;
        ensure_size!(in: stream, size: 3);
        stream.write_u8((value >> 16) as u8);
        stream.write_u16_be((value & 0xFFFF) as u16);

        Ok(5)
    } else {
        write_length(stream, 4)?;
        ensure_size!(in: stream, size: 4);
        stream.write_u32_be(value);

        Ok(6)
    }
}

pub(crate) fn read_integer(stream: &mut ReadCursor<'_>) -> DecodeResult<u64> {
    read_universal_tag(stream, Tag::Integer, Pc::Primitive)?;
    let length = read_length(stream)?;

    match length {
        1 => {
            ensure_size!(in: stream, size: 1);
            Ok(u64::from(stream.read_u8()))
        }
        2 => {
            ensure_size!(in: stream, size: 2);
            Ok(u64::from(stream.read_u16_be()))
        }
        3 => {
            ensure_size!(in: stream, size: 3);
            let a = stream.read_u8();
            let b = stream.read_u16_be();

            Ok(u64::from(b) + (u64::from(a) << 16))
        }
        4 => {
            ensure_size!(in: stream, size: 4);
            Ok(u64::from(stream.read_u32_be()))
        }
        8 => {
            ensure_size!(in: stream, size: 8);
            Ok(stream.read_u64_be())
        }
        _ => Err(invalid_field_err!("len", "invalid integer len")),
    }
}

pub(crate) fn write_bool(stream: &mut WriteCursor<'_>, value: bool) -> EncodeResult<usize> {
    let mut size = 0;
    size += write_universal_tag(stream, Tag::Boolean, Pc::Primitive)?;
    size += write_length(stream, 1)?;

    ensure_size!(in: stream, size: 1);
    stream.write_u8(if value { 0xFF } else { 0x00 });
    size += 1;

    Ok(size)
}

pub(crate) fn read_bool(stream: &mut ReadCursor<'_>) -> DecodeResult<bool> {
    read_universal_tag(stream, Tag::Boolean, Pc::Primitive)?;
    let length = read_length(stream)?;

    if length != 1 {
        return Err(invalid_field_err!("len", "invalid boolean len"));
    }

    ensure_size!(in: stream, size: 1);
    Ok(stream.read_u8() != 0)
}

pub(crate) fn write_octet_string(stream: &mut WriteCursor<'_>, value: &[u8]) -> EncodeResult<usize> {
    let tag_size = write_octet_string_tag(stream, cast_length!("len", value.len())?)?;
    ensure_size!(in: stream, size: value.len());
    stream.write_slice(value);
    Ok(tag_size + value.len())
}

pub(crate) fn write_octet_string_tag(stream: &mut WriteCursor<'_>, length: u16) -> EncodeResult<usize> {
    write_universal_tag(stream, Tag::OctetString, Pc::Primitive)?;
    write_length(stream, length).map(|length| length + 1)
}

pub(crate) fn read_octet_string(stream: &mut ReadCursor<'_>) -> DecodeResult<Vec<u8>> {
    let length = usize::from(read_octet_string_tag(stream)?);

    ensure_size!(in: stream, size: length);
    let buffer = stream.read_slice(length);

    Ok(buffer.into())
}

pub(crate) fn read_octet_string_tag(stream: &mut ReadCursor<'_>) -> DecodeResult<u16> {
    read_universal_tag(stream, Tag::OctetString, Pc::Primitive)?;
    read_length(stream)
}

fn write_universal_tag(stream: &mut WriteCursor<'_>, tag: Tag, pc: Pc) -> EncodeResult<usize> {
    ensure_size!(in: stream, size: 1);

    let identifier = Class::Universal as u8 | pc as u8 | (TAG_MASK & tag as u8);
    stream.write_u8(identifier);

    Ok(1)
}

fn read_universal_tag(stream: &mut ReadCursor<'_>, tag: Tag, pc: Pc) -> DecodeResult<()> {
    ensure_size!(in: stream, size: 1);

    let identifier = stream.read_u8();

    if identifier != Class::Universal as u8 | pc as u8 | (TAG_MASK & tag as u8) {
        Err(invalid_field_err!("identifier", "invalid universal tag identifier"))
    } else {
        Ok(())
    }
}

pub(crate) fn write_length(stream: &mut WriteCursor<'_>, length: u16) -> EncodeResult<usize> {
    ensure_size!(in: stream, size: sizeof_length(length));

    if length > 0xFF {
        stream.write_u8(0x80 ^ 0x2);
        stream.write_u16_be(length);

        Ok(3)
    } else if length > 0x7F {
        stream.write_u8(0x80 ^ 0x1);
        stream.write_u8(length as u8);

        Ok(2)
    } else {
        stream.write_u8(length as u8);

        Ok(1)
    }
}

pub(crate) fn read_length(stream: &mut ReadCursor<'_>) -> DecodeResult<u16> {
    ensure_size!(in: stream, size: 1);
    let byte = stream.read_u8();

    if byte & 0x80 != 0 {
        let len = byte & !0x80;

        if len == 1 {
            ensure_size!(in: stream, size: 1);
            Ok(u16::from(stream.read_u8()))
        } else if len == 2 {
            ensure_size!(in: stream, size: 2);
            Ok(stream.read_u16_be())
        } else {
            Err(invalid_field_err!("len", "invalid length of the length"))
        }
    } else {
        Ok(u16::from(byte))
    }
}

pub(crate) fn sizeof_length(length: u16) -> usize {
    if length > 0xFF {
        3
    } else if length > 0x7F {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn length_127_uses_short_form() {
        let mut buf = [0x0; 1];
        let mut cur = WriteCursor::new(&mut buf);
        assert_eq!(write_length(&mut cur, 127).unwrap(), 1);
        assert_eq!(buf, [0x7F]);
    }

    #[test]
    fn length_128_uses_long_form() {
        let mut buf = [0x0; 2];
        let mut cur = WriteCursor::new(&mut buf);
        assert_eq!(write_length(&mut cur, 128).unwrap(), 2);
        assert_eq!(buf, [0x81, 0x80]);
    }

    #[test]
    fn length_above_255_uses_two_byte_long_form() {
        let mut buf = [0x0; 3];
        let mut cur = WriteCursor::new(&mut buf);
        assert_eq!(write_length(&mut cur, 0x0212).unwrap(), 3);
        assert_eq!(buf, [0x82, 0x02, 0x12]);
    }

    #[test]
    fn read_length_rejects_oversized_length_of_length() {
        let buf = [0x83, 0x01, 0x02, 0x03];
        let mut cur = ReadCursor::new(&buf);
        assert!(read_length(&mut cur).is_err());
    }

    proptest! {
        #[test]
        fn length_round_trip(length in 0u16..=u16::MAX) {
            let mut buf = [0u8; 3];
            let mut cur = WriteCursor::new(&mut buf);
            let written = write_length(&mut cur, length).unwrap();

            let mut cur = ReadCursor::new(&buf[..written]);
            prop_assert_eq!(read_length(&mut cur).unwrap(), length);
        }

        #[test]
        fn integer_round_trip(value in 0u32..0x8000_0000) {
            let mut buf = [0u8; 6];
            let mut cur = WriteCursor::new(&mut buf);
            let written = write_integer(&mut cur, value).unwrap();

            // No encoding ever begins with a byte that would parse as negative.
            let content = &buf[2..written];
            prop_assert!(content[0] & 0x80 == 0);

            let mut cur = ReadCursor::new(&buf[..written]);
            prop_assert_eq!(read_integer(&mut cur).unwrap(), u64::from(value));
        }
    }

    #[test]
    fn write_sequence_tag_is_correct() {
        let mut buf = [0x0; 4];
        let mut cur = WriteCursor::new(&mut buf);
        assert_eq!(write_sequence_tag(&mut cur, 0x1A5).unwrap(), 4);
        assert_eq!(buf, [0x30, 0x82, 0x01, 0xA5]);
    }

    #[test]
    fn application_tag_above_30_uses_multi_byte_form() {
        let mut buf = [0x0; 3];
        let mut cur = WriteCursor::new(&mut buf);
        assert_eq!(write_application_tag(&mut cur, 101, 0x10).unwrap(), 3);
        assert_eq!(buf, [0x7F, 0x65, 0x10]);

        let mut cur = ReadCursor::new(&buf);
        assert_eq!(read_application_tag(&mut cur, 101).unwrap(), 0x10);
    }

    #[test]
    fn application_tag_below_31_is_single_byte() {
        let mut buf = [0x0; 2];
        let mut cur = WriteCursor::new(&mut buf);
        assert_eq!(write_application_tag(&mut cur, 0x0A, 0x22).unwrap(), 2);
        assert_eq!(buf, [0x6A, 0x22]);
    }

    #[test]
    fn bool_round_trip() {
        let mut buf = [0x0; 3];
        let mut cur = WriteCursor::new(&mut buf);
        write_bool(&mut cur, true).unwrap();
        assert_eq!(buf, [0x01, 0x01, 0xFF]);

        let mut cur = ReadCursor::new(&buf);
        assert!(read_bool(&mut cur).unwrap());
    }

    #[test]
    fn octet_string_round_trip() {
        let payload = [0xDE, 0xAD, 0xBE, 0xEF];

        let mut buf = [0x0; 6];
        let mut cur = WriteCursor::new(&mut buf);
        assert_eq!(write_octet_string(&mut cur, &payload).unwrap(), 6);
        assert_eq!(buf[..2], [0x04, 0x04]);

        let mut cur = ReadCursor::new(&buf);
        assert_eq!(read_octet_string(&mut cur).unwrap(), payload.to_vec());
    }
}
