//! Client Info packet (TS_INFO_PACKET / TS_EXTENDED_INFO_PACKET).
//!
//! Strings travel as little-endian UTF-16; the `cb*` length fields exclude
//! the mandatory two-byte NUL terminators.

use bitflags::bitflags;
use sablerdp_core::{
    cast_length, ensure_size, write_padding, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

use crate::utf16;

const CODE_PAGE_SIZE: usize = 4;
const FLAGS_SIZE: usize = 4;
const STRING_LEN_FIELD_SIZE: usize = 2;
const NULL_TERMINATOR_SIZE: usize = 2;

const TIMEZONE_INFO_SIZE: usize = 172;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientInfoFlags: u32 {
        const MOUSE = 0x0000_0001;
        const DISABLE_CTRL_ALT_DEL = 0x0000_0002;
        const AUTOLOGON = 0x0000_0008;
        const UNICODE = 0x0000_0010;
        const MAXIMIZE_SHELL = 0x0000_0020;
        const LOGON_NOTIFY = 0x0000_0040;
        const COMPRESSION = 0x0000_0080;
        const ENABLE_WINDOWS_KEY = 0x0000_0100;
        const REMOTE_CONSOLE_AUDIO = 0x0000_2000;
        const FORCE_ENCRYPTED_CS_PDU = 0x0000_4000;
        const RAIL = 0x0000_8000;
        const LOGON_ERRORS = 0x0001_0000;
        const MOUSE_HAS_WHEEL = 0x0002_0000;
        const PASSWORD_IS_SC_PIN = 0x0004_0000;
        const NO_AUDIO_PLAYBACK = 0x0008_0000;
        const USING_SAVED_CREDS = 0x0010_0000;
        const AUDIO_CAPTURE = 0x0020_0000;
        const VIDEO_DISABLE = 0x0040_0000;
        const HIDEF_RAIL_SUPPORTED = 0x0200_0000;
    }
}

bitflags! {
    /// Session niceties the caller may trade away for responsiveness.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PerformanceFlags: u32 {
        const DISABLE_WALLPAPER = 0x0000_0001;
        const DISABLE_FULL_WINDOW_DRAG = 0x0000_0002;
        const DISABLE_MENU_ANIMATIONS = 0x0000_0004;
        const DISABLE_THEMING = 0x0000_0008;
        const DISABLE_CURSOR_SHADOW = 0x0000_0020;
        const DISABLE_CURSOR_SETTINGS = 0x0000_0040;
        const ENABLE_FONT_SMOOTHING = 0x0000_0080;
        const ENABLE_DESKTOP_COMPOSITION = 0x0000_0100;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum AddressFamily {
    Inet = 0x0002,
    Inet6 = 0x0017,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedClientInfo {
    pub address_family: AddressFamily,
    pub address: String,
    pub dir: String,
    pub performance_flags: PerformanceFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub credentials: Credentials,
    pub code_page: u32,
    pub flags: ClientInfoFlags,
    pub alternate_shell: String,
    pub work_dir: String,
    pub extra_info: ExtendedClientInfo,
}

impl ClientInfo {
    const NAME: &'static str = "ClientInfo";
}

impl Encode for ClientInfo {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let domain = self.credentials.domain.as_deref().unwrap_or("");

        dst.write_u32(self.code_page);
        dst.write_u32((self.flags | ClientInfoFlags::UNICODE).bits());

        dst.write_u16(cast_length!("cbDomain", utf16::null_terminated_utf16_encoded_len(domain))?);
        dst.write_u16(cast_length!(
            "cbUserName",
            utf16::null_terminated_utf16_encoded_len(&self.credentials.username)
        )?);
        dst.write_u16(cast_length!(
            "cbPassword",
            utf16::null_terminated_utf16_encoded_len(&self.credentials.password)
        )?);
        dst.write_u16(cast_length!(
            "cbAlternateShell",
            utf16::null_terminated_utf16_encoded_len(&self.alternate_shell)
        )?);
        dst.write_u16(cast_length!(
            "cbWorkingDir",
            utf16::null_terminated_utf16_encoded_len(&self.work_dir)
        )?);

        write_nul_terminated_utf16(dst, domain);
        write_nul_terminated_utf16(dst, &self.credentials.username);
        write_nul_terminated_utf16(dst, &self.credentials.password);
        write_nul_terminated_utf16(dst, &self.alternate_shell);
        write_nul_terminated_utf16(dst, &self.work_dir);

        self.extra_info.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let domain = self.credentials.domain.as_deref().unwrap_or("");

        CODE_PAGE_SIZE
            + FLAGS_SIZE
            + STRING_LEN_FIELD_SIZE * 5
            + utf16::null_terminated_utf16_encoded_len(domain)
            + utf16::null_terminated_utf16_encoded_len(&self.credentials.username)
            + utf16::null_terminated_utf16_encoded_len(&self.credentials.password)
            + utf16::null_terminated_utf16_encoded_len(&self.alternate_shell)
            + utf16::null_terminated_utf16_encoded_len(&self.work_dir)
            + NULL_TERMINATOR_SIZE * 5
            + self.extra_info.size()
    }
}

impl<'de> Decode<'de> for ClientInfo {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: CODE_PAGE_SIZE + FLAGS_SIZE + STRING_LEN_FIELD_SIZE * 5);

        let code_page = src.read_u32();
        let flags = ClientInfoFlags::from_bits_truncate(src.read_u32());

        let cb_domain = usize::from(src.read_u16());
        let cb_username = usize::from(src.read_u16());
        let cb_password = usize::from(src.read_u16());
        let cb_alternate_shell = usize::from(src.read_u16());
        let cb_work_dir = usize::from(src.read_u16());

        let domain = read_nul_terminated_utf16(src, cb_domain)?;
        let username = read_nul_terminated_utf16(src, cb_username)?;
        let password = read_nul_terminated_utf16(src, cb_password)?;
        let alternate_shell = read_nul_terminated_utf16(src, cb_alternate_shell)?;
        let work_dir = read_nul_terminated_utf16(src, cb_work_dir)?;

        let extra_info = ExtendedClientInfo::decode(src)?;

        Ok(Self {
            credentials: Credentials {
                username,
                password,
                domain: if domain.is_empty() { None } else { Some(domain) },
            },
            code_page,
            flags,
            alternate_shell,
            work_dir,
            extra_info,
        })
    }
}

impl ExtendedClientInfo {
    const NAME: &'static str = "ExtendedClientInfo";
}

impl Encode for ExtendedClientInfo {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.address_family as u16);
        // These length fields include the terminator.
        dst.write_u16(cast_length!(
            "cbClientAddress",
            utf16::null_terminated_utf16_encoded_len(&self.address) + NULL_TERMINATOR_SIZE
        )?);
        write_nul_terminated_utf16(dst, &self.address);
        dst.write_u16(cast_length!(
            "cbClientDir",
            utf16::null_terminated_utf16_encoded_len(&self.dir) + NULL_TERMINATOR_SIZE
        )?);
        write_nul_terminated_utf16(dst, &self.dir);

        // TS_TIME_ZONE_INFORMATION; all zeroes puts the session on UTC.
        write_padding!(dst, TIMEZONE_INFO_SIZE);

        dst.write_u32(0); // clientSessionId, must be ignored
        dst.write_u32(self.performance_flags.bits());

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        2 /* addressFamily */
            + STRING_LEN_FIELD_SIZE
            + utf16::null_terminated_utf16_encoded_len(&self.address) + NULL_TERMINATOR_SIZE
            + STRING_LEN_FIELD_SIZE
            + utf16::null_terminated_utf16_encoded_len(&self.dir) + NULL_TERMINATOR_SIZE
            + TIMEZONE_INFO_SIZE
            + 4 /* clientSessionId */
            + 4 /* performanceFlags */
    }
}

impl<'de> Decode<'de> for ExtendedClientInfo {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: 2 + STRING_LEN_FIELD_SIZE);

        let address_family = match src.read_u16() {
            0x0017 => AddressFamily::Inet6,
            _ => AddressFamily::Inet,
        };

        let cb_address = usize::from(src.read_u16());
        ensure_size!(in: src, size: cb_address);
        let address = utf16::from_utf16_bytes(src.read_slice(cb_address));

        ensure_size!(in: src, size: STRING_LEN_FIELD_SIZE);
        let cb_dir = usize::from(src.read_u16());
        ensure_size!(in: src, size: cb_dir);
        let dir = utf16::from_utf16_bytes(src.read_slice(cb_dir));

        ensure_size!(in: src, size: TIMEZONE_INFO_SIZE + 4 + 4);
        src.advance(TIMEZONE_INFO_SIZE);
        let _session_id = src.read_u32();
        let performance_flags = PerformanceFlags::from_bits_truncate(src.read_u32());

        Ok(Self {
            address_family,
            address,
            dir,
            performance_flags,
        })
    }
}

fn write_nul_terminated_utf16(dst: &mut WriteCursor<'_>, value: &str) {
    for unit in value.encode_utf16() {
        dst.write_u16(unit);
    }
    dst.write_u16(0);
}

fn read_nul_terminated_utf16(src: &mut ReadCursor<'_>, cb: usize) -> DecodeResult<String> {
    ensure_size!(ctx: "readNulTerminatedUtf16", in: src, size: cb + NULL_TERMINATOR_SIZE);

    let value = utf16::from_utf16_bytes(src.read_slice(cb));
    src.advance(NULL_TERMINATOR_SIZE);

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sablerdp_core::{decode, encode_vec};

    fn client_info() -> ClientInfo {
        ClientInfo {
            credentials: Credentials {
                username: "automation".to_owned(),
                password: "hunter2".to_owned(),
                domain: Some("CORP".to_owned()),
            },
            code_page: 0,
            flags: ClientInfoFlags::MOUSE
                | ClientInfoFlags::UNICODE
                | ClientInfoFlags::LOGON_NOTIFY
                | ClientInfoFlags::DISABLE_CTRL_ALT_DEL,
            alternate_shell: String::new(),
            work_dir: String::new(),
            extra_info: ExtendedClientInfo {
                address_family: AddressFamily::Inet,
                address: "192.0.2.10".to_owned(),
                dir: String::new(),
                performance_flags: PerformanceFlags::DISABLE_WALLPAPER | PerformanceFlags::DISABLE_THEMING,
            },
        }
    }

    #[test]
    fn client_info_round_trip() {
        let info = client_info();

        let encoded = encode_vec(&info).unwrap();
        assert_eq!(encoded.len(), info.size());

        // cbDomain counts bytes, not characters, and excludes the NUL.
        assert_eq!(u16::from_le_bytes([encoded[8], encoded[9]]), 8);

        let decoded: ClientInfo = decode(&encoded).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn unicode_flag_is_always_set() {
        let mut info = client_info();
        info.flags = ClientInfoFlags::MOUSE;

        let encoded = encode_vec(&info).unwrap();
        let flags = u32::from_le_bytes(encoded[4..8].try_into().unwrap());
        assert_ne!(flags & ClientInfoFlags::UNICODE.bits(), 0);
    }
}
