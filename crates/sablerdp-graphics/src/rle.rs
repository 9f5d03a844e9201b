//! Interleaved Run-Length Encoding (RLE) bitmap codec.
//!
//! References:
//!
//! - [RLE_BITMAP_STREAM](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/b3b60873-16a8-4cbc-8aaa-5f0a93083280)
//! - [Decompression pseudo-code](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/b6a3f5c2-0804-4c10-9d25-a321720fd23e)
//!
//! The decoder is a pure synchronous function: callers running inside an
//! async runtime offload it to a worker thread.

use core::ops::BitXor;

use thiserror::Error;

/// Size of the TS_CD_HEADER that may precede the compressed stream.
pub const COMPRESSION_HEADER_SIZE: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RlePixelFormat {
    Rgb24,
    Rgb16,
    Rgb15,
    Rgb8,
}

impl RlePixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Rgb16 | Self::Rgb15 => 2,
            Self::Rgb8 => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RleError {
    #[error("invalid bits per pixel: {bpp}")]
    InvalidBpp { bpp: usize },
    #[error("unknown RLE order code 0x{code:02X}")]
    UnknownOrderCode { code: u8 },
    #[error("truncated input: expected {expected} more bytes, but only {actual} remain")]
    TruncatedInput { expected: usize, actual: usize },
    #[error("output overflow: {required_additional} more bytes required, but the image can only hold {maximum_additional}")]
    OutputOverflow {
        maximum_additional: usize,
        required_additional: usize,
    },
    #[error("height or width is zero")]
    EmptyImage,
    #[error("unexpected zero-length run")]
    UnexpectedZeroLength,
}

/// Decompresses an RLE compressed bitmap into `dst`.
///
/// `dst` is resized to exactly `width * height * bytes_per_pixel`; the pixel
/// bytes come out in the server's native order for the given depth,
/// bottom-up in row order as they arrived.
pub fn decompress(
    src: &[u8],
    dst: &mut Vec<u8>,
    width: usize,
    height: usize,
    bpp: usize,
) -> Result<RlePixelFormat, RleError> {
    match bpp {
        24 => decompress_impl::<Depth24>(src, dst, width, height),
        16 => decompress_impl::<Depth16>(src, dst, width, height),
        15 => decompress_impl::<Depth15>(src, dst, width, height),
        8 => decompress_impl::<Depth8>(src, dst, width, height),
        invalid => Err(RleError::InvalidBpp { bpp: invalid }),
    }
}

/// Like [`decompress`], for a stream still carrying its TS_CD_HEADER.
pub fn decompress_with_header(
    src: &[u8],
    dst: &mut Vec<u8>,
    width: usize,
    height: usize,
    bpp: usize,
) -> Result<RlePixelFormat, RleError> {
    if src.len() < COMPRESSION_HEADER_SIZE {
        return Err(RleError::TruncatedInput {
            expected: COMPRESSION_HEADER_SIZE,
            actual: src.len(),
        });
    }

    decompress(&src[COMPRESSION_HEADER_SIZE..], dst, width, height, bpp)
}

fn decompress_impl<Mode: DepthMode>(
    src: &[u8],
    dst: &mut Vec<u8>,
    width: usize,
    height: usize,
) -> Result<RlePixelFormat, RleError> {
    if width == 0 || height == 0 {
        return Err(RleError::EmptyImage);
    }

    let row_delta = Mode::BYTES_PER_PIXEL * width;
    dst.resize(row_delta * height, 0);
    run_decoder::<Mode>(src, dst, row_delta)?;

    Ok(Mode::PIXEL_FORMAT)
}

macro_rules! ensure_input {
    ($buf:ident, $expected:expr) => {{
        let actual = $buf.remaining_len();
        let expected = $expected;
        if expected > actual {
            return Err(RleError::TruncatedInput { expected, actual });
        }
    }};
}

macro_rules! ensure_output {
    ($buf:ident, $required:expr) => {{
        let maximum_additional = $buf.remaining_len();
        let required_additional = $required;
        if required_additional > maximum_additional {
            return Err(RleError::OutputOverflow {
                maximum_additional,
                required_additional,
            });
        }
    }};
}

/// The compression order codes, normalized from the header byte.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Code(u8);

impl Code {
    const REGULAR_BG_RUN: Code = Code(0x00);
    const REGULAR_FG_RUN: Code = Code(0x01);
    const REGULAR_FGBG_IMAGE: Code = Code(0x02);
    const REGULAR_COLOR_RUN: Code = Code(0x03);
    const REGULAR_COLOR_IMAGE: Code = Code(0x04);

    const LITE_SET_FG_FG_RUN: Code = Code(0x0C);
    const LITE_SET_FG_FGBG_IMAGE: Code = Code(0x0D);
    const LITE_DITHERED_RUN: Code = Code(0x0E);

    const MEGA_MEGA_BG_RUN: Code = Code(0xF0);
    const MEGA_MEGA_FG_RUN: Code = Code(0xF1);
    const MEGA_MEGA_FGBG_IMAGE: Code = Code(0xF2);
    const MEGA_MEGA_COLOR_RUN: Code = Code(0xF3);
    const MEGA_MEGA_COLOR_IMAGE: Code = Code(0xF4);
    const MEGA_MEGA_SET_FG_RUN: Code = Code(0xF6);
    const MEGA_MEGA_SET_FGBG_IMAGE: Code = Code(0xF7);
    const MEGA_MEGA_DITHERED_RUN: Code = Code(0xF8);

    const SPECIAL_FGBG_1: Code = Code(0xF9);
    const SPECIAL_FGBG_2: Code = Code(0xFA);
    const SPECIAL_WHITE: Code = Code(0xFD);
    const SPECIAL_BLACK: Code = Code(0xFE);

    fn decode(header: u8) -> Self {
        if (header & 0xC0) != 0xC0 {
            // REGULAR orders: code in the top three bits.
            Code(header >> 5)
        } else if (header & 0xF0) == 0xF0 {
            // MEGA MEGA and SPECIAL orders: the full byte.
            Code(header)
        } else {
            // LITE orders: code in the top four bits.
            Code(header >> 4)
        }
    }

    /// Extracts the run length encoded alongside the order code.
    fn extract_run_length(self, header: u8, src: &mut Input<'_>) -> Result<usize, RleError> {
        const MASK_REGULAR_RUN_LENGTH: u8 = 0x1F;
        const MASK_LITE_RUN_LENGTH: u8 = 0x0F;

        fn fg_bg(header: u8, mask: u8, src: &mut Input<'_>) -> Result<usize, RleError> {
            match header & mask {
                0 => {
                    ensure_input!(src, 1);
                    Ok(usize::from(src.read_u8()) + 1)
                }
                run_length => Ok(usize::from(run_length) * 8),
            }
        }

        fn regular(header: u8, src: &mut Input<'_>) -> Result<usize, RleError> {
            match header & MASK_REGULAR_RUN_LENGTH {
                0 => {
                    // An extended (MEGA) run.
                    ensure_input!(src, 1);
                    Ok(usize::from(src.read_u8()) + 32)
                }
                run_length => Ok(usize::from(run_length)),
            }
        }

        fn lite(header: u8, src: &mut Input<'_>) -> Result<usize, RleError> {
            match header & MASK_LITE_RUN_LENGTH {
                0 => {
                    ensure_input!(src, 1);
                    Ok(usize::from(src.read_u8()) + 16)
                }
                run_length => Ok(usize::from(run_length)),
            }
        }

        fn mega_mega(src: &mut Input<'_>) -> Result<usize, RleError> {
            ensure_input!(src, 2);

            let run_length = usize::from(src.read_u16());

            if run_length == 0 {
                Err(RleError::UnexpectedZeroLength)
            } else {
                Ok(run_length)
            }
        }

        match self {
            Self::REGULAR_FGBG_IMAGE => fg_bg(header, MASK_REGULAR_RUN_LENGTH, src),
            Self::LITE_SET_FG_FGBG_IMAGE => fg_bg(header, MASK_LITE_RUN_LENGTH, src),

            Self::REGULAR_BG_RUN | Self::REGULAR_FG_RUN | Self::REGULAR_COLOR_RUN | Self::REGULAR_COLOR_IMAGE => {
                regular(header, src)
            }

            Self::LITE_SET_FG_FG_RUN | Self::LITE_DITHERED_RUN => lite(header, src),

            Self::MEGA_MEGA_BG_RUN
            | Self::MEGA_MEGA_FG_RUN
            | Self::MEGA_MEGA_SET_FG_RUN
            | Self::MEGA_MEGA_DITHERED_RUN
            | Self::MEGA_MEGA_COLOR_RUN
            | Self::MEGA_MEGA_FGBG_IMAGE
            | Self::MEGA_MEGA_SET_FGBG_IMAGE
            | Self::MEGA_MEGA_COLOR_IMAGE => mega_mega(src),

            _ => Ok(0),
        }
    }
}

fn run_decoder<Mode: DepthMode>(src: &[u8], dst: &mut [u8], row_delta: usize) -> Result<(), RleError> {
    let mut src = Input::new(src);
    let mut dst = Output::new(dst);

    let mut fg_pel = Mode::WHITE_PIXEL;
    let mut insert_fg_pel = false;
    let mut is_first_line = true;

    while !src.eof() {
        // Watch out for the end of the first scanline.
        if is_first_line && dst.pos >= row_delta {
            is_first_line = false;
            insert_fg_pel = false;
        }

        ensure_input!(src, 1);

        let header = src.read_u8();
        let code = Code::decode(header);
        let run_length = code.extract_run_length(header, &mut src)?;

        match code {
            // Background runs copy the previous scanline (black on the first
            // line), inserting one foreground pel when chained.
            Code::REGULAR_BG_RUN | Code::MEGA_MEGA_BG_RUN => {
                ensure_output!(dst, run_length * Mode::BYTES_PER_PIXEL);

                if is_first_line {
                    let num_iterations = if insert_fg_pel {
                        Mode::write_pixel(&mut dst, fg_pel);
                        run_length - 1
                    } else {
                        run_length
                    };

                    for _ in 0..num_iterations {
                        Mode::write_pixel(&mut dst, Mode::BLACK_PIXEL);
                    }
                } else {
                    let num_iterations = if insert_fg_pel {
                        let above = dst.read_pixel_above::<Mode>(row_delta);
                        Mode::write_pixel(&mut dst, above ^ fg_pel);
                        run_length - 1
                    } else {
                        run_length
                    };

                    for _ in 0..num_iterations {
                        let above = dst.read_pixel_above::<Mode>(row_delta);
                        Mode::write_pixel(&mut dst, above);
                    }
                }

                // A follow-on background run needs a foreground pel inserted.
                insert_fg_pel = true;
                continue;
            }

            Code::REGULAR_FG_RUN | Code::MEGA_MEGA_FG_RUN | Code::LITE_SET_FG_FG_RUN | Code::MEGA_MEGA_SET_FG_RUN => {
                if code == Code::LITE_SET_FG_FG_RUN || code == Code::MEGA_MEGA_SET_FG_RUN {
                    ensure_input!(src, Mode::BYTES_PER_PIXEL);
                    fg_pel = Mode::read_pixel(&mut src);
                }

                ensure_output!(dst, run_length * Mode::BYTES_PER_PIXEL);

                if is_first_line {
                    for _ in 0..run_length {
                        Mode::write_pixel(&mut dst, fg_pel);
                    }
                } else {
                    for _ in 0..run_length {
                        let above = dst.read_pixel_above::<Mode>(row_delta);
                        Mode::write_pixel(&mut dst, above ^ fg_pel);
                    }
                }
            }

            Code::LITE_DITHERED_RUN | Code::MEGA_MEGA_DITHERED_RUN => {
                ensure_input!(src, 2 * Mode::BYTES_PER_PIXEL);

                let pixel_a = Mode::read_pixel(&mut src);
                let pixel_b = Mode::read_pixel(&mut src);

                ensure_output!(dst, run_length * 2 * Mode::BYTES_PER_PIXEL);

                for _ in 0..run_length {
                    Mode::write_pixel(&mut dst, pixel_a);
                    Mode::write_pixel(&mut dst, pixel_b);
                }
            }

            Code::REGULAR_COLOR_RUN | Code::MEGA_MEGA_COLOR_RUN => {
                ensure_input!(src, Mode::BYTES_PER_PIXEL);

                let pixel = Mode::read_pixel(&mut src);

                ensure_output!(dst, run_length * Mode::BYTES_PER_PIXEL);

                for _ in 0..run_length {
                    Mode::write_pixel(&mut dst, pixel);
                }
            }

            Code::REGULAR_FGBG_IMAGE
            | Code::MEGA_MEGA_FGBG_IMAGE
            | Code::LITE_SET_FG_FGBG_IMAGE
            | Code::MEGA_MEGA_SET_FGBG_IMAGE => {
                if code == Code::LITE_SET_FG_FGBG_IMAGE || code == Code::MEGA_MEGA_SET_FGBG_IMAGE {
                    ensure_input!(src, Mode::BYTES_PER_PIXEL);
                    fg_pel = Mode::read_pixel(&mut src);
                }

                let mut number_to_read = run_length;

                while number_to_read > 0 {
                    let c_bits = core::cmp::min(8, number_to_read);

                    ensure_input!(src, 1);
                    let bitmask = src.read_u8();

                    if is_first_line {
                        write_first_line_fg_bg_image::<Mode>(&mut dst, bitmask, fg_pel, c_bits)?;
                    } else {
                        write_fg_bg_image::<Mode>(&mut dst, row_delta, bitmask, fg_pel, c_bits)?;
                    }

                    number_to_read -= c_bits;
                }
            }

            Code::REGULAR_COLOR_IMAGE | Code::MEGA_MEGA_COLOR_IMAGE => {
                let byte_count = run_length * Mode::BYTES_PER_PIXEL;

                ensure_input!(src, byte_count);
                ensure_output!(dst, byte_count);

                for _ in 0..byte_count {
                    dst.write_u8(src.read_u8());
                }
            }

            Code::SPECIAL_FGBG_1 => {
                const MASK_SPECIAL_FG_BG_1: u8 = 0x03;

                if is_first_line {
                    write_first_line_fg_bg_image::<Mode>(&mut dst, MASK_SPECIAL_FG_BG_1, fg_pel, 8)?;
                } else {
                    write_fg_bg_image::<Mode>(&mut dst, row_delta, MASK_SPECIAL_FG_BG_1, fg_pel, 8)?;
                }
            }

            Code::SPECIAL_FGBG_2 => {
                const MASK_SPECIAL_FG_BG_2: u8 = 0x05;

                if is_first_line {
                    write_first_line_fg_bg_image::<Mode>(&mut dst, MASK_SPECIAL_FG_BG_2, fg_pel, 8)?;
                } else {
                    write_fg_bg_image::<Mode>(&mut dst, row_delta, MASK_SPECIAL_FG_BG_2, fg_pel, 8)?;
                }
            }

            Code::SPECIAL_WHITE => {
                ensure_output!(dst, Mode::BYTES_PER_PIXEL);
                Mode::write_pixel(&mut dst, Mode::WHITE_PIXEL);
            }

            Code::SPECIAL_BLACK => {
                ensure_output!(dst, Mode::BYTES_PER_PIXEL);
                Mode::write_pixel(&mut dst, Mode::BLACK_PIXEL);
            }

            Code(code) => return Err(RleError::UnknownOrderCode { code }),
        }

        // Any non-background order resets the chained-run state.
        insert_fg_pel = false;
    }

    Ok(())
}

struct Input<'a> {
    inner: &'a [u8],
    pos: usize,
}

impl<'a> Input<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { inner: bytes, pos: 0 }
    }

    fn remaining_len(&self) -> usize {
        self.inner.len() - self.pos
    }

    fn read<const N: usize>(&mut self) -> [u8; N] {
        let bytes = &self.inner[self.pos..self.pos + N];
        self.pos += N;
        bytes.try_into().expect("N-elements array")
    }

    fn read_u8(&mut self) -> u8 {
        self.read::<1>()[0]
    }

    fn read_u16(&mut self) -> u16 {
        u16::from_le_bytes(self.read::<2>())
    }

    fn read_u24(&mut self) -> u32 {
        let bytes = self.read::<3>();
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
    }

    fn eof(&self) -> bool {
        self.pos == self.inner.len()
    }
}

struct Output<'a> {
    inner: &'a mut [u8],
    pos: usize,
}

impl Output<'_> {
    fn new(bytes: &mut [u8]) -> Output<'_> {
        Output { inner: bytes, pos: 0 }
    }

    fn remaining_len(&self) -> usize {
        self.inner.len() - self.pos
    }

    fn write(&mut self, bytes: &[u8]) {
        self.inner[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn write_u8(&mut self, value: u8) {
        self.write(&[value]);
    }

    fn write_u16(&mut self, value: u16) {
        self.write(&value.to_le_bytes());
    }

    fn write_u24(&mut self, value: u32) {
        self.write(&value.to_le_bytes()[..3]);
    }

    fn read_pixel_above<Mode: DepthMode>(&self, row_delta: usize) -> Mode::Pixel {
        let mut above = Input {
            inner: self.inner,
            pos: self.pos - row_delta,
        };
        Mode::read_pixel(&mut above)
    }
}

trait DepthMode {
    type Pixel: Copy + BitXor<Output = Self::Pixel>;

    const BYTES_PER_PIXEL: usize;

    const PIXEL_FORMAT: RlePixelFormat;

    const BLACK_PIXEL: Self::Pixel;

    const WHITE_PIXEL: Self::Pixel;

    fn write_pixel(dst: &mut Output<'_>, pixel: Self::Pixel);

    fn read_pixel(src: &mut Input<'_>) -> Self::Pixel;
}

struct Depth8;

impl DepthMode for Depth8 {
    type Pixel = u8;

    const BYTES_PER_PIXEL: usize = 1;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Rgb8;

    const BLACK_PIXEL: Self::Pixel = 0x00;

    const WHITE_PIXEL: Self::Pixel = 0xFF;

    fn write_pixel(dst: &mut Output<'_>, pixel: Self::Pixel) {
        dst.write_u8(pixel);
    }

    fn read_pixel(src: &mut Input<'_>) -> Self::Pixel {
        src.read_u8()
    }
}

struct Depth15;

impl DepthMode for Depth15 {
    type Pixel = u16;

    const BYTES_PER_PIXEL: usize = 2;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Rgb15;

    const BLACK_PIXEL: Self::Pixel = 0x0000;

    // 5 bits per component: 0111 1111 1111 1111
    const WHITE_PIXEL: Self::Pixel = 0x7FFF;

    fn write_pixel(dst: &mut Output<'_>, pixel: Self::Pixel) {
        dst.write_u16(pixel);
    }

    fn read_pixel(src: &mut Input<'_>) -> Self::Pixel {
        src.read_u16()
    }
}

struct Depth16;

impl DepthMode for Depth16 {
    type Pixel = u16;

    const BYTES_PER_PIXEL: usize = 2;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Rgb16;

    const BLACK_PIXEL: Self::Pixel = 0x0000;

    const WHITE_PIXEL: Self::Pixel = 0xFFFF;

    fn write_pixel(dst: &mut Output<'_>, pixel: Self::Pixel) {
        dst.write_u16(pixel);
    }

    fn read_pixel(src: &mut Input<'_>) -> Self::Pixel {
        src.read_u16()
    }
}

struct Depth24;

impl DepthMode for Depth24 {
    type Pixel = u32;

    const BYTES_PER_PIXEL: usize = 3;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Rgb24;

    const BLACK_PIXEL: Self::Pixel = 0x00_0000;

    const WHITE_PIXEL: Self::Pixel = 0xFF_FFFF;

    fn write_pixel(dst: &mut Output<'_>, pixel: Self::Pixel) {
        dst.write_u24(pixel);
    }

    fn read_pixel(src: &mut Input<'_>) -> Self::Pixel {
        src.read_u24()
    }
}

fn write_fg_bg_image<Mode: DepthMode>(
    dst: &mut Output<'_>,
    row_delta: usize,
    bitmask: u8,
    fg_pel: Mode::Pixel,
    c_bits: usize,
) -> Result<(), RleError> {
    ensure_output!(dst, c_bits * Mode::BYTES_PER_PIXEL);

    let mut mask = 0x01;

    for _ in 0..c_bits {
        let above = dst.read_pixel_above::<Mode>(row_delta);

        if bitmask & mask != 0 {
            Mode::write_pixel(dst, above ^ fg_pel);
        } else {
            Mode::write_pixel(dst, above);
        }

        mask <<= 1;
    }

    Ok(())
}

fn write_first_line_fg_bg_image<Mode: DepthMode>(
    dst: &mut Output<'_>,
    bitmask: u8,
    fg_pel: Mode::Pixel,
    c_bits: usize,
) -> Result<(), RleError> {
    ensure_output!(dst, c_bits * Mode::BYTES_PER_PIXEL);

    let mut mask = 0x01;

    for _ in 0..c_bits {
        if bitmask & mask != 0 {
            Mode::write_pixel(dst, fg_pel);
        } else {
            Mode::write_pixel(dst, Mode::BLACK_PIXEL);
        }

        mask <<= 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[test]
    fn color_run_fills_the_row() {
        // REGULAR_COLOR_RUN (0x60 | length 4) of a 16-bpp pixel over a 4x1 image.
        let compressed = [0x64, 0x1F, 0x00];

        let mut out = Vec::new();
        let format = decompress(&compressed, &mut out, 4, 1, 16).unwrap();

        assert_eq!(format, RlePixelFormat::Rgb16);
        assert_eq!(out, [0x1F, 0x00, 0x1F, 0x00, 0x1F, 0x00, 0x1F, 0x00]);
    }

    #[test]
    fn bg_run_copies_previous_scanline() {
        // Row 1: color run of 4 pixels; row 2: background run of 4.
        let compressed = [0x64, 0xAB, 0xCD, 0x04];

        let mut out = Vec::new();
        decompress(&compressed, &mut out, 4, 2, 16).unwrap();

        assert_eq!(&out[..8], &out[8..]);
        assert_eq!(out[8..10], [0xAB, 0xCD]);
    }

    #[test]
    fn color_image_is_copied_verbatim() {
        // REGULAR_COLOR_IMAGE (0x80 | length 2), two 24-bpp pixels.
        let compressed = [0x82, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];

        let mut out = Vec::new();
        let format = decompress(&compressed, &mut out, 2, 1, 24).unwrap();

        assert_eq!(format, RlePixelFormat::Rgb24);
        assert_eq!(out, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[rstest]
    #[case::depth8(8, 1)]
    #[case::depth15(15, 2)]
    #[case::depth16(16, 2)]
    #[case::depth24(24, 3)]
    fn output_is_exactly_width_height_bytes_per_pixel(#[case] bpp: usize, #[case] bytes_per_pixel: usize) {
        // A white special order per pixel of a 2x2 image.
        let compressed = [0xFD, 0xFD, 0xFD, 0xFD];

        let mut out = Vec::new();
        decompress(&compressed, &mut out, 2, 2, bpp).unwrap();

        assert_eq!(out.len(), 2 * 2 * bytes_per_pixel);
    }

    #[test]
    fn invalid_bpp_is_rejected() {
        let mut out = Vec::new();
        assert_eq!(
            decompress(&[0x00], &mut out, 1, 1, 32),
            Err(RleError::InvalidBpp { bpp: 32 })
        );
    }

    #[test]
    fn truncated_input_is_reported() {
        // A color run wanting a pixel that is not there.
        let compressed = [0x64];

        let mut out = Vec::new();
        assert!(matches!(
            decompress(&compressed, &mut out, 4, 1, 16),
            Err(RleError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn output_overflow_is_reported() {
        // A run longer than the destination image.
        let compressed = [0x68, 0x1F, 0x00];

        let mut out = Vec::new();
        assert!(matches!(
            decompress(&compressed, &mut out, 4, 1, 16),
            Err(RleError::OutputOverflow { .. })
        ));
    }

    #[test]
    fn empty_image_is_rejected() {
        let mut out = Vec::new();
        assert_eq!(decompress(&[], &mut out, 0, 1, 16), Err(RleError::EmptyImage));
    }

    #[test]
    fn header_variant_skips_the_compression_header() {
        let mut compressed = vec![0u8; COMPRESSION_HEADER_SIZE];
        compressed.extend_from_slice(&[0x64, 0x1F, 0x00]);

        let mut with_header = Vec::new();
        decompress_with_header(&compressed, &mut with_header, 4, 1, 16).unwrap();

        let mut without_header = Vec::new();
        decompress(&compressed[COMPRESSION_HEADER_SIZE..], &mut without_header, 4, 1, 16).unwrap();

        assert_eq!(with_header, without_header);
    }
}
