//! PNM header and body: `P1`..`P6`, ASCII/binary bitmap, graymap, and
//! pixmap, plus a `P7`/PAM recognition stub so the format dispatcher
//! reports it as known-but-unsupported rather than misfiling it as an
//! unrecognized signature.

use crate::descriptor::{Descriptor, Format};
use crate::error::{GidError, GidResult};
use crate::io::buffered::BufferedInput;
use crate::sink::{PrimaryColor, Sink, SinkCursor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    BitmapAscii,
    GraymapAscii,
    PixmapAscii,
    BitmapBinary,
    GraymapBinary,
    PixmapBinary,
}

impl Kind {
    fn from_digit(d: u8) -> Option<Kind> {
        Some(match d {
            b'1' => Kind::BitmapAscii,
            b'2' => Kind::GraymapAscii,
            b'3' => Kind::PixmapAscii,
            b'4' => Kind::BitmapBinary,
            b'5' => Kind::GraymapBinary,
            b'6' => Kind::PixmapBinary,
            _ => return None,
        })
    }

    fn is_binary(self) -> bool {
        matches!(self, Kind::BitmapBinary | Kind::GraymapBinary | Kind::PixmapBinary)
    }

    fn channels(self) -> u32 {
        match self {
            Kind::PixmapAscii | Kind::PixmapBinary => 3,
            _ => 1,
        }
    }

    fn is_bitmap(self) -> bool {
        matches!(self, Kind::BitmapAscii | Kind::BitmapBinary)
    }
}

struct Tokenizer<'a, 'b> {
    input: &'a mut BufferedInput<'b>,
}

impl<'a, 'b> Tokenizer<'a, 'b> {
    fn skip_whitespace_and_comments(&mut self) -> GidResult<u8> {
        loop {
            let b = self.input.read_u8()?;
            if b == b'#' {
                loop {
                    let c = self.input.read_u8()?;
                    if c == b'\n' {
                        break;
                    }
                }
                continue;
            }
            if b.is_ascii_whitespace() {
                continue;
            }
            return Ok(b);
        }
    }

    /// Reads the next whitespace-separated unsigned integer token.
    fn next_uint(&mut self) -> GidResult<u32> {
        let first = self.skip_whitespace_and_comments()?;
        if !first.is_ascii_digit() {
            return Err(GidError::invalid_data("expected integer token in PNM header"));
        }
        let mut value = u32::from(first - b'0');
        loop {
            let b = self.input.read_u8()?;
            if b.is_ascii_digit() {
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(u32::from(b - b'0')))
                    .ok_or_else(|| GidError::invalid_data("PNM header integer overflow"))?;
            } else {
                break;
            }
        }
        Ok(value)
    }
}

/// `first_byte` is `'P'`, already consumed by the dispatcher.
pub(crate) fn read_header(input: &mut BufferedInput) -> GidResult<Descriptor> {
    let digit = input.read_u8()?;
    if digit == b'7' {
        return Err(GidError::unsupported("PNM", "P7 (PAM)"));
    }
    let kind = Kind::from_digit(digit).ok_or(GidError::UnknownFormat)?;

    let mut tok = Tokenizer { input };
    let width = tok.next_uint()?;
    let height = tok.next_uint()?;
    if width == 0 || height == 0 {
        return Err(GidError::invalid_data("PNM width/height must be positive"));
    }

    let maxval = if kind.is_bitmap() {
        1
    } else {
        let mv = tok.next_uint()?;
        if mv == 0 || mv > 65535 {
            return Err(GidError::invalid_data("PNM maxval must be in [1, 65535]"));
        }
        mv
    };

    if kind.is_binary() {
        // Exactly one whitespace byte separates the header from binary data.
        let _sep = input.read_u8()?;
    }

    let bytes_per_sample = if maxval > 255 { 2 } else { 1 };
    let mut d = Descriptor::new(
        Format::Pnm,
        width,
        height,
        bytes_per_sample * 8 * kind.channels(),
    );
    d.greyscale = kind.channels() == 1;
    d.subformat_id = i32::from(digit - b'0');
    d.detailed_format = format!("PNM P{}", char::from(digit));
    d.transparency = false;

    Ok(d)
}

fn kind_from_descriptor(d: &Descriptor) -> Kind {
    Kind::from_digit(b'0' + d.subformat_id as u8).expect("subformat_id set by read_header")
}

pub(crate) fn decode<P: PrimaryColor>(
    d: &Descriptor,
    input: &mut BufferedInput,
    sink: &mut dyn Sink<P>,
) -> GidResult<f64> {
    let kind = kind_from_descriptor(d);
    let width = d.width;
    let height = d.height;
    let in_max: u32 = if kind.is_bitmap() {
        1
    } else {
        let bytes_per_sample = d.bits_per_pixel / (8 * kind.channels());
        if bytes_per_sample == 2 {
            65535
        } else {
            255
        }
    };

    let mut cursor = SinkCursor::new(sink, width, height);
    for y in 0..height {
        cursor.goto(0, y)?;
        // PBM binary rows are byte-aligned: a row never shares a byte with
        // the next, so the packed-bit cursor resets every row.
        let mut bit_byte = 0u8;
        let mut bits_left = 0u8;
        for _ in 0..width {
            let (r, g, b) = match kind {
                Kind::BitmapAscii => {
                    let bit = read_ascii_sample(input, 1)?;
                    // PBM: 1 = black, 0 = white.
                    let v = if bit == 0 { 1 } else { 0 };
                    (v, v, v)
                }
                Kind::BitmapBinary => {
                    if bits_left == 0 {
                        bit_byte = input.read_u8()?;
                        bits_left = 8;
                    }
                    let bit = (bit_byte >> 7) & 1;
                    bit_byte <<= 1;
                    bits_left -= 1;
                    let v = u32::from(bit == 0);
                    (v, v, v)
                }
                Kind::GraymapAscii => {
                    let v = read_ascii_sample(input, in_max)?;
                    (v, v, v)
                }
                Kind::GraymapBinary => {
                    let v = read_binary_sample(input, in_max)?;
                    (v, v, v)
                }
                Kind::PixmapAscii => (
                    read_ascii_sample(input, in_max)?,
                    read_ascii_sample(input, in_max)?,
                    read_ascii_sample(input, in_max)?,
                ),
                Kind::PixmapBinary => (
                    read_binary_sample(input, in_max)?,
                    read_binary_sample(input, in_max)?,
                    read_binary_sample(input, in_max)?,
                ),
            };
            let bitmap_max = if kind.is_bitmap() { 1 } else { in_max };
            cursor.put(
                crate::color::scale_to_primary(r, bitmap_max),
                crate::color::scale_to_primary(g, bitmap_max),
                crate::color::scale_to_primary(b, bitmap_max),
                P::from_u32(P::max_value()),
            )?;
        }
    }
    cursor.finish()?;
    Ok(0.0)
}

fn read_ascii_sample(input: &mut BufferedInput, _max: u32) -> GidResult<u32> {
    let mut tok = Tokenizer { input };
    tok.next_uint()
}

fn read_binary_sample(input: &mut BufferedInput, max: u32) -> GidResult<u32> {
    if max > 255 {
        Ok(u32::from(input.read_u16_be()?))
    } else {
        Ok(u32::from(input.read_u8()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::buffered::ByteSource;

    struct Slice<'a>(&'a [u8]);
    impl<'a> ByteSource for Slice<'a> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    struct Collect(Vec<(u8, u8, u8, u8)>);
    impl Sink<u8> for Collect {
        fn set_xy(&mut self, _x: u32, _y: u32) {}
        fn put_pixel(&mut self, r: u8, g: u8, b: u8, a: u8) {
            self.0.push((r, g, b, a));
        }
    }

    #[test]
    fn decodes_p5_binary_greymap() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"5\n2 1\n255\n");
        bytes.extend_from_slice(&[64, 192]);

        let mut src = Slice(&bytes);
        let mut input = BufferedInput::new(&mut src);
        let d = read_header(&mut input).unwrap();
        assert_eq!((d.width, d.height), (2, 1));

        let mut sink = Collect(Vec::new());
        decode(&d, &mut input, &mut sink).unwrap();
        assert_eq!(sink.0, vec![(64, 64, 64, 255), (192, 192, 192, 255)]);
    }
}
