//! BMP header and body: uncompressed (`BI_RGB`) 1/4/8-bit palettized and
//! 24-bit direct color, 4-byte row padding, and the negative-height
//! top-down convention.

use crate::color::{Palette, RgbEntry};
use crate::descriptor::{Descriptor, Format};
use crate::error::{GidError, GidResult};
use crate::io::buffered::BufferedInput;
use crate::sink::{PrimaryColor, Sink, SinkCursor};

/// `first_byte` is `'B'`, already consumed by the dispatcher.
pub(crate) fn read_header(input: &mut BufferedInput) -> GidResult<Descriptor> {
    let m = input.read_u8()?;
    if m != b'M' {
        return Err(GidError::UnknownFormat);
    }

    let _file_size = input.read_u32_le()?;
    let _reserved = input.read_u32_le()?;
    let pixel_data_offset = input.read_u32_le()?;
    let dib_header_size = input.read_u32_le()?;
    if dib_header_size == 12 {
        return Err(GidError::unsupported("BMP", "OS/2 1.x 12-byte core header"));
    }
    if dib_header_size != 40 {
        return Err(GidError::unsupported(
            "BMP",
            format!("DIB header size {dib_header_size}"),
        ));
    }

    let width = input.read_i32_le()?;
    let raw_height = input.read_i32_le()?;
    let top_down = raw_height < 0;
    let height = raw_height.unsigned_abs();
    if width <= 0 || height == 0 {
        return Err(GidError::invalid_data("BMP width/height must be positive"));
    }
    let width = width as u32;

    let _planes = input.read_u16_le()?;
    let bpp = input.read_u16_le()?;
    if !matches!(bpp, 1 | 4 | 8 | 24) {
        return Err(GidError::unsupported("BMP", format!("{bpp} bits per pixel")));
    }

    let compression = input.read_u32_le()?;
    if compression != 0 {
        return Err(GidError::unsupported(
            "BMP",
            "RLE compression (BI_RLE8/BI_RLE4)",
        ));
    }

    let _image_size = input.read_u32_le()?;
    let _x_res = input.read_i32_le()?;
    let _y_res = input.read_i32_le()?;
    let mut palette_count = input.read_u32_le()?;
    let _important_colors = input.read_u32_le()?;

    let mut d = Descriptor::new(Format::Bmp, width, height, u32::from(bpp));
    d.top_first = top_down;
    d.detailed_format = format!("BMP, {bpp}bpp{}", if top_down { ", top-down" } else { "" });

    if bpp <= 8 {
        if palette_count == 0 {
            palette_count = 1u32 << bpp;
        }
        let mut entries = Vec::with_capacity(palette_count as usize);
        for _ in 0..palette_count {
            let b = input.read_u8()?;
            let g = input.read_u8()?;
            let r = input.read_u8()?;
            let _reserved = input.read_u8()?;
            entries.push(RgbEntry { r, g, b });
        }
        d.palette = Some(Palette::new(entries));
    }

    // `pixel_data_offset` counts from the very start of the file. The
    // dispatcher reads the leading `'B'` through this same `BufferedInput`
    // before calling `read_header`, so `total_read()` already counts it.
    let header_and_palette = input.total_read();
    if u64::from(pixel_data_offset) > header_and_palette {
        input.skip((u64::from(pixel_data_offset) - header_and_palette) as usize)?;
    }

    Ok(d)
}

fn row_stride(width: u32, bpp: u16) -> usize {
    let bits = width as usize * bpp as usize;
    let bytes = (bits + 7) / 8;
    bytes.div_ceil(4) * 4
}

pub(crate) fn decode<P: PrimaryColor>(
    d: &Descriptor,
    input: &mut BufferedInput,
    sink: &mut dyn Sink<P>,
) -> GidResult<f64> {
    let bpp = d.bits_per_pixel as u16;
    let width = d.width;
    let height = d.height;
    let stride = row_stride(width, bpp);
    let mut row = vec![0u8; stride];

    let mut cursor = SinkCursor::new(sink, width, height);
    for row_index in 0..height {
        input.read_exact(&mut row)?;
        let y = if d.top_first {
            row_index
        } else {
            height - 1 - row_index
        };
        cursor.goto(0, y)?;
        match bpp {
            1 | 4 | 8 => {
                let palette = d
                    .palette
                    .as_ref()
                    .ok_or(GidError::InternalInvariantViolated("BMP missing palette"))?;
                for x in 0..width {
                    let index = read_packed_index(&row, x, bpp);
                    let (r, g, b, a) = palette.get(index as usize).ok_or_else(|| {
                        GidError::invalid_data(format!(
                            "BMP palette index {index} out of range (len {})",
                            palette.len()
                        ))
                    })?;
                    cursor.put(
                        crate::color::scale_to_primary::<P>(u32::from(r), 255),
                        crate::color::scale_to_primary::<P>(u32::from(g), 255),
                        crate::color::scale_to_primary::<P>(u32::from(b), 255),
                        crate::color::scale_to_primary::<P>(u32::from(a), 255),
                    )?;
                }
            }
            24 => {
                for x in 0..width {
                    let off = x as usize * 3;
                    let b = row[off];
                    let g = row[off + 1];
                    let r = row[off + 2];
                    cursor.put(
                        crate::color::scale_to_primary::<P>(u32::from(r), 255),
                        crate::color::scale_to_primary::<P>(u32::from(g), 255),
                        crate::color::scale_to_primary::<P>(u32::from(b), 255),
                        P::from_u32(P::max_value()),
                    )?;
                }
            }
            _ => unreachable!("validated in read_header"),
        }
    }
    cursor.finish()?;
    Ok(0.0)
}

fn read_packed_index(row: &[u8], x: u32, bpp: u16) -> u8 {
    match bpp {
        8 => row[x as usize],
        4 => {
            let byte = row[(x / 2) as usize];
            if x % 2 == 0 {
                byte >> 4
            } else {
                byte & 0x0F
            }
        }
        1 => {
            let byte = row[(x / 8) as usize];
            (byte >> (7 - (x % 8))) & 1
        }
        _ => unreachable!(),
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
    fn decodes_2x1_bottom_up_24bit() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"BM");
        bytes.extend_from_slice(&0x46u32.to_le_bytes()); // file size
        bytes.extend_from_slice(&0u32.to_le_bytes()); // reserved
        bytes.extend_from_slice(&0x36u32.to_le_bytes()); // pixel data offset
        bytes.extend_from_slice(&0x28u32.to_le_bytes()); // dib header size
        bytes.extend_from_slice(&2i32.to_le_bytes()); // width
        bytes.extend_from_slice(&1i32.to_le_bytes()); // height (bottom-up)
        bytes.extend_from_slice(&1u16.to_le_bytes()); // planes
        bytes.extend_from_slice(&24u16.to_le_bytes()); // bpp
        bytes.extend_from_slice(&0u32.to_le_bytes()); // compression
        bytes.extend_from_slice(&0u32.to_le_bytes()); // image size
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes()); // palette count
        bytes.extend_from_slice(&0u32.to_le_bytes());
        // pixel data: BGR red, BGR green (row padded to 4 bytes, already 6 bytes -> pad 2)
        bytes.extend_from_slice(&[0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0x00, 0x00]);

        let mut src = Slice(&bytes[1..]); // first byte 'B' already consumed by dispatcher
        let mut input = BufferedInput::new(&mut src);
        let d = read_header(&mut input).unwrap();
        assert_eq!((d.width, d.height), (2, 1));
        assert!(!d.top_first);

        let mut sink = Collect(Vec::new());
        let delay = decode(&d, &mut input, &mut sink).unwrap();
        assert_eq!(delay, 0.0);
        assert_eq!(sink.0, vec![(255, 0, 0, 255), (0, 255, 0, 255)]);
    }
}
