//! TGA header and body.
//!
//! TGA has no signature; the dispatcher falls through to it only when
//! `try_tga` is set and the first byte didn't match anything else. That
//! first byte is the ID-length field and is threaded through as
//! `Descriptor::first_byte`: the byte already consumed by signature
//! detection, passed on to the one format decoder that needs it.

use crate::descriptor::{Descriptor, Format};
use crate::error::{GidError, GidResult};
use crate::io::buffered::BufferedInput;
use crate::sink::{PrimaryColor, Sink, SinkCursor};

const IMAGE_TYPE_RGB: u8 = 2;
const IMAGE_TYPE_GREY: u8 = 3;
const IMAGE_TYPE_RLE_RGB: u8 = 10;
const IMAGE_TYPE_RLE_GREY: u8 = 11;

pub(crate) fn read_header(input: &mut BufferedInput, id_length: u8) -> GidResult<Descriptor> {
    let color_map_type = input.read_u8()?;
    if color_map_type != 0 {
        return Err(GidError::unsupported("TGA", "color-mapped images"));
    }
    let image_type = input.read_u8()?;
    if !matches!(
        image_type,
        IMAGE_TYPE_RGB | IMAGE_TYPE_GREY | IMAGE_TYPE_RLE_RGB | IMAGE_TYPE_RLE_GREY
    ) {
        return Err(GidError::unsupported(
            "TGA",
            format!("image type {image_type}"),
        ));
    }

    // Color map specification (5 bytes): ignored since color_map_type == 0.
    let _cmap_first_entry = input.read_u16_le()?;
    let _cmap_length = input.read_u16_le()?;
    let _cmap_entry_size = input.read_u8()?;

    let _x_origin = input.read_u16_le()?;
    let _y_origin = input.read_u16_le()?;
    let width = input.read_u16_le()?;
    let height = input.read_u16_le()?;
    if width == 0 || height == 0 {
        return Err(GidError::invalid_data("TGA width/height must be positive"));
    }
    let pixel_depth = input.read_u8()?;
    if !matches!(pixel_depth, 8 | 24 | 32) {
        return Err(GidError::unsupported(
            "TGA",
            format!("{pixel_depth}-bit pixel depth"),
        ));
    }
    let image_descriptor = input.read_u8()?;
    let top_first = (image_descriptor & 0x20) != 0;

    if id_length > 0 {
        input.skip(usize::from(id_length))?;
    }

    let rle = matches!(image_type, IMAGE_TYPE_RLE_RGB | IMAGE_TYPE_RLE_GREY);
    let grey = matches!(image_type, IMAGE_TYPE_GREY | IMAGE_TYPE_RLE_GREY);

    let mut d = Descriptor::new(Format::Tga, u32::from(width), u32::from(height), u32::from(pixel_depth));
    d.rle_encoded = rle;
    d.greyscale = grey;
    d.top_first = top_first;
    d.transparency = pixel_depth == 32;
    Ok(d)
}

fn read_pixel(input: &mut BufferedInput, d: &Descriptor) -> GidResult<(u8, u8, u8, u8)> {
    if d.greyscale {
        let v = input.read_u8()?;
        Ok((v, v, v, 255))
    } else if d.bits_per_pixel == 24 {
        let b = input.read_u8()?;
        let g = input.read_u8()?;
        let r = input.read_u8()?;
        Ok((r, g, b, 255))
    } else {
        let b = input.read_u8()?;
        let g = input.read_u8()?;
        let r = input.read_u8()?;
        let a = input.read_u8()?;
        Ok((r, g, b, a))
    }
}

pub(crate) fn decode<P: PrimaryColor>(
    d: &Descriptor,
    input: &mut BufferedInput,
    sink: &mut dyn Sink<P>,
) -> GidResult<f64> {
    let width = d.width;
    let height = d.height;
    let total = u64::from(width) * u64::from(height);

    // Decode into row-major (top-down) order internally, then emit honoring
    // `top_first` by choosing which logical row each decoded scanline maps
    // to: rows are emitted bottom-up unless top-first.
    let mut cursor = SinkCursor::new(sink, width, height);
    let mut emitted = 0u64;
    let mut x = 0u32;
    let mut row = 0u32;
    cursor.goto(0, row_for(row, height, d.top_first))?;

    while emitted < total {
        if d.rle_encoded {
            let packet_header = input.read_u8()?;
            let count = usize::from(packet_header & 0x7F) + 1;
            let is_run = (packet_header & 0x80) != 0;
            if is_run {
                let (r, g, b, a) = read_pixel(input, d)?;
                for _ in 0..count {
                    put_with_row_tracking(&mut cursor, &mut x, &mut row, width, height, d.top_first, r, g, b, a)?;
                    emitted += 1;
                    if emitted >= total {
                        break;
                    }
                }
            } else {
                for _ in 0..count {
                    let (r, g, b, a) = read_pixel(input, d)?;
                    put_with_row_tracking(&mut cursor, &mut x, &mut row, width, height, d.top_first, r, g, b, a)?;
                    emitted += 1;
                    if emitted >= total {
                        break;
                    }
                }
            }
        } else {
            let (r, g, b, a) = read_pixel(input, d)?;
            put_with_row_tracking(&mut cursor, &mut x, &mut row, width, height, d.top_first, r, g, b, a)?;
            emitted += 1;
        }
    }
    cursor.finish()?;
    Ok(0.0)
}

fn row_for(decode_row: u32, height: u32, top_first: bool) -> u32 {
    if top_first {
        decode_row
    } else {
        height - 1 - decode_row
    }
}

#[allow(clippy::too_many_arguments)]
fn put_with_row_tracking<P: PrimaryColor>(
    cursor: &mut SinkCursor<'_, P, dyn Sink<P>>,
    x: &mut u32,
    row: &mut u32,
    width: u32,
    height: u32,
    top_first: bool,
    r: u8,
    g: u8,
    b: u8,
    a: u8,
) -> GidResult<()> {
    if *x == 0 {
        cursor.goto(0, row_for(*row, height, top_first))?;
    }
    cursor.put(
        crate::color::scale_to_primary::<P>(u32::from(r), 255),
        crate::color::scale_to_primary::<P>(u32::from(g), 255),
        crate::color::scale_to_primary::<P>(u32::from(b), 255),
        crate::color::scale_to_primary::<P>(u32::from(a), 255),
    )?;
    *x += 1;
    if *x >= width {
        *x = 0;
        *row += 1;
    }
    Ok(())
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
    fn decodes_2x1_uncompressed_24bit_bottom_up() {
        let id_length = 0u8;
        let mut bytes = Vec::new();
        bytes.push(0); // color map type
        bytes.push(IMAGE_TYPE_RGB);
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes()); // width
        bytes.extend_from_slice(&1u16.to_le_bytes()); // height
        bytes.push(24);
        bytes.push(0); // descriptor: bottom-up
        bytes.extend_from_slice(&[0, 0, 255, 0, 255, 0]); // BGR red, BGR green

        let mut src = Slice(&bytes);
        let mut input = BufferedInput::new(&mut src);
        let d = read_header(&mut input, id_length).unwrap();
        assert_eq!((d.width, d.height), (2, 1));

        let mut sink = Collect(Vec::new());
        decode(&d, &mut input, &mut sink).unwrap();
        assert_eq!(sink.0, vec![(255, 0, 0, 255), (0, 255, 0, 255)]);
    }
}
