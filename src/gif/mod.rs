//! GIF header and body: Logical Screen Descriptor, Image Descriptor, and
//! Graphic Control/Application/Comment extensions. The LZW codec lives in
//! [`lzw`].

mod lzw;

use crate::color::{Palette, RgbEntry};
use crate::descriptor::{DecodeMode, Descriptor, Format};
use crate::error::{GidError, GidResult};
use crate::io::bitreader::LsbBitReader;
use crate::io::buffered::BufferedInput;
use crate::sink::{PrimaryColor, Sink, SinkCursor};

const EXT_INTRODUCER: u8 = 0x21;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;
const EXT_GRAPHIC_CONTROL: u8 = 0xF9;
const EXT_APPLICATION: u8 = 0xFF;

/// `first_byte` is `'G'`, already consumed by the dispatcher.
pub(crate) fn read_header(input: &mut BufferedInput) -> GidResult<Descriptor> {
    let mut rest = [0u8; 5];
    input.read_exact(&mut rest)?;
    let version = match &rest {
        b"IF87a" => "87a",
        b"IF89a" => "89a",
        _ => return Err(GidError::UnknownFormat),
    };

    let width = input.read_u16_le()?;
    let height = input.read_u16_le()?;
    if width == 0 || height == 0 {
        return Err(GidError::invalid_data("GIF width/height must be positive"));
    }
    let packed = input.read_u8()?;
    let gct_flag = (packed & 0x80) != 0;
    let gct_size_bits = packed & 0x07;
    let _color_resolution = (packed >> 4) & 0x07;
    let _background_color_index = input.read_u8()?;
    let _pixel_aspect_ratio = input.read_u8()?;

    let mut d = Descriptor::new(Format::Gif, u32::from(width), u32::from(height), u32::from(gct_size_bits) + 1);
    d.detailed_format = format!("GIF{version}");
    d.subformat_id = i32::from(gct_size_bits);

    if gct_flag {
        let count = 1usize << (gct_size_bits + 1);
        d.palette = Some(read_palette(input, count)?);
    }

    Ok(d)
}

fn read_palette(input: &mut BufferedInput, count: usize) -> GidResult<Palette> {
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let r = input.read_u8()?;
        let g = input.read_u8()?;
        let b = input.read_u8()?;
        entries.push(RgbEntry { r, g, b });
    }
    Ok(Palette::new(entries))
}

/// Reads a GIF length-prefixed sub-block sequence, concatenating every
/// block's payload, stopping at the zero-length terminator.
fn read_sub_blocks(input: &mut BufferedInput) -> GidResult<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let len = input.read_u8()?;
        if len == 0 {
            break;
        }
        let start = out.len();
        out.resize(start + len as usize, 0);
        input.read_exact(&mut out[start..])?;
    }
    Ok(out)
}

#[derive(Default)]
struct GraphicControl {
    disposal: u8,
    transparent_index: Option<u8>,
    delay_centiseconds: u16,
}

/// Pending frame-control state parsed from a Graphic Control Extension,
/// reset after being applied to the next Image Descriptor.
fn parse_graphic_control(input: &mut BufferedInput) -> GidResult<GraphicControl> {
    let block_size = input.read_u8()?;
    if block_size != 4 {
        return Err(GidError::invalid_data("GIF Graphic Control Extension block size must be 4"));
    }
    let packed = input.read_u8()?;
    let disposal = (packed >> 2) & 0x07;
    let transparent_flag = (packed & 0x01) != 0;
    let delay_centiseconds = input.read_u16_le()?;
    let transparent_color_index = input.read_u8()?;
    let terminator = input.read_u8()?;
    if terminator != 0 {
        return Err(GidError::invalid_data("GIF Graphic Control Extension missing terminator"));
    }
    Ok(GraphicControl {
        disposal,
        transparent_index: if transparent_flag {
            Some(transparent_color_index)
        } else {
            None
        },
        delay_centiseconds,
    })
}

fn parse_application_extension(input: &mut BufferedInput, d: &mut Descriptor) -> GidResult<()> {
    let first_len = input.read_u8()?;
    if first_len != 11 {
        // Not a well-formed application block; skip remaining sub-blocks.
        if first_len > 0 {
            input.skip(first_len as usize)?;
            let _ = read_sub_blocks(input)?;
        }
        return Ok(());
    }
    let mut header = [0u8; 11];
    input.read_exact(&mut header)?;
    let is_netscape = &header[0..8] == b"NETSCAPE" && &header[8..11] == b"2.0";

    let data = read_sub_blocks(input)?;
    if is_netscape && data.len() >= 3 && data[0] == 0x01 {
        let loop_count = u16::from(data[1]) | (u16::from(data[2]) << 8);
        d.gif_loop_count = Some(loop_count);
    }
    Ok(())
}

/// Decodes a single GIF frame (or detects the trailer), returning the next
/// frame's delay in seconds (`0.0` if there are no more frames).
pub(crate) fn decode<P: PrimaryColor>(
    d: &mut Descriptor,
    input: &mut BufferedInput,
    sink: &mut dyn Sink<P>,
    mode: DecodeMode,
) -> GidResult<f64> {
    let mut pending_gce = GraphicControl::default();

    loop {
        let introducer = input.read_u8()?;
        d.logger.trace(&format!("gid: GIF block introducer 0x{introducer:02X}"));
        match introducer {
            TRAILER => {
                d.next_frame = 0.0;
                return Ok(0.0);
            }
            EXT_INTRODUCER => {
                let label = input.read_u8()?;
                match label {
                    EXT_GRAPHIC_CONTROL => {
                        pending_gce = parse_graphic_control(input)?;
                    }
                    EXT_APPLICATION => {
                        parse_application_extension(input, d)?;
                    }
                    _ => {
                        let _ = read_sub_blocks(input)?;
                    }
                }
            }
            IMAGE_SEPARATOR => {
                let delay = decode_image(d, input, sink, mode, &pending_gce)?;
                d.next_frame = delay;
                return Ok(delay);
            }
            other => {
                return Err(GidError::invalid_data(format!(
                    "unexpected GIF block introducer 0x{other:02X}"
                )));
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_image<P: PrimaryColor>(
    d: &mut Descriptor,
    input: &mut BufferedInput,
    sink: &mut dyn Sink<P>,
    mode: DecodeMode,
    gce: &GraphicControl,
) -> GidResult<f64> {
    let left = input.read_u16_le()?;
    let top = input.read_u16_le()?;
    let frame_width = input.read_u16_le()?;
    let frame_height = input.read_u16_le()?;
    let packed = input.read_u8()?;
    let local_flag = (packed & 0x80) != 0;
    let interlace_flag = (packed & 0x40) != 0;
    let local_size_bits = packed & 0x07;

    d.interlaced = interlace_flag;

    let active_palette = if local_flag {
        read_palette(input, 1usize << (local_size_bits + 1))?
    } else {
        d.palette
            .clone()
            .ok_or_else(|| GidError::invalid_data("GIF frame has no color table"))?
    };

    let min_code_size = input.read_u8()?;
    let compressed = read_sub_blocks(input)?;
    let mut cursor = std::io::Cursor::new(compressed);
    let mut sub_input = BufferedInput::new(&mut cursor);
    let mut reader = LsbBitReader::new(&mut sub_input);
    let indices = lzw::decode(&mut reader, min_code_size)?;

    let expected = frame_width as usize * frame_height as usize;
    if indices.len() < expected {
        return Err(GidError::invalid_data("GIF LZW output shorter than frame dimensions"));
    }

    let ordered = if interlace_flag {
        deinterlace(&indices, frame_width as u32, frame_height as u32, mode)
    } else {
        indices
    };

    let canvas = d
        .gif_canvas
        .get_or_insert_with(|| vec![(0, 0, 0, 0); d.width as usize * d.height as usize]);

    for row in 0..frame_height as u32 {
        let canvas_y = top as u32 + row;
        if canvas_y >= d.height {
            continue;
        }
        for col in 0..frame_width as u32 {
            let canvas_x = left as u32 + col;
            if canvas_x >= d.width {
                continue;
            }
            let index = ordered[(row * frame_width as u32 + col) as usize] as usize;
            let is_transparent = gce.transparent_index == Some(index as u8);
            let (r, g, b, a) = if is_transparent {
                (0, 0, 0, 0)
            } else {
                active_palette
                    .get(index)
                    .ok_or_else(|| GidError::invalid_data(format!("GIF palette index {index} out of range")))?
            };
            canvas[(canvas_y * d.width + canvas_x) as usize] = (r, g, b, a);
        }
    }

    let mut out_cursor = SinkCursor::new(sink, d.width, d.height);
    for y in 0..d.height {
        out_cursor.goto(0, y)?;
        for x in 0..d.width {
            let (r, g, b, a) = canvas[(y * d.width + x) as usize];
            out_cursor.put(
                crate::color::scale_to_primary::<P>(u32::from(r), 255),
                crate::color::scale_to_primary::<P>(u32::from(g), 255),
                crate::color::scale_to_primary::<P>(u32::from(b), 255),
                crate::color::scale_to_primary::<P>(u32::from(a), 255),
            )?;
        }
    }
    out_cursor.finish()?;

    // Disposal: "restore to background" (2) and "restore to previous" (3)
    // are both approximated by clearing the frame's rectangle to fully
    // transparent for whatever composites next, since this crate has no
    // separate "previous canvas" snapshot to restore from.
    if gce.disposal == 2 || gce.disposal == 3 {
        for row in 0..frame_height as u32 {
            let canvas_y = top as u32 + row;
            if canvas_y >= d.height {
                continue;
            }
            for col in 0..frame_width as u32 {
                let canvas_x = left as u32 + col;
                if canvas_x >= d.width {
                    continue;
                }
                canvas[(canvas_y * d.width + canvas_x) as usize] = (0, 0, 0, 0);
            }
        }
    }

    Ok(f64::from(gce.delay_centiseconds) / 100.0)
}

/// GIF's 4-pass interlacing: passes at y-offsets
/// `{0, 4, 2, 1}` with strides `{8, 8, 4, 2}`. In `fast` mode each decoded
/// row lands only at its final y; in `nice` mode it is also replicated
/// across the rows it provisionally covers, producing progressive
/// refinement.
fn deinterlace(indices: &[u8], width: u32, height: u32, mode: DecodeMode) -> Vec<u8> {
    const PASSES: [(u32, u32); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];
    let mut out = vec![0u8; width as usize * height as usize];
    let mut src_row = 0usize;

    for &(offset, stride) in PASSES.iter() {
        let mut y = offset;
        while y < height {
            let row_start = src_row * width as usize;
            if row_start + width as usize > indices.len() {
                return out;
            }
            let row = &indices[row_start..row_start + width as usize];
            copy_row(&mut out, row, y, width);

            if mode == DecodeMode::Nice {
                // Paint this row across the gap down to the next row this
                // same pass will cover (or, on the last pass, to the end).
                let next_y_this_pass = y + stride;
                let fill_until = next_y_this_pass.min(height);
                let mut gap_y = y + 1;
                while gap_y < fill_until {
                    copy_row(&mut out, row, gap_y, width);
                    gap_y += 1;
                }
            }

            src_row += 1;
            y += stride;
        }
    }

    out
}

fn copy_row(out: &mut [u8], row: &[u8], y: u32, width: u32) {
    let start = y as usize * width as usize;
    out[start..start + width as usize].copy_from_slice(row);
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
    fn decodes_1x1_white_gif() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"GIF89a");
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.push(0x80); // GCT flag, size bits 0 -> 2 entries
        bytes.push(0);
        bytes.push(0);
        bytes.extend_from_slice(&[0xFF, 0xFF, 0xFF]); // index 0: white
        bytes.extend_from_slice(&[0x00, 0x00, 0x00]); // index 1: black
        bytes.push(IMAGE_SEPARATOR);
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.push(0x00); // no local table, no interlace
        bytes.push(2); // min code size
        // LZW stream encoding a single index-0 pixel: CLEAR(4), 0, END(5)
        // at code width 3, packed LSB-first into 9 bits -> [0x44, 0x01].
        bytes.push(2);
        bytes.extend_from_slice(&[0x44, 0x01]);
        bytes.push(0); // terminator
        bytes.push(TRAILER);

        let mut src = Slice(&bytes[1..]); // 'G' already consumed
        let mut input = BufferedInput::new(&mut src);
        let mut d = read_header(&mut input).unwrap();
        assert_eq!((d.width, d.height), (1, 1));

        let mut sink = Collect(Vec::new());
        let delay = decode(&mut d, &mut input, &mut sink, DecodeMode::Fast).unwrap();
        assert_eq!(delay, 0.0);
        assert_eq!(sink.0, vec![(0xFF, 0xFF, 0xFF, 255)]);
    }
}
