//! JPEG marker-driven header and body: baseline (`SOF0`) and progressive
//! (`SOF2`) decode, restart markers, upsampling, and color conversion.
//!
//! Marker/segment layout (DQT precision nibble, SOF component table, SOS
//! selector bytes) drives the marker walk directly; the byte-stuffing and
//! marker-detection split between this module and
//! [`crate::io::bitreader::MsbBitReader`] keeps entropy-stream bit twiddling
//! out of the segment walk.

mod huffman;
mod idct;

use crate::color::{cmyk_to_rgb, ycbcr_to_rgb};
use crate::descriptor::{Descriptor, Format, JpegColorSpace, JpegComponent, JpegState, QuantTable};
use crate::error::{GidError, GidResult};
use crate::io::bitreader::MsbBitReader;
use crate::io::buffered::BufferedInput;
use crate::sink::{PrimaryColor, Sink, SinkCursor};
use huffman::HuffmanTable;

const SOF0: u8 = 0xC0;
const SOF2: u8 = 0xC2;
const DHT: u8 = 0xC4;
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const DRI: u8 = 0xDD;

fn read_marker(input: &mut BufferedInput) -> GidResult<u8> {
    loop {
        let b = input.read_u8()?;
        if b != 0xFF {
            return Err(GidError::invalid_data("expected JPEG marker"));
        }
        let m = input.read_u8()?;
        if m != 0x00 && m != 0xFF {
            return Ok(m);
        }
        // 0xFF fill bytes before a real marker are legal; 0xFF 0x00 can't
        // occur outside entropy-coded data, but tolerate it defensively.
    }
}

fn read_segment(input: &mut BufferedInput) -> GidResult<Vec<u8>> {
    let len = input.read_u16_be()?;
    if len < 2 {
        return Err(GidError::invalid_data("JPEG segment length must be >= 2"));
    }
    let mut data = vec![0u8; len as usize - 2];
    input.read_exact(&mut data)?;
    Ok(data)
}

fn parse_dqt(data: &[u8], tables: &mut [Option<QuantTable>; 4]) -> GidResult<()> {
    let mut pos = 0usize;
    while pos < data.len() {
        let pq_tq = data[pos];
        let precision = pq_tq >> 4;
        let id = (pq_tq & 0x0F) as usize;
        if id >= 4 {
            return Err(GidError::invalid_data("JPEG DQT table id out of range"));
        }
        pos += 1;
        let mut table: QuantTable = [0u16; 64];
        for slot in table.iter_mut() {
            if precision == 0 {
                *slot = u16::from(*data.get(pos).ok_or(GidError::UnexpectedEof)?);
                pos += 1;
            } else {
                let hi = *data.get(pos).ok_or(GidError::UnexpectedEof)?;
                let lo = *data.get(pos + 1).ok_or(GidError::UnexpectedEof)?;
                *slot = u16::from_be_bytes([hi, lo]);
                pos += 2;
            }
        }
        tables[id] = Some(table);
    }
    Ok(())
}

fn parse_sof(data: &[u8], progressive: bool) -> GidResult<(u32, u32, JpegState)> {
    if data.len() < 6 {
        return Err(GidError::invalid_data("truncated JPEG SOF segment"));
    }
    let precision = data[0];
    if precision != 8 {
        return Err(GidError::unsupported("JPEG", format!("{precision}-bit sample precision")));
    }
    let height = u32::from(u16::from_be_bytes([data[1], data[2]]));
    let width = u32::from(u16::from_be_bytes([data[3], data[4]]));
    if width == 0 || height == 0 {
        return Err(GidError::invalid_data("JPEG width/height must be positive"));
    }
    let num_components = data[5] as usize;
    if data.len() != 6 + num_components * 3 {
        return Err(GidError::invalid_data("JPEG SOF component count doesn't match segment length"));
    }

    let mut components = Vec::with_capacity(num_components);
    let mut max_h = 0u8;
    let mut max_v = 0u8;
    for i in 0..num_components {
        let base = 6 + i * 3;
        let id = data[base];
        let sampling = data[base + 1];
        let h_sampling = sampling >> 4;
        let v_sampling = sampling & 0x0F;
        if h_sampling == 0 || v_sampling == 0 {
            return Err(GidError::invalid_data("JPEG component sampling factor must be >= 1"));
        }
        let quant_table_index = data[base + 2];
        max_h = max_h.max(h_sampling);
        max_v = max_v.max(v_sampling);
        components.push(JpegComponent {
            id,
            h_sampling,
            v_sampling,
            quant_table_index,
        });
    }

    let color_space = match num_components {
        1 => JpegColorSpace::YGrey,
        3 => JpegColorSpace::YCbCr,
        4 => JpegColorSpace::Cmyk,
        other => {
            return Err(GidError::unsupported("JPEG", format!("{other}-component frame")))
        }
    };

    let state = JpegState {
        quant_tables: [None; 4],
        components,
        restart_interval: 0,
        max_h_sampling: max_h,
        max_v_sampling: max_v,
        color_space: Some(color_space),
        progressive,
    };
    Ok((width, height, state))
}

/// `first_byte` is `0xFF`, `second_byte` (`0xD8`, confirming SOI) already
/// consumed by the dispatcher.
pub(crate) fn read_header(input: &mut BufferedInput) -> GidResult<Descriptor> {
    let mut quant_tables: [Option<QuantTable>; 4] = [None; 4];

    loop {
        let marker = read_marker(input)?;
        match marker {
            SOF0 | SOF2 => {
                let data = read_segment(input)?;
                let (width, height, mut state) = parse_sof(&data, marker == SOF2)?;
                state.quant_tables = quant_tables;
                let bits_per_pixel = 8 * state.components.len() as u32;
                let mut d = Descriptor::new(Format::Jpeg, width, height, bits_per_pixel);
                d.greyscale = state.components.len() == 1;
                d.interlaced = state.progressive;
                d.detailed_format = format!(
                    "JPEG, {}, {} components",
                    if state.progressive { "progressive" } else { "baseline" },
                    state.components.len()
                );
                d.jpeg_state = Some(state);
                return Ok(d);
            }
            DQT => {
                let data = read_segment(input)?;
                parse_dqt(&data, &mut quant_tables)?;
            }
            EOI => return Err(GidError::invalid_data("JPEG reached EOI before any SOF")),
            SOI => return Err(GidError::invalid_data("unexpected duplicate JPEG SOI")),
            _ => {
                // APPn, COM, DHT-before-SOF (unusual but legal), etc: skip.
                let _ = read_segment(input)?;
            }
        }
    }
}

struct ScanComponent {
    index: usize,
    dc_table: u8,
    ac_table: u8,
}

fn read_sos_header(
    data: &[u8],
    components: &[JpegComponent],
) -> GidResult<(Vec<ScanComponent>, u8, u8, u8, u8)> {
    if data.is_empty() {
        return Err(GidError::invalid_data("truncated JPEG SOS segment"));
    }
    let n = data[0] as usize;
    if data.len() != 1 + n * 2 + 3 {
        return Err(GidError::invalid_data("JPEG SOS segment length doesn't match component count"));
    }
    let mut scan_components = Vec::with_capacity(n);
    for i in 0..n {
        let id = data[1 + i * 2];
        let selectors = data[1 + i * 2 + 1];
        let index = components
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| GidError::invalid_data("JPEG SOS references unknown component id"))?;
        scan_components.push(ScanComponent {
            index,
            dc_table: selectors >> 4,
            ac_table: selectors & 0x0F,
        });
    }
    let tail = 1 + n * 2;
    let ss = data[tail];
    let se = data[tail + 1];
    let ah_al = data[tail + 2];
    Ok((scan_components, ss, se, ah_al >> 4, ah_al & 0x0F))
}

/// Per-component decode state: coefficient plane (zigzag order per block)
/// sized to whole MCUs, plus the block-grid geometry needed to iterate both
/// interleaved and non-interleaved scans.
struct ComponentPlanes {
    coeffs: Vec<[i32; 64]>,
    mcu_blocks_wide: usize,
    mcu_blocks_high: usize,
    /// Non-interleaved scans iterate only the blocks that actually cover
    /// real samples, not the MCU padding.
    real_blocks_wide: usize,
    real_blocks_high: usize,
}

fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

fn build_planes(d: &Descriptor, state: &JpegState) -> Vec<ComponentPlanes> {
    let mcus_per_line = div_ceil(d.width, 8 * u32::from(state.max_h_sampling));
    let mcus_per_col = div_ceil(d.height, 8 * u32::from(state.max_v_sampling));

    state
        .components
        .iter()
        .map(|c| {
            let mcu_blocks_wide = mcus_per_line as usize * c.h_sampling as usize;
            let mcu_blocks_high = mcus_per_col as usize * c.v_sampling as usize;
            let component_width =
                div_ceil(d.width * u32::from(c.h_sampling), u32::from(state.max_h_sampling));
            let component_height =
                div_ceil(d.height * u32::from(c.v_sampling), u32::from(state.max_v_sampling));
            let real_blocks_wide = div_ceil(component_width, 8) as usize;
            let real_blocks_high = div_ceil(component_height, 8) as usize;
            ComponentPlanes {
                coeffs: vec![[0i32; 64]; mcu_blocks_wide * mcu_blocks_high],
                mcu_blocks_wide,
                mcu_blocks_high,
                real_blocks_wide,
                real_blocks_high,
            }
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn decode_baseline_block(
    reader: &mut MsbBitReader,
    dc_table: &HuffmanTable,
    ac_table: &HuffmanTable,
    dc_pred: &mut i32,
) -> GidResult<[i32; 64]> {
    let mut block = [0i32; 64];
    let (_, diff) = huffman::decode_magnitude(reader, dc_table)?;
    *dc_pred += diff;
    block[0] = *dc_pred;

    let mut k = 1usize;
    while k < 64 {
        let rs = ac_table.decode(reader)?;
        let run = rs >> 4;
        let size = rs & 0x0F;
        if size == 0 {
            if run == 15 {
                k += 16; // ZRL
                continue;
            }
            break; // EOB
        }
        k += run as usize;
        if k >= 64 {
            return Err(GidError::invalid_data("JPEG AC run overruns block"));
        }
        let raw = reader.read_bits(u32::from(size))?;
        block[k] = huffman::extend(raw, size);
        k += 1;
    }
    Ok(block)
}

fn decode_progressive_dc_first(
    reader: &mut MsbBitReader,
    dc_table: &HuffmanTable,
    dc_pred: &mut i32,
    al: u8,
) -> GidResult<i32> {
    let (_, diff) = huffman::decode_magnitude(reader, dc_table)?;
    *dc_pred += diff;
    Ok(*dc_pred << al)
}

fn decode_progressive_dc_refine(reader: &mut MsbBitReader, al: u8) -> GidResult<i32> {
    Ok(i32::from(reader.read_bits(1)? as i16) << al)
}

/// Decodes one non-interleaved progressive AC first scan's worth of bands
/// for a single block, honoring a running end-of-band run shared across the
/// whole scan.
fn decode_progressive_ac_first(
    reader: &mut MsbBitReader,
    ac_table: &HuffmanTable,
    block: &mut [i32; 64],
    ss: u8,
    se: u8,
    al: u8,
    eobrun: &mut u32,
) -> GidResult<()> {
    if *eobrun > 0 {
        *eobrun -= 1;
        return Ok(());
    }
    let mut k = ss as usize;
    while k <= se as usize {
        let rs = ac_table.decode(reader)?;
        let run = rs >> 4;
        let size = rs & 0x0F;
        if size == 0 {
            if run == 15 {
                k += 16;
                continue;
            }
            let mut run_len: u32 = 1u32 << run;
            if run > 0 {
                run_len += reader.read_bits(u32::from(run))?;
            }
            *eobrun = run_len - 1;
            break;
        }
        k += run as usize;
        if k > se as usize {
            return Err(GidError::invalid_data("JPEG progressive AC run overruns band"));
        }
        let raw = reader.read_bits(u32::from(size))?;
        block[k] = huffman::extend(raw, size) << al;
        k += 1;
    }
    Ok(())
}

/// Decodes one non-interleaved progressive AC refinement scan's band for a
/// single block, per the standard `Ah, Al` successive-approximation
/// correction algorithm.
fn decode_progressive_ac_refine(
    reader: &mut MsbBitReader,
    ac_table: &HuffmanTable,
    block: &mut [i32; 64],
    ss: u8,
    se: u8,
    al: u8,
    eobrun: &mut u32,
) -> GidResult<()> {
    let p1 = 1i32 << al;
    let m1 = -1i32 << al;
    let mut k = ss as usize;

    if *eobrun == 0 {
        while k <= se as usize {
            let rs = ac_table.decode(reader)?;
            let mut run = (rs >> 4) as i32;
            let size = rs & 0x0F;
            let mut value = 0i32;
            if size == 0 {
                if run != 15 {
                    let mut run_len: u32 = 1u32 << run;
                    if run > 0 {
                        run_len += reader.read_bits(u32::from(run as u8))?;
                    }
                    *eobrun = run_len;
                    break;
                }
                // run == 15: ZRL, skip 16 zero-history coefficients while
                // still applying correction bits to any already-nonzero
                // coefficients encountered along the way.
            } else {
                value = if reader.read_bits(1)? == 1 { p1 } else { m1 };
            }

            while k <= se as usize {
                if block[k] != 0 {
                    if reader.read_bits(1)? == 1 && (block[k] & p1) == 0 {
                        block[k] += if block[k] > 0 { p1 } else { m1 };
                    }
                } else {
                    if run == 0 {
                        if value != 0 {
                            block[k] = value;
                        }
                        k += 1;
                        break;
                    }
                    run -= 1;
                }
                k += 1;
            }
        }
    }

    if *eobrun > 0 {
        while k <= se as usize {
            if block[k] != 0 && reader.read_bits(1)? == 1 && (block[k] & p1) == 0 {
                block[k] += if block[k] > 0 { p1 } else { m1 };
            }
            k += 1;
        }
        *eobrun -= 1;
    }
    Ok(())
}

pub(crate) fn decode<P: PrimaryColor>(
    d: &Descriptor,
    input: &mut BufferedInput,
    sink: &mut dyn Sink<P>,
) -> GidResult<f64> {
    let mut state = d
        .jpeg_state
        .clone()
        .ok_or(GidError::InternalInvariantViolated("JPEG decode called without a parsed SOF"))?;
    let mut planes = build_planes(d, &state);
    let mut dc_tables: [Option<HuffmanTable>; 4] = Default::default();
    let mut ac_tables: [Option<HuffmanTable>; 4] = Default::default();

    loop {
        let marker = read_marker(input)?;
        d.logger.trace(&format!("gid: JPEG marker 0xFF{marker:02X}"));
        match marker {
            DHT => {
                let data = read_segment(input)?;
                for (class, id, table) in huffman::parse_dht(&data)? {
                    let slot = if class == 0 { &mut dc_tables } else { &mut ac_tables };
                    *slot.get_mut(id as usize).ok_or(GidError::invalid_data("JPEG DHT table id out of range"))? =
                        Some(table);
                }
            }
            DQT => {
                let data = read_segment(input)?;
                parse_dqt(&data, &mut state.quant_tables)?;
            }
            DRI => {
                let data = read_segment(input)?;
                if data.len() != 2 {
                    return Err(GidError::invalid_data("truncated JPEG DRI segment"));
                }
                state.restart_interval = u16::from_be_bytes([data[0], data[1]]);
            }
            SOS => {
                let data = read_segment(input)?;
                let (scan_components, ss, se, ah, al) = read_sos_header(&data, &state.components)?;
                decode_scan(
                    input,
                    &state,
                    &mut planes,
                    &dc_tables,
                    &ac_tables,
                    &scan_components,
                    ss,
                    se,
                    ah,
                    al,
                )?;
            }
            EOI => break,
            _ => {
                let _ = read_segment(input)?;
            }
        }
    }

    render(d, &state, &planes, sink)?;
    Ok(0.0)
}

#[allow(clippy::too_many_arguments)]
fn decode_scan(
    input: &mut BufferedInput,
    state: &JpegState,
    planes: &mut [ComponentPlanes],
    dc_tables: &[Option<HuffmanTable>; 4],
    ac_tables: &[Option<HuffmanTable>; 4],
    scan_components: &[ScanComponent],
    ss: u8,
    se: u8,
    ah: u8,
    al: u8,
)  -> GidResult<()> {
    let mut dc_pred = vec![0i32; state.components.len()];
    let mut eobrun = 0u32;
    let interleaved = scan_components.len() > 1;

    let is_dc_scan = ss == 0;
    let mut reader = MsbBitReader::new(input);

    let restart_interval = state.restart_interval as usize;
    let mut mcus_since_restart = 0usize;

    let reset_for_restart =
        |reader: &mut MsbBitReader, dc_pred: &mut [i32], eobrun: &mut u32| -> GidResult<()> {
            let marker = reader.read_restart_marker()?;
            if !(RST0..=RST7).contains(&marker) {
                return Err(GidError::invalid_data("expected JPEG RSTn marker"));
            }
            for p in dc_pred.iter_mut() {
                *p = 0;
            }
            *eobrun = 0;
            Ok(())
        };

    if interleaved {
        let mcus_wide = div_ceil(
            planes[scan_components[0].index].mcu_blocks_wide as u32,
            state.components[scan_components[0].index].h_sampling as u32,
        ) as usize;
        let mcus_high = div_ceil(
            planes[scan_components[0].index].mcu_blocks_high as u32,
            state.components[scan_components[0].index].v_sampling as u32,
        ) as usize;

        for my in 0..mcus_high {
            for mx in 0..mcus_wide {
                for sc in scan_components {
                    let comp = &state.components[sc.index];
                    for by in 0..comp.v_sampling as usize {
                        for bx in 0..comp.h_sampling as usize {
                            let block_x = mx * comp.h_sampling as usize + bx;
                            let block_y = my * comp.v_sampling as usize + by;
                            decode_one_block(
                                &mut reader,
                                dc_tables,
                                ac_tables,
                                sc,
                                &mut planes[sc.index],
                                block_x,
                                block_y,
                                is_dc_scan,
                                ss,
                                se,
                                ah,
                                al,
                                &mut dc_pred[sc.index],
                                &mut eobrun,
                            )?;
                        }
                    }
                }
                mcus_since_restart += 1;
                if restart_interval > 0
                    && mcus_since_restart == restart_interval
                    && !(my == mcus_high - 1 && mx == mcus_wide - 1)
                {
                    reset_for_restart(&mut reader, &mut dc_pred, &mut eobrun)?;
                    mcus_since_restart = 0;
                }
            }
        }
    } else {
        let sc = &scan_components[0];
        let plane = &mut planes[sc.index];
        let width = plane.real_blocks_wide;
        let height = plane.real_blocks_high;
        for by in 0..height {
            for bx in 0..width {
                decode_one_block(
                    &mut reader,
                    dc_tables,
                    ac_tables,
                    sc,
                    plane,
                    bx,
                    by,
                    is_dc_scan,
                    ss,
                    se,
                    ah,
                    al,
                    &mut dc_pred[sc.index],
                    &mut eobrun,
                )?;
                mcus_since_restart += 1;
                let last = by == height - 1 && bx == width - 1;
                if restart_interval > 0 && mcus_since_restart == restart_interval && !last {
                    reset_for_restart(&mut reader, &mut dc_pred, &mut eobrun)?;
                    mcus_since_restart = 0;
                }
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn decode_one_block(
    reader: &mut MsbBitReader,
    dc_tables: &[Option<HuffmanTable>; 4],
    ac_tables: &[Option<HuffmanTable>; 4],
    sc: &ScanComponent,
    plane: &mut ComponentPlanes,
    block_x: usize,
    block_y: usize,
    is_dc_scan: bool,
    ss: u8,
    se: u8,
    ah: u8,
    al: u8,
    dc_pred: &mut i32,
    eobrun: &mut u32,
) -> GidResult<()> {
    if block_x >= plane.mcu_blocks_wide || block_y >= plane.mcu_blocks_high {
        return Err(GidError::invalid_data("JPEG block index out of range"));
    }
    let block_index = block_y * plane.mcu_blocks_wide + block_x;

    if ss == 0 && se == 63 {
        // Baseline: a single scan covers DC and all 63 AC coefficients of
        // the block back to back, Huffman-decoded from the same table pair.
        let dc_table = dc_tables[sc.dc_table as usize]
            .as_ref()
            .ok_or(GidError::invalid_data("JPEG scan references undefined DC Huffman table"))?;
        let ac_table = ac_tables[sc.ac_table as usize]
            .as_ref()
            .ok_or(GidError::invalid_data("JPEG scan references undefined AC Huffman table"))?;
        plane.coeffs[block_index] = decode_baseline_block(reader, dc_table, ac_table, dc_pred)?;
        return Ok(());
    }

    if is_dc_scan {
        if ah == 0 {
            let dc_table = dc_tables[sc.dc_table as usize]
                .as_ref()
                .ok_or(GidError::invalid_data("JPEG scan references undefined DC Huffman table"))?;
            plane.coeffs[block_index][0] = decode_progressive_dc_first(
                reader,
                dc_table,
                dc_pred,
                al,
            )?;
        } else {
            plane.coeffs[block_index][0] |= decode_progressive_dc_refine(reader, al)?;
        }
    } else {
        let ac_table = ac_tables[sc.ac_table as usize]
            .as_ref()
            .ok_or(GidError::invalid_data("JPEG scan references undefined AC Huffman table"))?;
        if ah == 0 {
            decode_progressive_ac_first(
                reader,
                ac_table,
                &mut plane.coeffs[block_index],
                ss,
                se,
                al,
                eobrun,
            )?;
        } else {
            decode_progressive_ac_refine(
                reader,
                ac_table,
                &mut plane.coeffs[block_index],
                ss,
                se,
                al,
                eobrun,
            )?;
        }
    }
    Ok(())
}

fn render<P: PrimaryColor>(
    d: &Descriptor,
    state: &JpegState,
    planes: &[ComponentPlanes],
    sink: &mut dyn Sink<P>,
) -> GidResult<()> {
    // Baseline (non-progressive, single scan) frames route DC+AC through the
    // same `decode_progressive_dc_first`/`decode_progressive_ac_first` path
    // with `Al = 0`, which is numerically identical to the textbook baseline
    // algorithm (sequential Huffman decode of DC diff then 63 AC run/size
    // pairs) since a single full-spectrum scan is just the degenerate case
    // of progressive with one band covering 0..=63.
    let mut samples: Vec<Vec<u8>> = Vec::with_capacity(state.components.len());
    for (ci, comp) in state.components.iter().enumerate() {
        let quant = state.quant_tables[comp.quant_table_index as usize]
            .ok_or(GidError::invalid_data("JPEG component references undefined quant table"))?;
        let plane = &planes[ci];
        let mut out = vec![0u8; plane.mcu_blocks_wide * 8 * plane.mcu_blocks_high * 8];
        let stride = plane.mcu_blocks_wide * 8;
        for by in 0..plane.mcu_blocks_high {
            for bx in 0..plane.mcu_blocks_wide {
                let coeffs = &plane.coeffs[by * plane.mcu_blocks_wide + bx];
                let natural = idct::dequantize_zigzag(coeffs, &quant);
                let block = idct::idct_block(&natural);
                for y in 0..8 {
                    for x in 0..8 {
                        out[(by * 8 + y) * stride + bx * 8 + x] = block[y * 8 + x];
                    }
                }
            }
        }
        samples.push(out);
    }

    let mut cursor = SinkCursor::new(sink, d.width, d.height);
    for y in 0..d.height {
        cursor.goto(0, y)?;
        for x in 0..d.width {
            let fetch = |ci: usize| -> u8 {
                let comp = &state.components[ci];
                let stride = planes[ci].mcu_blocks_wide * 8;
                let sx = x * u32::from(comp.h_sampling) / u32::from(state.max_h_sampling);
                let sy = y * u32::from(comp.v_sampling) / u32::from(state.max_v_sampling);
                samples[ci][sy as usize * stride + sx as usize]
            };

            let (r, g, b) = match state.color_space {
                Some(JpegColorSpace::YGrey) => {
                    let v = fetch(0);
                    (v, v, v)
                }
                Some(JpegColorSpace::YCbCr) => ycbcr_to_rgb(fetch(0), fetch(1), fetch(2)),
                Some(JpegColorSpace::Cmyk) => cmyk_to_rgb(fetch(0), fetch(1), fetch(2), fetch(3)),
                None => return Err(GidError::InternalInvariantViolated("JPEG color space unset")),
            };
            cursor.put(
                crate::color::scale_to_primary::<P>(u32::from(r), 255),
                crate::color::scale_to_primary::<P>(u32::from(g), 255),
                crate::color::scale_to_primary::<P>(u32::from(b), 255),
                P::from_u32(P::max_value()),
            )?;
        }
    }
    cursor.finish()
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

    fn segment(marker: u8, data: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, marker];
        out.extend_from_slice(&((data.len() as u16) + 2).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn decodes_grey_1x1_dc_only_block() {
        // Shortest legal baseline grey JPEG: one 8x8 block whose DC
        // Huffman-decodes to a value giving sample 128 everywhere.
        //
        // DQT: table 0, 8-bit precision, all quant entries 1 (so DC
        // coefficient value is used directly as natural[0]).
        let mut dqt = vec![0x00u8];
        dqt.extend(std::iter::repeat(1u8).take(64));

        // SOF0: 8-bit precision, 1x1 image, 1 component (grey), sampling
        // 1x1, quant table 0.
        let sof = [8, 0x00, 0x01, 0x00, 0x01, 1, 1, 0x11, 0];

        // DHT DC table 0: a single code of length 2 for symbol `size=0`
        // (meaning "DC diff = 0", leaving the predictor, and thus the DC
        // coefficient, at its initial value of 0 -> natural[0] = 0 -> IDCT
        // output 128 everywhere, per the `dc_only_block_is_flat_grey` unit
        // test in `idct.rs`).
        let mut dht_dc = vec![0x00u8];
        dht_dc.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        dht_dc.push(0); // value: size category 0

        // DHT AC table 0: a single code of length 2 for symbol 0x00 (EOB),
        // so the block has no AC energy.
        let mut dht_ac = vec![0x10u8];
        dht_ac.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        dht_ac.push(0x00);

        // SOS: 1 component (id 1), DC table 0 / AC table 0, Ss=0 Se=63 Ah=0 Al=0.
        let sos = [1, 1, 0x00, 0, 63, 0x00];

        let mut bytes = Vec::new();
        bytes.extend(segment(DQT, &dqt));
        bytes.extend(segment(SOF0, &sof));
        bytes.extend(segment(DHT, &dht_dc));
        bytes.extend(segment(DHT, &dht_ac));
        bytes.extend(segment(SOS, &sos));
        // Entropy-coded data: DC code `00` (2 bits) then AC EOB code `00`
        // (2 bits), padded with 1-bits to fill the byte, then EOI.
        bytes.push(0b0000_1111);
        bytes.extend_from_slice(&[0xFF, EOI]);

        let mut src = Slice(&bytes);
        let mut input = BufferedInput::new(&mut src);
        let d = read_header(&mut input).unwrap();
        assert_eq!((d.width, d.height), (1, 1));

        let mut sink = Collect(Vec::new());
        let delay = decode(&d, &mut input, &mut sink).unwrap();
        assert_eq!(delay, 0.0);
        assert_eq!(sink.0, vec![(128, 128, 128, 255)]);
    }

    #[test]
    fn decodes_grey_block_with_one_ac_coefficient() {
        // Same shape as `decodes_grey_1x1_dc_only_block`, but the AC table
        // carries a real coefficient (zigzag index 1) instead of an
        // immediate EOB, so the output block must not come out flat. A
        // baseline single-scan decoder that only reads the DC coefficient
        // (leaving every AC coefficient at its zeroed default) would still
        // produce a uniform grey block here, same as the DC-only case.
        let mut dqt = vec![0x00u8];
        dqt.extend(std::iter::repeat(1u8).take(64));
        let sof = [8, 0x00, 0x01, 0x00, 0x01, 1, 1, 0x11, 0];

        // DHT DC table 0: single length-2 code for symbol `size=0`.
        let mut dht_dc = vec![0x00u8];
        dht_dc.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        dht_dc.push(0);

        // DHT AC table 0: two length-2 codes, canonical order assigns
        // "00" -> first value, "01" -> second value.
        // value 0x01 = (run=0, size=1); value 0x00 = EOB.
        let mut dht_ac = vec![0x10u8];
        dht_ac.extend_from_slice(&[0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        dht_ac.extend_from_slice(&[0x01, 0x00]);

        let sos = [1, 1, 0x00, 0, 63, 0x00];

        let mut bytes = Vec::new();
        bytes.extend(segment(DQT, &dqt));
        bytes.extend(segment(SOF0, &sof));
        bytes.extend(segment(DHT, &dht_dc));
        bytes.extend(segment(DHT, &dht_ac));
        bytes.extend(segment(SOS, &sos));
        // DC "00" (size=0, diff=0) + AC "00" (run=0,size=1) + magnitude
        // bit "1" (value 1) + AC "01" (EOB), padded with a trailing 1-bit:
        // 00 00 1 01 1 -> 0b0000_1011.
        bytes.push(0b0000_1011);
        bytes.extend_from_slice(&[0xFF, EOI]);

        let mut src = Slice(&bytes);
        let mut input = BufferedInput::new(&mut src);
        let d = read_header(&mut input).unwrap();

        let mut sink = Collect(Vec::new());
        decode(&d, &mut input, &mut sink).unwrap();
        assert_eq!(sink.0.len(), 1);
        assert_ne!(sink.0[0], (128, 128, 128, 255));
    }
}
