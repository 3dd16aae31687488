//! PNG scanline filter reversal: the five filter types and the Paeth
//! predictor's tie-break rule (`a <= b <= c` prefers `a`, else `b <= c`
//! prefers `b`, else `c`), operating on one Adam7 sub-image at a time
//! rather than assuming a single full-size pass (see `super::adam7`).

use crate::error::{GidError, GidResult};

fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let p = i32::from(a) + i32::from(b) - i32::from(c);
    let pa = (p - i32::from(a)).abs();
    let pb = (p - i32::from(b)).abs();
    let pc = (p - i32::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Reverses per-scanline filtering in place.
///
/// `data` holds `height` scanlines, each `1 + bpp_rounded_up * width` bytes
/// long: a filter-type byte followed by `stride` bytes of filtered sample
/// data. `bytes_per_pixel` is the number of bytes spanned by one whole pixel
/// (rounded up to 1 for sub-byte bit depths), used as the filter's lookback
/// distance `bpp` per the PNG spec.
pub(crate) fn defilter(
    data: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    bytes_per_pixel: usize,
) -> GidResult<Vec<u8>> {
    let row_len = 1 + stride;
    if data.len() < row_len * height as usize {
        return Err(GidError::invalid_data("PNG IDAT stream shorter than expected scanline data"));
    }
    let _ = width;

    let mut out = vec![0u8; stride * height as usize];
    for y in 0..height as usize {
        let filter_type = data[y * row_len];
        let src = &data[y * row_len + 1..y * row_len + 1 + stride];
        let (prev_row, cur_row) = if y == 0 {
            (None, &mut out[..stride])
        } else {
            let (before, after) = out.split_at_mut(y * stride);
            (Some(&before[(y - 1) * stride..y * stride]), &mut after[..stride])
        };

        for x in 0..stride {
            let a = if x >= bytes_per_pixel {
                cur_row[x - bytes_per_pixel]
            } else {
                0
            };
            let b = prev_row.map_or(0, |r| r[x]);
            let c = if x >= bytes_per_pixel {
                prev_row.map_or(0, |r| r[x - bytes_per_pixel])
            } else {
                0
            };
            let raw = src[x];
            cur_row[x] = match filter_type {
                0 => raw,
                1 => raw.wrapping_add(a),
                2 => raw.wrapping_add(b),
                3 => raw.wrapping_add(((u16::from(a) + u16::from(b)) / 2) as u8),
                4 => raw.wrapping_add(paeth_predictor(a, b, c)),
                other => {
                    return Err(GidError::invalid_data(format!(
                        "invalid PNG filter type {other}"
                    )))
                }
            };
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverses_sub_filter() {
        // 2x1 greyscale, bpp = 1. Row: filter=1 (Sub), raw bytes [10, 5].
        // Reconstructed: [10, 15] (second byte += first reconstructed byte).
        let data = [1u8, 10, 5];
        let out = defilter(&data, 2, 1, 2, 1).unwrap();
        assert_eq!(out, vec![10, 15]);
    }

    #[test]
    fn reverses_paeth_filter_second_row() {
        // 2x2 greyscale, bpp = 1.
        // Row 0: None filter, raw [1, 2] -> reconstructed [1, 2].
        // Row 1: Paeth filter, raw [0, 0].
        //   x=0: a=0,b=1,c=0 -> predictor picks b=1 (pa=1,pb=0,pc=1) -> 0+1=1
        //   x=1: a=1 (reconstructed row1[0]), b=2, c=1 -> p=1+2-1=2;
        //        pa=|2-1|=1, pb=|2-2|=0, pc=|2-1|=1 -> picks b=2 -> 0+2=2
        let data = [0u8, 1, 2, 4, 0, 0];
        let out = defilter(&data, 2, 2, 2, 1).unwrap();
        assert_eq!(out, vec![1, 2, 1, 2]);
    }
}
