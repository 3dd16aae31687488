//! Adam7 interlacing geometry: the seven passes' offsets and strides, taken
//! directly from the PNG specification's Adam7 table.

/// One Adam7 pass: `(x_offset, y_offset, x_stride, y_stride)`.
pub(crate) const PASSES: [(u32, u32, u32, u32); 7] = [
    (0, 0, 8, 8),
    (4, 0, 8, 8),
    (0, 4, 4, 8),
    (2, 0, 4, 4),
    (0, 2, 2, 4),
    (1, 0, 2, 2),
    (0, 1, 1, 2),
];

/// Pixel dimensions of the sub-image scanned by one Adam7 pass.
pub(crate) fn pass_dimensions(pass: usize, width: u32, height: u32) -> (u32, u32) {
    let (x_off, y_off, x_stride, y_stride) = PASSES[pass];
    let w = if width > x_off { (width - x_off + x_stride - 1) / x_stride } else { 0 };
    let h = if height > y_off { (height - y_off + y_stride - 1) / y_stride } else { 0 };
    (w, h)
}
