//! Dequantization and the 8x8 inverse DCT.
//!
//! Uses the plain separable float formula (same row/column decomposition a
//! fast AAN/Loeffler variant would use, but the textbook cosine sum rather
//! than a scaled butterfly network), consistent with this crate's
//! preference for straightforward code over micro-optimization (see
//! `io/bitreader.rs`'s byte-at-a-time refill).

use crate::descriptor::QuantTable;

const BLOCK: usize = 8;

fn cosine_table() -> [[f32; 8]; 8] {
    let mut table = [[0f32; 8]; 8];
    for (x, row) in table.iter_mut().enumerate() {
        for (u, cell) in row.iter_mut().enumerate() {
            *cell = ((2.0 * x as f32 + 1.0) * u as f32 * std::f32::consts::PI / 16.0).cos();
        }
    }
    table
}

fn alpha(u: usize) -> f32 {
    if u == 0 {
        1.0 / std::f32::consts::SQRT_2
    } else {
        1.0
    }
}

/// Dequantizes a zigzag-ordered coefficient block into natural (row-major)
/// order.
pub(crate) fn dequantize_zigzag(coeffs: &[i32; 64], quant: &QuantTable) -> [f32; 64] {
    let mut natural = [0f32; 64];
    for (zigzag_index, &natural_index) in ZIGZAG.iter().enumerate() {
        natural[natural_index] = coeffs[zigzag_index] as f32 * quant[zigzag_index] as f32;
    }
    natural
}

/// Separable 2-D inverse DCT of one natural-order 8×8 coefficient block,
/// producing spatial-domain samples shifted by +128 and clamped to
/// `[0, 255]`.
pub(crate) fn idct_block(natural: &[f32; 64]) -> [u8; 64] {
    let cos = cosine_table();
    let mut tmp = [0f32; 64]; // after column (vertical) pass

    for x in 0..BLOCK {
        for v in 0..BLOCK {
            let mut sum = 0f32;
            for y in 0..BLOCK {
                sum += alpha(y) * natural[y * BLOCK + v] * cos[x][y];
            }
            tmp[x * BLOCK + v] = sum * 0.5;
        }
    }

    let mut out = [0u8; 64];
    for x in 0..BLOCK {
        for y in 0..BLOCK {
            let mut sum = 0f32;
            for u in 0..BLOCK {
                sum += alpha(u) * tmp[x * BLOCK + u] * cos[y][u];
            }
            let sample = sum * 0.5 + 128.0;
            out[x * BLOCK + y] = sample.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Zigzag-to-natural-order index map for an 8×8 block: coefficients are
/// serialized diagonally.
pub(crate) const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];
