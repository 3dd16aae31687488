//! JPEG Huffman table construction and magnitude/sign decoding. Bit-level
//! reading, including byte-stuffing removal and marker detection, lives in
//! [`crate::io::bitreader::MsbBitReader`].
//!
//! Table construction (`bits[1..16]` counts plus a flat value list) follows
//! the DHT segment layout; the code-assignment algorithm mirrors the
//! canonical-Huffman technique also used by [`crate::png::inflate`]
//! (bit-by-bit, MSB-first).

use std::collections::HashMap;

use crate::error::{GidError, GidResult};
use crate::io::bitreader::MsbBitReader;

/// One DHT-derived Huffman table: decodes an entropy-coded symbol (a
/// `(run, size)` nibble pair for AC, or a `size` nibble for DC).
#[derive(Debug, Clone, Default)]
pub(crate) struct HuffmanTable {
    map: HashMap<(u8, u16), u8>,
}

impl HuffmanTable {
    /// `bits[i]` (`i` in `0..16`) is the number of codes of length `i+1`;
    /// `values` lists the symbols in code order.
    pub(crate) fn build(bits: &[u8; 16], values: &[u8]) -> GidResult<HuffmanTable> {
        let mut map = HashMap::new();
        let mut code: u16 = 0;
        let mut value_index = 0usize;
        for (i, &count) in bits.iter().enumerate() {
            let len = (i + 1) as u8;
            for _ in 0..count {
                let value = *values
                    .get(value_index)
                    .ok_or_else(|| GidError::invalid_data("JPEG DHT value list shorter than bits table"))?;
                map.insert((len, code), value);
                value_index += 1;
                code += 1;
            }
            code <<= 1;
        }
        if value_index != values.len() {
            return Err(GidError::invalid_data("JPEG DHT value list longer than bits table"));
        }
        Ok(HuffmanTable { map })
    }

    pub(crate) fn decode(&self, reader: &mut MsbBitReader) -> GidResult<u8> {
        let mut code: u16 = 0;
        for len in 1..=16u8 {
            code = (code << 1) | reader.read_bit()?;
            if let Some(&value) = self.map.get(&(len, code)) {
                return Ok(value);
            }
        }
        Err(GidError::invalid_data("invalid JPEG Huffman code"))
    }
}

/// Decodes a DHT segment's payload (possibly several tables back to back)
/// into `(class, id, table)` triples. `class` is 0 for DC, 1 for AC.
pub(crate) fn parse_dht(data: &[u8]) -> GidResult<Vec<(u8, u8, HuffmanTable)>> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if pos + 17 > data.len() {
            return Err(GidError::invalid_data("truncated DHT segment"));
        }
        let class_id = data[pos];
        let class = class_id >> 4;
        let id = class_id & 0x0F;
        let mut bits = [0u8; 16];
        bits.copy_from_slice(&data[pos + 1..pos + 17]);
        let total: usize = bits.iter().map(|&b| b as usize).sum();
        pos += 17;
        if pos + total > data.len() {
            return Err(GidError::invalid_data("truncated DHT value list"));
        }
        let values = data[pos..pos + total].to_vec();
        pos += total;
        out.push((class, id, HuffmanTable::build(&bits, &values)?));
    }
    Ok(out)
}

/// Sign-extends a raw `bits`-bit magnitude: `value = r if r >= 2^(s-1) else
/// r - 2^s + 1`.
pub(crate) fn extend(raw: u32, bits: u8) -> i32 {
    if bits == 0 {
        return 0;
    }
    let half = 1i32 << (bits - 1);
    let raw = raw as i32;
    if raw >= half {
        raw
    } else {
        raw - (1 << bits) + 1
    }
}

/// Reads one DC or AC magnitude: `size` Huffman-decoded bits then that many
/// raw bits, sign-extended.
pub(crate) fn decode_magnitude(
    reader: &mut MsbBitReader,
    table: &HuffmanTable,
) -> GidResult<(u8, i32)> {
    let size = table.decode(reader)?;
    if size == 0 {
        return Ok((0, 0));
    }
    let raw = reader.read_bits(u32::from(size))?;
    Ok((size, extend(raw, size)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::buffered::{BufferedInput, ByteSource};

    struct Slice<'a>(&'a [u8]);
    impl<'a> ByteSource for Slice<'a> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn builds_single_symbol_table_and_decodes() {
        // One code of length 2 for value 5: bits[1] = 1 (index 1 -> len 2).
        let mut bits = [0u8; 16];
        bits[1] = 1;
        let values = [5u8];
        let table = HuffmanTable::build(&bits, &values).unwrap();

        // The canonical code for the only length-2 symbol is 0b00.
        let bytes = [0b0000_0000u8];
        let mut src = Slice(&bytes);
        let mut input = BufferedInput::new(&mut src);
        let mut reader = MsbBitReader::new(&mut input);
        assert_eq!(table.decode(&mut reader).unwrap(), 5);
    }

    #[test]
    fn sign_extension_matches_spec_rule() {
        assert_eq!(extend(0b0, 1), -1);
        assert_eq!(extend(0b1, 1), 1);
        assert_eq!(extend(0b00, 2), -3);
        assert_eq!(extend(0b11, 2), 3);
    }
}
