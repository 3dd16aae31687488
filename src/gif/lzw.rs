//! Variable-width LZW decoding for GIF image data sub-blocks: code-size
//! growth, `CLEAR`/`EOI` sentinels, and the K-ω special case.

use crate::error::{GidError, GidResult};
use crate::io::bitreader::LsbBitReader;

/// Decodes one GIF sub-block-delimited LZW stream into raw palette indices.
///
/// `min_code_size` is the LZW minimum code size byte that precedes the first
/// sub-block (3..=11, per the GIF89a spec).
pub(crate) fn decode(
    reader: &mut LsbBitReader,
    min_code_size: u8,
) -> GidResult<Vec<u8>> {
    if !(2..=11).contains(&min_code_size) {
        return Err(GidError::invalid_data("GIF LZW minimum code size out of range"));
    }

    let clear_code: u32 = 1 << min_code_size;
    let end_code: u32 = clear_code + 1;
    let mut next_code: u32;
    let mut code_size: u32;
    let mut dict: Vec<Vec<u8>>;

    let reset_dict = |code_size: &mut u32, next_code: &mut u32, dict: &mut Vec<Vec<u8>>| {
        *code_size = u32::from(min_code_size) + 1;
        dict.clear();
        for i in 0..clear_code {
            dict.push(vec![i as u8]);
        }
        dict.push(Vec::new()); // clear_code placeholder
        dict.push(Vec::new()); // end_code placeholder
        *next_code = end_code + 1;
    };

    dict = Vec::new();
    code_size = 0;
    next_code = 0;
    reset_dict(&mut code_size, &mut next_code, &mut dict);

    let mut output = Vec::new();
    let mut prev: Option<Vec<u8>> = None;

    loop {
        let code = reader.read_bits(code_size)?;
        if code == clear_code {
            reset_dict(&mut code_size, &mut next_code, &mut dict);
            prev = None;
            continue;
        }
        if code == end_code {
            break;
        }

        let entry: Vec<u8> = if code < next_code {
            dict[code as usize].clone()
        } else if code == next_code {
            // K-ω special case: code refers to the entry about to be added.
            let prev = prev
                .as_ref()
                .ok_or_else(|| GidError::invalid_data("GIF LZW code referenced before any prior code"))?;
            let mut entry = prev.clone();
            entry.push(prev[0]);
            entry
        } else {
            return Err(GidError::invalid_data("GIF LZW code out of range"));
        };

        output.extend_from_slice(&entry);

        if let Some(prev) = &prev {
            if next_code < 4096 {
                let mut new_entry = prev.clone();
                new_entry.push(entry[0]);
                if next_code as usize == dict.len() {
                    dict.push(new_entry);
                } else {
                    dict[next_code as usize] = new_entry;
                }
                next_code += 1;
                if next_code == (1 << code_size) && code_size < 12 {
                    code_size += 1;
                }
            }
        }

        prev = Some(entry);
    }

    Ok(output)
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
    fn decodes_all_same_index_run() {
        // min_code_size = 2: clear=4, end=5, codes start at 6, code width 3.
        // Stream: CLEAR(4), literal 0, literal 0, literal 0, END(5) packed
        // LSB-first into 15 bits -> [0x04, 0x50].
        let bytes = [0x04u8, 0x50];

        let mut src = Slice(&bytes);
        let mut input = BufferedInput::new(&mut src);
        let mut reader = LsbBitReader::new(&mut input);
        let out = decode(&mut reader, 2).unwrap();
        assert_eq!(out, vec![0, 0, 0]);
    }
}
