//! TIFF signature/header recognition only; body decoding is out of scope.
//! Reads the byte-order pair (`II`/`MM`) and then verifies the `42` magic
//! that follows it, rejecting the file if it doesn't match.

use crate::descriptor::{Descriptor, Endianness};
use crate::error::{GidError, GidResult};
use crate::io::buffered::BufferedInput;

/// `first_byte` is `'I'` or `'M'`, already consumed by the dispatcher.
pub(crate) fn read_header(input: &mut BufferedInput, first_byte: u8) -> GidResult<Descriptor> {
    let second = input.read_u8()?;
    let endianness = match (first_byte, second) {
        (b'I', b'I') => Endianness::Little,
        (b'M', b'M') => Endianness::Big,
        _ => return Err(GidError::UnknownFormat),
    };

    let magic = match endianness {
        Endianness::Little => input.read_u16_le()?,
        Endianness::Big => input.read_u16_be()?,
    };
    if magic != 42 {
        return Err(GidError::invalid_data("TIFF header magic is not 42"));
    }

    let _ = endianness;
    Err(GidError::KnownButUnsupportedFormat { format: "TIFF" })
}
