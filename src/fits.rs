//! FITS signature/header recognition only; body decoding is out of scope.
//! Recognizes the generic `SIMPLE` keyword-card layout of the FITS
//! standard and reports the format as known-but-unsupported beyond that.

use crate::descriptor::Descriptor;
use crate::error::{GidError, GidResult};
use crate::io::buffered::BufferedInput;

/// `first_byte` is `'S'`, already consumed by the dispatcher. Verifies the
/// rest of `"IMPLE"` and then reports the format as unsupported: FITS card
/// headers encode dimensions in ASCII key=value 80-byte "cards" which this
/// crate does not parse further.
pub(crate) fn read_header(input: &mut BufferedInput) -> GidResult<Descriptor> {
    let mut rest = [0u8; 5];
    input.read_exact(&mut rest)?;
    if &rest != b"IMPLE" {
        return Err(GidError::UnknownFormat);
    }
    Err(GidError::KnownButUnsupportedFormat { format: "FITS" })
}
