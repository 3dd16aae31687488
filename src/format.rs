//! Header/signature dispatcher and the two public entry points,
//! [`load_header`] and [`Image::load_contents`].

use crate::descriptor::{DecodeMode, Descriptor, Format};
use crate::error::{GidError, GidResult};
use crate::io::buffered::{BufferedInput, ByteSource};
use crate::sink::{PrimaryColor, Sink};

/// An opened image: the parsed [`Descriptor`] plus the still-live byte
/// stream body decoding reads from. Produced by [`load_header`]; call
/// [`Image::load_contents`] to decode pixels (repeatedly, for animations).
pub struct Image<'s> {
    pub descriptor: Descriptor,
    input: BufferedInput<'s>,
}

impl<'s> Image<'s> {
    /// Decodes (the next frame of) the image into `sink`.
    ///
    /// Returns the number of seconds until the next frame should be
    /// requested; `0.0` means there is no next frame (animations only ever
    /// apply to GIF). Calling this again on a descriptor that returned
    /// `0.0` is a caller error; nothing in this crate prevents it, but the
    /// underlying stream is exhausted and will fail with
    /// [`GidError::UnexpectedEof`].
    pub fn load_contents<P: PrimaryColor>(
        &mut self,
        sink: &mut dyn Sink<P>,
        mode: DecodeMode,
    ) -> GidResult<f64> {
        crate::sink::check_primary_color_width(P::WIDTH)?;
        self.descriptor
            .logger
            .trace(&format!("gid: decoding {} contents", self.descriptor.format.name()));
        match self.descriptor.format {
            #[cfg(feature = "bmp")]
            Format::Bmp => crate::bmp::decode(&self.descriptor, &mut self.input, sink),
            #[cfg(feature = "gif")]
            Format::Gif => crate::gif::decode(&mut self.descriptor, &mut self.input, sink, mode),
            #[cfg(feature = "jpeg")]
            Format::Jpeg => crate::jpeg::decode(&self.descriptor, &mut self.input, sink),
            #[cfg(feature = "png")]
            Format::Png => crate::png::decode(&self.descriptor, &mut self.input, sink, mode),
            #[cfg(feature = "pnm")]
            Format::Pnm => crate::pnm::decode(&self.descriptor, &mut self.input, sink),
            #[cfg(feature = "qoi")]
            Format::Qoi => crate::qoi::decode(&self.descriptor, &mut self.input, sink),
            #[cfg(feature = "tga")]
            Format::Tga => crate::tga::decode(&self.descriptor, &mut self.input, sink),
            Format::Fits | Format::Tiff => Err(GidError::InternalInvariantViolated(
                "load_contents called on a format whose header loader never succeeds",
            )),
            #[allow(unreachable_patterns)]
            _ => Err(GidError::KnownButUnsupportedFormat {
                format: self.descriptor.format.name(),
            }),
        }
    }
}

/// Reads the first bytes of `source`, classifies the format, and parses its
/// header into a [`Descriptor`].
///
/// `try_tga`: TGA has no magic bytes, so it is only attempted when every
/// other signature check misses and the caller opts in.
pub fn load_header<'s>(source: &'s mut dyn ByteSource, try_tga: bool) -> GidResult<Image<'s>> {
    let mut input = BufferedInput::new(source);
    let first_byte = input.read_u8()?;

    let descriptor = dispatch(&mut input, first_byte, try_tga)?;
    descriptor.logger.trace(&format!(
        "gid: loaded {} header ({}x{})",
        descriptor.format.name(),
        descriptor.width,
        descriptor.height
    ));
    Ok(Image { descriptor, input })
}

fn dispatch(input: &mut BufferedInput, first_byte: u8, try_tga: bool) -> GidResult<Descriptor> {
    match first_byte {
        #[cfg(feature = "bmp")]
        b'B' => crate::bmp::read_header(input),

        #[cfg(feature = "fits")]
        b'S' => crate::fits::read_header(input),

        #[cfg(feature = "gif")]
        b'G' => crate::gif::read_header(input),

        #[cfg(feature = "tiff")]
        b'I' | b'M' => crate::tiff::read_header(input, first_byte),

        0xFF => {
            #[cfg(feature = "jpeg")]
            {
                let second = input.read_u8()?;
                if second != 0xD8 {
                    return Err(GidError::UnknownFormat);
                }
                crate::jpeg::read_header(input)
            }
            #[cfg(not(feature = "jpeg"))]
            {
                Err(GidError::UnknownFormat)
            }
        }

        0x89 => {
            #[cfg(feature = "png")]
            {
                crate::png::read_header(input)
            }
            #[cfg(not(feature = "png"))]
            {
                Err(GidError::UnknownFormat)
            }
        }

        #[cfg(feature = "pnm")]
        b'P' => crate::pnm::read_header(input),

        #[cfg(feature = "qoi")]
        b'q' => crate::qoi::read_header(input),

        first => {
            #[cfg(feature = "tga")]
            {
                if try_tga {
                    crate::tga::read_header(input, first)
                } else {
                    Err(GidError::UnknownFormat)
                }
            }
            #[cfg(not(feature = "tga"))]
            {
                let _ = (input, try_tga, first);
                Err(GidError::UnknownFormat)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn unknown_signature_without_try_tga_fails() {
        let data = [0u8; 4];
        let mut src = Slice(&data);
        let err = load_header(&mut src, false).unwrap_err();
        assert!(matches!(err, GidError::UnknownFormat));
    }

    #[test]
    fn png_signature_is_recognized() {
        let mut data = vec![0x89];
        data.extend_from_slice(b"PNG\r\n\x1a\n");
        // A truncated IHDR still proves the signature routed to the PNG
        // header loader rather than falling through to `UnknownFormat`.
        let mut src = Slice(&data);
        let err = load_header(&mut src, false).unwrap_err();
        assert!(!matches!(err, GidError::UnknownFormat));
    }
}
