//! `gid` — a generic, streaming image decoder.
//!
//! Identifies a compressed image from a raw byte source and reproduces its
//! pixel grid through a caller-supplied [`Sink`], for BMP, GIF, JPEG, PNG,
//! PNM, QOI and TGA (FITS and TIFF signatures/headers are recognized but
//! their bodies are not decoded — see [`GidError::KnownButUnsupportedFormat`]).
//!
//! This crate does not encode images, does not implement arithmetic-coded,
//! JPEG2000, lossless or 12-bit JPEG, does not decode TIFF or FITS pixel
//! data, and ignores ICC color profiles.
//!
//! # Usage
//!
//! ```no_run
//! use gid::{load_header, DecodeMode, Sink};
//!
//! struct CountingSink { seen: u64 }
//! impl Sink<u8> for CountingSink {
//!     fn set_xy(&mut self, _x: u32, _y: u32) {}
//!     fn put_pixel(&mut self, _r: u8, _g: u8, _b: u8, _a: u8) {
//!         self.seen += 1;
//!     }
//! }
//!
//! # fn run(mut source: impl std::io::Read) -> gid::GidResult<()> {
//! let mut image = load_header(&mut source, false)?;
//! let mut sink = CountingSink { seen: 0 };
//! loop {
//!     let delay = image.load_contents(&mut sink, DecodeMode::Fast)?;
//!     if delay == 0.0 {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![allow(clippy::needless_range_loop)]

mod color;
mod descriptor;
mod error;
mod format;
mod io;
mod log;
mod sink;

#[cfg(feature = "bmp")]
mod bmp;
#[cfg(feature = "fits")]
mod fits;
#[cfg(feature = "gif")]
mod gif;
#[cfg(feature = "jpeg")]
mod jpeg;
#[cfg(feature = "png")]
mod png;
#[cfg(feature = "pnm")]
mod pnm;
#[cfg(feature = "qoi")]
mod qoi;
#[cfg(feature = "tga")]
mod tga;
#[cfg(feature = "tiff")]
mod tiff;

pub use color::{Palette, RgbEntry};
pub use descriptor::{
    DecodeMode, Descriptor, DisplayOrientation, Endianness, Format, JpegColorSpace,
    JpegComponent, JpegState, QuantTable,
};
pub use error::{GidError, GidResult};
pub use format::{load_header, Image};
pub use io::buffered::ByteSource;
pub use log::{Logger, NoopLogger, StdLogger};
pub use sink::{check_primary_color_width, PrimaryColor, Sink};
