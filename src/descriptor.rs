//! The Image Descriptor: the single stateful object threaded through the
//! pipeline, from header parsing through body decoding.

use crate::color::Palette;
use crate::log::{Logger, NoopLogger};

/// Recognized container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Bmp,
    Fits,
    Gif,
    Jpeg,
    Png,
    Pnm,
    Qoi,
    Tga,
    Tiff,
}

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Format::Bmp => "BMP",
            Format::Fits => "FITS",
            Format::Gif => "GIF",
            Format::Jpeg => "JPEG",
            Format::Png => "PNG",
            Format::Pnm => "PNM",
            Format::Qoi => "QOI",
            Format::Tga => "TGA",
            Format::Tiff => "TIFF",
        }
    }
}

/// How the decoded pixel grid should be rotated before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayOrientation {
    #[default]
    Unchanged,
    Rot90,
    Rot180,
    Rot270,
}

/// Interlacing/progressive refinement strategy requested by the caller for
/// formats that support a partial-refinement rendering (GIF, PNG Adam7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Only paint each pixel once, at its final position.
    Fast,
    /// Paint each decoded row across the rows it provisionally covers too,
    /// producing a progressively-refining image.
    Nice,
}

/// TIFF byte order, recorded once the header is parsed (stub support only;
/// see `tiff.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// JPEG color space, carried on [`JpegState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegColorSpace {
    YCbCr,
    YGrey,
    Cmyk,
}

/// A JPEG quantization table: 64 entries in natural (non-zigzag) order.
pub type QuantTable = [u16; 64];

/// Per-component sampling/quantization info from `SOF0`/`SOF2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegComponent {
    pub id: u8,
    pub h_sampling: u8,
    pub v_sampling: u8,
    pub quant_table_index: u8,
}

/// JPEG pre-SOF state: quantization/Huffman tables and component info seen
/// before the frame header, carried on the descriptor so markers that
/// precede `SOF0`/`SOF2` aren't lost.
#[derive(Debug, Clone, Default)]
pub struct JpegState {
    pub quant_tables: [Option<QuantTable>; 4],
    pub components: Vec<JpegComponent>,
    pub restart_interval: u16,
    pub max_h_sampling: u8,
    pub max_v_sampling: u8,
    pub color_space: Option<JpegColorSpace>,
    pub progressive: bool,
}

/// The single stateful object threaded through header parsing and body
/// decoding.
pub struct Descriptor {
    pub format: Format,
    pub detailed_format: String,
    pub subformat_id: i32,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub rle_encoded: bool,
    pub transparency: bool,
    pub greyscale: bool,
    pub interlaced: bool,
    pub top_first: bool,
    pub endianness: Option<Endianness>,
    pub display_orientation: DisplayOrientation,
    pub palette: Option<Palette>,
    pub jpeg_state: Option<JpegState>,
    pub first_byte: Option<u8>,
    /// Seconds until the next GIF frame; 0.0 = no animation / last frame.
    pub next_frame: f64,
    /// GIF `NETSCAPE2.0` loop count: `None` if absent, `Some(0)` = infinite.
    pub gif_loop_count: Option<u16>,
    /// Single "fully transparent" sample value for PNG grey/RGB `tRNS`.
    pub transparent_key: Option<(u16, u16, u16)>,
    /// PNG bit depth (1/2/4/8/16), needed alongside `subformat_id` (the
    /// color type) to reconstruct per-sample packing.
    pub(crate) bit_depth: u8,
    /// The first `IDAT` chunk's payload, captured by `png::read_header` so
    /// `png::decode` doesn't have to re-scan chunks already consumed while
    /// looking for `PLTE`/`tRNS`.
    pub(crate) first_idat: Option<Vec<u8>>,
    /// Composited RGBA canvas carried across `load_contents` calls so GIF
    /// frame disposal (leave/restore-to-background/restore-to-previous) can
    /// see the result of previous frames. Sized `width * height` once the
    /// first frame is decoded.
    pub(crate) gif_canvas: Option<Vec<(u8, u8, u8, u8)>>,
    pub(crate) logger: Box<dyn Logger>,
}

impl Descriptor {
    pub(crate) fn new(format: Format, width: u32, height: u32, bits_per_pixel: u32) -> Self {
        Descriptor {
            format,
            detailed_format: format.name().to_string(),
            subformat_id: 0,
            width,
            height,
            bits_per_pixel,
            rle_encoded: false,
            transparency: false,
            greyscale: false,
            interlaced: false,
            top_first: false,
            endianness: None,
            display_orientation: DisplayOrientation::Unchanged,
            palette: None,
            jpeg_state: None,
            first_byte: None,
            next_frame: 0.0,
            gif_loop_count: None,
            transparent_key: None,
            bit_depth: 0,
            first_idat: None,
            gif_canvas: None,
            logger: Box::new(NoopLogger),
        }
    }

    /// Installs a custom logger, replacing the default no-op one.
    pub fn set_logger(&mut self, logger: Box<dyn Logger>) {
        self.logger = logger;
    }

    pub fn pixel_width(&self) -> u32 {
        self.width
    }

    pub fn pixel_height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn detailed_format(&self) -> &str {
        &self.detailed_format
    }

    pub fn subformat(&self) -> i32 {
        self.subformat_id
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.bits_per_pixel
    }

    pub fn is_rle(&self) -> bool {
        self.rle_encoded
    }

    pub fn is_interlaced(&self) -> bool {
        self.interlaced
    }

    pub fn greyscale(&self) -> bool {
        self.greyscale
    }

    pub fn has_palette(&self) -> bool {
        self.palette.is_some()
    }

    pub fn expect_transparency(&self) -> bool {
        self.transparency
    }

    pub fn display_orientation(&self) -> DisplayOrientation {
        self.display_orientation
    }
}
