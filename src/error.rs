//! The error taxonomy every decoder in this crate raises through.

/// Result type returned by every public decoding entry point.
pub type GidResult<T> = Result<T, GidError>;

/// Why a [`crate::load_header`] or [`crate::load_contents`] call failed.
///
/// Variants map 1:1 onto the error kinds named by the format spec this crate
/// implements: an unrecognized signature, a recognized-but-unimplemented
/// format body, a recognized format in an unsupported configuration, a
/// malformed byte stream, a caller-side contract violation, or a bug in this
/// crate itself.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GidError {
    /// The byte source's signature did not match any format this crate knows.
    #[error("unrecognized image format")]
    UnknownFormat,

    /// The signature matched a format whose body decoder is not implemented.
    #[error("{format} is recognized but its body is not decoded by this crate")]
    KnownButUnsupportedFormat {
        /// Short name of the recognized format (e.g. "FITS", "TIFF").
        format: &'static str,
    },

    /// The format was recognized, but this particular variant of it is not
    /// supported (e.g. BMP RLE compression, TGA color-mapped images).
    #[error("unsupported {format} subformat: {detail}")]
    UnsupportedSubformat {
        /// Short name of the format.
        format: &'static str,
        /// What about this instance is unsupported.
        detail: String,
    },

    /// A parse violation, truncation, checksum mismatch, bad entropy code,
    /// or out-of-range index encountered while decoding pixel data.
    #[error("malformed image data: {0}")]
    InvalidData(String),

    /// The byte source ran out of data before the decoder was done with it.
    #[error("unexpected end of image data")]
    UnexpectedEof,

    /// An I/O error surfaced by the byte source.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller's primary-color channel width was outside `[8, 16]`.
    #[error("primary color range must be an unsigned width in [8, 16], got {0}")]
    InvalidPrimaryColorRange(u32),

    /// An internal invariant was violated. Indicates a bug in this crate,
    /// not malformed input.
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolated(&'static str),
}

impl GidError {
    pub(crate) fn invalid_data(msg: impl Into<String>) -> Self {
        GidError::InvalidData(msg.into())
    }

    pub(crate) fn unsupported(format: &'static str, detail: impl Into<String>) -> Self {
        GidError::UnsupportedSubformat {
            format,
            detail: detail.into(),
        }
    }
}
