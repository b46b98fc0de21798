//! Audio container parsing for the polymix mixer.
//!
//! Currently WAV (RIFF) reading and a minimal 16-bit writer. Ogg Vorbis
//! decoding lives in the engine crate behind its stream seam.

mod wav;

pub use wav::{is_wav, load_wav, write_wav, WavData};

use std::fmt;

/// Error type for container parsing.
#[derive(Debug)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    InvalidHeader,
    /// Unexpected end of file
    UnexpectedEof,
    /// Recognized container, but an unsupported encoding or layout
    UnsupportedFormat,
    /// I/O error
    Io(String),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::InvalidHeader => write!(f, "invalid header"),
            FormatError::UnexpectedEof => write!(f, "unexpected end of file"),
            FormatError::UnsupportedFormat => write!(f, "unsupported format"),
            FormatError::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl std::error::Error for FormatError {}

impl From<std::io::Error> for FormatError {
    fn from(err: std::io::Error) -> Self {
        FormatError::Io(err.to_string())
    }
}
