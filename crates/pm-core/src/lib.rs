//! Core types for the polymix mixer.
//!
//! This crate defines the `Source`/`Sample` traits consumed by the mixing
//! engine, the mixer output format, and the per-sample format converters
//! that normalize raw PCM bytes to 32-bit signed integers.

mod convert;
mod format;
mod g711;
mod traits;

pub use convert::{select_decoder, AuFormat, Decoder};
pub use format::OutputFormat;
pub use g711::{alaw_decode, mulaw_decode};
pub use traits::{Sample, Source};
