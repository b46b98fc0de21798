//! Facade error type.

use pm_audio::AudioError;
use pm_formats::FormatError;
use std::fmt;

/// Error kinds surfaced at the mixer API boundary. The boolean/sentinel
/// convenience methods on [`crate::Mixer`] map these to `false`/`0`.
#[derive(Debug)]
pub enum MixerError {
    /// A file failed to parse as any supported container
    BadFormat(FormatError),
    /// Rate, channel count, bit depth, buffer geometry or handle out of
    /// range
    BadConfig,
    /// Operation requires a configured mixer (`set_format` first)
    NotStarted,
    /// Operation requires a stopped mixer
    AlreadyStarted,
    /// The audio backend refused the operation
    Device(AudioError),
}

impl fmt::Display for MixerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixerError::BadFormat(e) => write!(f, "bad format: {}", e),
            MixerError::BadConfig => write!(f, "invalid configuration"),
            MixerError::NotStarted => write!(f, "mixer not started"),
            MixerError::AlreadyStarted => write!(f, "mixer already started"),
            MixerError::Device(e) => write!(f, "device error: {}", e),
        }
    }
}

impl std::error::Error for MixerError {}

impl From<FormatError> for MixerError {
    fn from(err: FormatError) -> Self {
        MixerError::BadFormat(err)
    }
}

impl From<AudioError> for MixerError {
    fn from(err: AudioError) -> Self {
        MixerError::Device(err)
    }
}
