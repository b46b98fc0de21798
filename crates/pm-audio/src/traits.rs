//! Audio backend trait and error types.

use std::fmt;

/// Error type for device operations.
#[derive(Debug)]
pub enum AudioError {
    /// The host has no usable output device
    NoOutputDevice,
    /// The device rejected the requested stream configuration
    OpenFailed(String),
    /// Starting or suspending the stream failed
    StreamControl(String),
    /// The operation needs an open stream
    NotOpen,
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::NoOutputDevice => write!(f, "no output device available"),
            AudioError::OpenFailed(msg) => write!(f, "failed to open output stream: {}", msg),
            AudioError::StreamControl(msg) => write!(f, "stream control failed: {}", msg),
            AudioError::NotOpen => write!(f, "no open stream"),
        }
    }
}

impl std::error::Error for AudioError {}

/// Sample layout of the bytes the pull callback produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamFormat {
    /// Packed 16-bit little-endian signed PCM
    Int16,
    /// Packed 24-bit little-endian signed PCM
    Int24,
}

impl StreamFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            StreamFormat::Int16 => 2,
            StreamFormat::Int24 => 3,
        }
    }
}

/// Stream state as reported by the device layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    /// No stream open, or stream open but never started
    Inactive,
    /// Stream delivering callbacks
    Active,
    /// Stream open but suspended
    Paused,
    /// The device reported an error
    Error,
}

/// The pull callback: must fill `out` (exactly
/// `frames * channels * bytes_per_sample` bytes of interleaved
/// little-endian PCM) and is invoked from a realtime context — it must
/// never block or allocate.
pub type PullFn = Box<dyn FnMut(&mut [u8], usize) + Send + 'static>;

/// An audio device binding driving the mixer with a periodic pull
/// callback.
pub trait AudioBackend {
    /// Open an output stream on the default device. The stream starts
    /// suspended; call `start_stream`.
    fn open_stream(
        &mut self,
        rate: u32,
        channels: u16,
        format: StreamFormat,
        pull: PullFn,
    ) -> Result<(), AudioError>;

    /// Resume callback delivery.
    fn start_stream(&mut self) -> Result<(), AudioError>;

    /// Suspend callback delivery.
    fn stop_stream(&mut self) -> Result<(), AudioError>;

    /// Tear the stream down.
    fn close_stream(&mut self);

    /// True while a stream is open.
    fn is_open(&self) -> bool;

    /// Current stream state.
    fn status(&self) -> StreamStatus;
}
