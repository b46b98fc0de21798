//! Source and Sample traits consumed by the mixing engine.

use crate::OutputFormat;

/// A handle-addressable object capable of producing `Sample`s.
///
/// Sources hold the decoded (or decodable) audio data; a `Sample` is a
/// stateful cursor created from a source that pulls frames in the mixer's
/// output format.
pub trait Source: Send {
    /// Inform the source of the mixer output format. Called whenever the
    /// mixer is (re)configured; samples created afterwards convert into
    /// this format.
    fn set_output_format(&mut self, format: OutputFormat);

    /// Create a new playback cursor for this source, or `None` if the
    /// source is not ready (unconfigured, unreadable file, ...).
    fn create_sample(&self) -> Option<Box<dyn Sample>>;
}

/// A stateful cursor pulling frames from a `Source` into the mixer format.
pub trait Sample: Send {
    /// Fill `out` with up to `frames` frames (`frames * channels` i32
    /// values) and return the number of frames written. A short return
    /// means end of input; the sample rewinds itself and the next `read`
    /// starts over from the beginning. Looping policy belongs to the
    /// mixer, not the sample.
    fn read(&mut self, out: &mut [i32], frames: usize) -> usize;

    /// Position the cursor at an absolute frame index, clamped to the
    /// stream length.
    fn seek(&mut self, frame: u64);

    /// Position the cursor at a time offset in seconds.
    fn seek_seconds(&mut self, seconds: f64);
}
