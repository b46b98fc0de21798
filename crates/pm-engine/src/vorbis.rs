//! Streaming Ogg Vorbis source.
//!
//! The demuxer/decoder sits behind the [`VorbisStream`] seam; the shipped
//! implementation wraps lewton. A `VorbisSample` owns a window of decoded
//! 16-bit interleaved samples refilled on demand, and resamples from it
//! with the same Q16 linear interpolation the PCM path uses. Chained
//! streams are handled by re-reading the stream info on every refill and
//! re-deriving the step when the rate or channel layout changes.

use lewton::inside_ogg::OggStreamReader;
use log::warn;
use pm_core::{OutputFormat, Sample, Source};
use pm_formats::FormatError;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

const FP_SHIFT: u32 = 16;
const FP_MASK: u64 = (1 << FP_SHIFT) - 1;

/// Rate and channel layout of the current logical bitstream section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Decoder seam: yields 16-bit interleaved packets and reports the
/// current section's format.
pub trait VorbisStream: Send {
    /// Format of the section the next packet belongs to.
    fn info(&self) -> StreamInfo;

    /// Next decoded packet, `None` at end of stream.
    fn next_packet(&mut self) -> Option<Vec<i16>>;

    /// Seek to an absolute frame position.
    fn seek_frame(&mut self, frame: u64);
}

/// lewton-backed file stream.
pub struct OggStream {
    reader: OggStreamReader<BufReader<File>>,
}

impl OggStream {
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let file = File::open(path)?;
        let reader = OggStreamReader::new(BufReader::new(file))
            .map_err(|_| FormatError::InvalidHeader)?;
        Ok(Self { reader })
    }
}

impl VorbisStream for OggStream {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            sample_rate: self.reader.ident_hdr.audio_sample_rate,
            channels: u16::from(self.reader.ident_hdr.audio_channels),
        }
    }

    fn next_packet(&mut self) -> Option<Vec<i16>> {
        loop {
            match self.reader.read_dec_packet_itl() {
                Ok(Some(packet)) if packet.is_empty() => continue,
                Ok(packet) => return packet,
                Err(err) => {
                    warn!("vorbis decode error, treating as end of stream: {}", err);
                    return None;
                }
            }
        }
    }

    fn seek_frame(&mut self, frame: u64) {
        if let Err(err) = self.reader.seek_absgp_pg(frame) {
            warn!("vorbis seek failed: {}", err);
        }
    }
}

/// A file-backed streaming source. Each created sample opens its own
/// reader, so several voices can stream the same file independently.
pub struct VorbisSource {
    path: PathBuf,
    format: Option<OutputFormat>,
}

impl VorbisSource {
    /// Probe the file; fails if it does not open as Ogg Vorbis.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FormatError> {
        let path = path.into();
        OggStream::open(&path)?;
        Ok(Self { path, format: None })
    }
}

impl Source for VorbisSource {
    fn set_output_format(&mut self, format: OutputFormat) {
        self.format = format.is_valid().then_some(format);
    }

    fn create_sample(&self) -> Option<Box<dyn Sample>> {
        let format = self.format?;
        match OggStream::open(&self.path) {
            Ok(stream) => Some(Box::new(VorbisSample::from_stream(Box::new(stream), format))),
            Err(err) => {
                warn!("reopening {:?} failed: {}", self.path, err);
                None
            }
        }
    }
}

/// Streaming playback cursor.
pub struct VorbisSample {
    stream: Box<dyn VorbisStream>,
    out: OutputFormat,
    src: StreamInfo,
    /// Q16 input-frames-per-output-frame, derived from the current
    /// section's rate.
    step: u64,
    frac: u64,
    /// Decoded 16-bit interleaved samples; `idx` is the element offset of
    /// the current input frame. `idx` may run past the window end, in
    /// which case the overshoot is skipped out of freshly decoded data.
    window: Vec<i16>,
    idx: usize,
}

impl VorbisSample {
    /// Build a sample over any stream implementation. Exposed so tests
    /// and alternative decoders can drive the resampling logic.
    pub fn from_stream(stream: Box<dyn VorbisStream>, out: OutputFormat) -> Self {
        let src = stream.info();
        let step = derive_step(src.sample_rate, out.rate);
        Self { stream, out, src, step, frac: 0, window: Vec::new(), idx: 0 }
    }

    /// Drop consumed samples and decode until the window again holds the
    /// current and next input frame. Decoding stops as soon as both
    /// frames are present, so a section boundary only takes effect once
    /// the previous section's tail has been consumed. Returns false at
    /// end of stream.
    fn refill(&mut self) -> bool {
        let consumed = self.idx.min(self.window.len());
        self.window.drain(..consumed);
        self.idx -= consumed;

        loop {
            let needed = self.idx + 2 * self.src.channels as usize;
            if self.window.len() >= needed {
                return true;
            }
            match self.stream.next_packet() {
                Some(packet) => {
                    self.window.extend_from_slice(&packet);
                    self.check_section();
                }
                None => return false,
            }
        }
    }

    /// Chained-stream support: when the decoder reports a new section
    /// format, re-derive the step and channel layout. The output layout
    /// stays fixed.
    fn check_section(&mut self) {
        let info = self.stream.info();
        if info != self.src {
            self.src = info;
            self.step = derive_step(info.sample_rate, self.out.rate);
        }
    }

    #[inline]
    fn lerp(&self, a: i32, b: i32) -> i32 {
        a + ((i64::from(b - a) * self.frac as i64) >> FP_SHIFT) as i32
    }

    /// Decode one window element at the mixer bit depth.
    #[inline]
    fn value(&self, offset: usize) -> i32 {
        let v = i32::from(self.window[offset]);
        if self.out.bits == 24 {
            v << 8
        } else {
            v
        }
    }

    /// Emit one output frame from input frames at `idx` and `idx +
    /// channels`.
    fn emit(&self, out: &mut [i32], produced: usize) {
        let ch = self.src.channels as usize;
        let a = self.idx;
        let b = self.idx + ch;

        if self.out.channels == 1 {
            let shift = (ch >> 1) as u32;
            let mut va = 0i32;
            let mut vb = 0i32;
            for c in 0..ch {
                va += self.value(a + c);
                vb += self.value(b + c);
            }
            out[produced] = self.lerp(va, vb) >> shift;
        } else if ch > 1 {
            out[2 * produced] = self.lerp(self.value(a), self.value(b));
            out[2 * produced + 1] = self.lerp(self.value(a + 1), self.value(b + 1));
        } else {
            let value = self.lerp(self.value(a), self.value(b));
            out[2 * produced] = value;
            out[2 * produced + 1] = value;
        }
    }
}

fn derive_step(src_rate: u32, out_rate: u32) -> u64 {
    (u64::from(src_rate) << FP_SHIFT) / u64::from(out_rate)
}

impl Sample for VorbisSample {
    fn read(&mut self, out: &mut [i32], frames: usize) -> usize {
        let mut produced = 0;
        while produced < frames {
            let channels = self.src.channels as usize;
            if self.window.len() < self.idx + 2 * channels && !self.refill() {
                // end of stream: rewind and return the short count
                self.seek(0);
                break;
            }

            self.emit(out, produced);
            produced += 1;

            self.frac += self.step;
            let add = (self.frac >> FP_SHIFT) as usize;
            if add > 0 {
                self.frac &= FP_MASK;
                self.idx += add * self.src.channels as usize;
            }
        }
        produced
    }

    fn seek(&mut self, frame: u64) {
        self.window.clear();
        self.idx = 0;
        self.frac = 0;
        self.stream.seek_frame(frame);
    }

    fn seek_seconds(&mut self, seconds: f64) {
        let frame = (seconds.max(0.0) * f64::from(self.src.sample_rate)) as u64;
        self.seek(frame);
    }
}
