//! CPAL-based audio output backend.
//!
//! Opens an f32 stream on the default output device and converts the
//! mixer's packed little-endian PCM in the callback. The conversion
//! scratch is preallocated; the callback never allocates or blocks.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::traits::{AudioBackend, AudioError, PullFn, StreamFormat, StreamStatus};

/// Largest chunk converted per callback pass; bigger device requests are
/// processed in slices of this many frames.
const SCRATCH_FRAMES: usize = 4096;

/// CPAL-based audio output.
pub struct CpalBackend {
    stream: Option<Stream>,
    playing: bool,
    errored: Arc<AtomicBool>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            stream: None,
            playing: false,
            errored: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn open_stream(
        &mut self,
        rate: u32,
        channels: u16,
        format: StreamFormat,
        mut pull: PullFn,
    ) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Err(AudioError::OpenFailed("a stream is already open".into()));
        }

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoOutputDevice)?;

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let errored = Arc::clone(&self.errored);
        errored.store(false, Ordering::Relaxed);

        let bytes_per_sample = format.bytes_per_sample();
        let frame_bytes = channels as usize * bytes_per_sample;
        let mut scratch = vec![0u8; SCRATCH_FRAMES * frame_bytes];
        let samples_per_chunk = SCRATCH_FRAMES * channels as usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for chunk in data.chunks_mut(samples_per_chunk) {
                        let frames = chunk.len() / channels as usize;
                        let bytes = &mut scratch[..frames * frame_bytes];
                        pull(bytes, frames);

                        match format {
                            StreamFormat::Int16 => {
                                for (sample, raw) in chunk.iter_mut().zip(bytes.chunks_exact(2)) {
                                    let v = i16::from_le_bytes([raw[0], raw[1]]);
                                    *sample = f32::from(v) / 32768.0;
                                }
                            }
                            StreamFormat::Int24 => {
                                for (sample, raw) in chunk.iter_mut().zip(bytes.chunks_exact(3)) {
                                    let v = i32::from(raw[0])
                                        | (i32::from(raw[1]) << 8)
                                        | (i32::from(raw[2] as i8) << 16);
                                    *sample = v as f32 / 8_388_608.0;
                                }
                            }
                        }
                    }
                },
                move |err| {
                    eprintln!("Audio stream error: {}", err);
                    errored.store(true, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| AudioError::OpenFailed(e.to_string()))?;

        // streams start running on some hosts; hold in the paused state
        // until start_stream
        let _ = stream.pause();
        self.stream = Some(stream);
        self.playing = false;
        debug!("cpal stream open: {} Hz, {} ch, {:?}", rate, channels, format);
        Ok(())
    }

    fn start_stream(&mut self) -> Result<(), AudioError> {
        match &self.stream {
            Some(stream) => {
                stream
                    .play()
                    .map_err(|e| AudioError::StreamControl(e.to_string()))?;
                self.playing = true;
                Ok(())
            }
            None => Err(AudioError::NotOpen),
        }
    }

    fn stop_stream(&mut self) -> Result<(), AudioError> {
        match &self.stream {
            Some(stream) => {
                stream
                    .pause()
                    .map_err(|e| AudioError::StreamControl(e.to_string()))?;
                self.playing = false;
                Ok(())
            }
            None => Err(AudioError::NotOpen),
        }
    }

    fn close_stream(&mut self) {
        if self.stream.take().is_some() {
            debug!("cpal stream closed");
        }
        self.playing = false;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn status(&self) -> StreamStatus {
        if self.errored.load(Ordering::Relaxed) {
            return StreamStatus::Error;
        }
        match (&self.stream, self.playing) {
            (None, _) => StreamStatus::Inactive,
            (Some(_), true) => StreamStatus::Active,
            (Some(_), false) => StreamStatus::Paused,
        }
    }
}
