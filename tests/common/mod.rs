//! Shared test support: a mock audio backend driven by hand and a
//! scripted KSS engine.

#![allow(dead_code)]

use polymix::{
    AudioBackend, AudioError, Chip, KssEngine, KssPlayer, PullFn, StreamFormat, StreamStatus,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/* ---------------- mock audio backend ---------------- */

#[derive(Default)]
struct MockState {
    pull: Option<PullFn>,
    playing: bool,
    rate: u32,
    channels: u16,
    format: Option<StreamFormat>,
}

/// Backend whose callback the test invokes by hand through a
/// [`MockHandle`].
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle to the mock backend.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

pub fn mock_backend() -> (MockBackend, MockHandle) {
    let state = Arc::new(Mutex::new(MockState::default()));
    (MockBackend { state: Arc::clone(&state) }, MockHandle { state })
}

impl AudioBackend for MockBackend {
    fn open_stream(
        &mut self,
        rate: u32,
        channels: u16,
        format: StreamFormat,
        pull: PullFn,
    ) -> Result<(), AudioError> {
        let mut state = self.state.lock().unwrap();
        state.pull = Some(pull);
        state.rate = rate;
        state.channels = channels;
        state.format = Some(format);
        state.playing = false;
        Ok(())
    }

    fn start_stream(&mut self) -> Result<(), AudioError> {
        self.state.lock().unwrap().playing = true;
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<(), AudioError> {
        self.state.lock().unwrap().playing = false;
        Ok(())
    }

    fn close_stream(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.pull = None;
        state.playing = false;
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().pull.is_some()
    }

    fn status(&self) -> StreamStatus {
        let state = self.state.lock().unwrap();
        match (&state.pull, state.playing) {
            (None, _) => StreamStatus::Inactive,
            (Some(_), true) => StreamStatus::Active,
            (Some(_), false) => StreamStatus::Paused,
        }
    }
}

impl MockHandle {
    /// Invoke the pull callback for one packet of `frames` frames,
    /// returning the raw bytes (silence when no stream is open).
    pub fn pull_bytes(&self, frames: usize) -> Vec<u8> {
        let mut state = self.state.lock().unwrap();
        let frame_bytes = state.channels as usize
            * state.format.map_or(2, |f| f.bytes_per_sample());
        let mut out = vec![0u8; frames * frame_bytes];
        if let Some(pull) = state.pull.as_mut() {
            pull(&mut out, frames);
        }
        out
    }

    /// Pull one 16-bit packet decoded to samples.
    pub fn pull_i16(&self, frames: usize) -> Vec<i16> {
        self.pull_bytes(frames)
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    /// Pull packets until one satisfies `accept`, with a generous
    /// timeout. Returns the accepted packet.
    pub fn pull_until(
        &self,
        frames: usize,
        mut accept: impl FnMut(&[i16]) -> bool,
    ) -> Option<Vec<i16>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let packet = self.pull_i16(frames);
            if accept(&packet) {
                return Some(packet);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }
}

/// Reference attenuation: the mixer scales by `volume / 256` with an
/// arithmetic shift.
pub fn scaled(value: i32, volume: i32) -> i16 {
    ((i64::from(value) * i64::from(volume)) >> 8) as i16
}

/// Wait (bounded) for a condition driven by the producer thread.
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/* ---------------- wav fixtures ---------------- */

/// Write interleaved samples to a temp WAV file and return its path.
pub fn temp_wav(name: &str, samples: &[i16], channels: u16, rate: u32) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "polymix_test_{}_{}.wav",
        std::process::id(),
        name
    ));
    let mut buf = Vec::new();
    polymix::write_wav(&mut buf, samples, channels, rate).unwrap();
    std::fs::write(&path, buf).unwrap();
    path
}

/* ---------------- scripted kss engine ---------------- */

/// Engine whose players render `track * 100` as a constant sample value.
pub struct ScriptedEngine {
    stop_after: Option<u64>,
    fade_seen: Arc<AtomicBool>,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { stop_after: None, fade_seen: Arc::new(AtomicBool::new(false)) })
    }

    pub fn stopping_after(frames: u64) -> Arc<Self> {
        Arc::new(Self { stop_after: Some(frames), fade_seen: Arc::new(AtomicBool::new(false)) })
    }

    pub fn fade_seen(&self) -> bool {
        self.fade_seen.load(Ordering::Relaxed)
    }
}

impl KssEngine for ScriptedEngine {
    fn new_player(&self, _rate: u32, _channels: u16, _bits: u16) -> Box<dyn KssPlayer> {
        Box::new(ScriptedPlayer {
            track: 0,
            rendered: 0,
            vsync: 0,
            stop_after: self.stop_after,
            fade_seen: Arc::clone(&self.fade_seen),
        })
    }
}

struct ScriptedPlayer {
    track: u8,
    rendered: u64,
    vsync: u32,
    stop_after: Option<u64>,
    fade_seen: Arc<AtomicBool>,
}

impl KssPlayer for ScriptedPlayer {
    fn reset(&mut self, track: u8, _cpu_speed: u32) {
        self.track = track;
        self.rendered = 0;
    }
    fn render(&mut self, out: &mut [i16], frames: usize) {
        out.fill(i16::from(self.track) * 100);
        self.rendered += frames as u64;
    }
    fn stop_flag(&self) -> bool {
        self.stop_after.is_some_and(|limit| self.rendered >= limit)
    }
    fn decoded_frames(&self) -> u64 {
        self.rendered
    }
    fn fade_start(&mut self, _fade_ms: u32) {
        self.fade_seen.store(true, Ordering::Relaxed);
    }
    fn advance_silently(&mut self, frames: u64) {
        self.rendered += frames;
    }
    fn set_master_volume(&mut self, _volume: i32) {}
    fn set_silent_limit(&mut self, _limit_ms: u32) {}
    fn set_vsync_hz(&mut self, hz: u32) {
        self.vsync = hz;
    }
    fn vsync_hz(&self) -> u32 {
        self.vsync
    }
    fn set_quality(&mut self, _chip: Chip, _quality: u32) {}
    fn set_pan_device(&mut self, _chip: Chip, _pan: i32) {}
    fn set_pan_channel(&mut self, _chip: Chip, _channel: u32, _pan: i32) {}
}
