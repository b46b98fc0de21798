//! Mixer facade: handle routing, device lifecycle, control plane.

use crate::error::MixerError;
use crate::handle;
use log::{debug, warn};
use pm_audio::{AudioBackend, CpalBackend, PullFn, StreamFormat, StreamStatus};
use pm_core::{OutputFormat, Source};
use pm_engine::{BufferedMixer, MixCore, MixerVoice, PcmSource, VorbisSource};
use pm_formats::{is_wav, load_wav};
use pm_kss::{CartridgeKSS, KssEngine};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

/// Overall mixer state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MixerStatus {
    Stopped,
    Paused,
    Running,
    Error,
}

/// Default packet sizing targets 100 ms of latency across 5 packets.
const DEFAULT_PACKET_COUNT: usize = 5;
const DEFAULT_LATENCY_MS: usize = 100;

/// Handle fields are 12 bits wide.
const MAX_SLOT: usize = 0xFFF;
const MAX_VOICES: usize = 0xFFF;

/// The polyphonic mixer.
///
/// Control methods are callable from any thread owning the mixer while
/// the audio device runs: voice flags are atomic, and everything else is
/// serialized against the producer through the core mutex it holds for
/// exactly one packet at a time.
pub struct Mixer {
    backend: Box<dyn AudioBackend>,
    core: Arc<Mutex<MixCore>>,
    /// Mirror of the core's voice table for lock-free flag routing.
    voices: Vec<Arc<MixerVoice>>,
    buffered: Option<BufferedMixer>,
    master_volume: Arc<AtomicI32>,
    format: OutputFormat,
    stream_open: bool,
}

impl Mixer {
    /// A mixer driving the default audio device.
    pub fn new() -> Self {
        Self::with_backend(Box::new(CpalBackend::new()))
    }

    /// A mixer over a caller-supplied device binding.
    pub fn with_backend(backend: Box<dyn AudioBackend>) -> Self {
        let master_volume = Arc::new(AtomicI32::new(128));
        Self {
            backend,
            core: Arc::new(Mutex::new(MixCore::new(Arc::clone(&master_volume)))),
            voices: Vec::new(),
            buffered: None,
            master_volume,
            format: OutputFormat::default(),
            stream_open: false,
        }
    }

    /* ---------------- configuration ---------------- */

    /// Set the output format and the number of simultaneous voices.
    /// Only legal while the mixer is stopped. Existing sources are
    /// reconfigured; all voices are released.
    pub fn set_format(&mut self, rate: u32, stereo: bool, bits: u16, voice_count: usize) -> bool {
        match self.try_set_format(rate, stereo, bits, voice_count) {
            Ok(()) => true,
            Err(err) => {
                warn!("set_format refused: {}", err);
                false
            }
        }
    }

    fn try_set_format(
        &mut self,
        rate: u32,
        stereo: bool,
        bits: u16,
        voice_count: usize,
    ) -> Result<(), MixerError> {
        if self.stream_open {
            return Err(MixerError::AlreadyStarted);
        }
        let format = OutputFormat { rate, channels: if stereo { 2 } else { 1 }, bits };
        if !format.is_valid() || voice_count == 0 || voice_count > MAX_VOICES {
            return Err(MixerError::BadConfig);
        }
        self.format = format;
        {
            let mut core = self.core.lock().unwrap();
            core.set_format(format, voice_count);
            self.voices = core.voices().to_vec();
        }

        let (packet_count, packet_frames) = match &self.buffered {
            Some(ring) => (ring.packet_count(), ring.packet_frames()),
            None => {
                let count = DEFAULT_PACKET_COUNT;
                (count, DEFAULT_LATENCY_MS * rate as usize / count / 1000)
            }
        };
        self.provision_ring(packet_count, packet_frames)
    }

    /// Override the packet ring geometry (packet count and frames per
    /// packet). Only legal while the mixer is stopped.
    pub fn set_mixer_buffer_parameters(&mut self, packet_count: usize, packet_frames: usize) -> bool {
        let result = if self.stream_open {
            Err(MixerError::AlreadyStarted)
        } else {
            self.provision_ring(packet_count, packet_frames)
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("set_mixer_buffer_parameters refused: {}", err);
                false
            }
        }
    }

    fn provision_ring(&mut self, packet_count: usize, packet_frames: usize) -> Result<(), MixerError> {
        if packet_count < 2 || packet_frames == 0 {
            return Err(MixerError::BadConfig);
        }
        let mut ring = BufferedMixer::new(packet_count, packet_frames, self.format.frame_bytes());
        self.core.lock().unwrap().set_packet_frames(packet_frames);

        let core = Arc::clone(&self.core);
        ring.set_mix_fn(Box::new(move |out, frames| {
            core.lock().unwrap().mix_packet(out, frames);
        }));
        self.buffered = Some(ring);
        Ok(())
    }

    /// Master volume, 0 (mute) to 255 (unity minus one step).
    pub fn set_master_volume(&mut self, volume: i32) {
        self.master_volume.store(volume & 0xFF, Ordering::Relaxed);
    }

    pub fn master_volume(&self) -> i32 {
        self.master_volume.load(Ordering::Relaxed)
    }

    /* ---------------- start / pause / stop ---------------- */

    /// Start (`true`) or stop (`false`) the mixer: device stream plus
    /// producer thread. Returns `false` when starting fails; the mixer
    /// is left stopped in that case.
    pub fn start_stop_mixer(&mut self, start: bool) -> bool {
        if start {
            return match self.try_start() {
                Ok(()) => true,
                Err(err) => {
                    warn!("start_mixer failed: {}", err);
                    false
                }
            };
        }

        if self.stream_open {
            let _ = self.backend.stop_stream();
            self.backend.close_stream();
            self.stream_open = false;
            debug!("mixer stopped");
        }
        if let Some(ring) = self.buffered.as_mut() {
            ring.stop();
        }
        true
    }

    fn try_start(&mut self) -> Result<(), MixerError> {
        if self.stream_open {
            return Err(MixerError::AlreadyStarted);
        }
        let Some(ring) = self.buffered.as_mut() else {
            return Err(MixerError::NotStarted);
        };

        let mut reader = ring.make_reader();
        let pull: PullFn = Box::new(move |out, _frames| reader.read(out));
        let stream_format =
            if self.format.bits == 24 { StreamFormat::Int24 } else { StreamFormat::Int16 };

        self.backend
            .open_stream(self.format.rate, self.format.channels, stream_format, pull)?;

        ring.start();
        if !ring.is_started() {
            self.backend.close_stream();
            return Err(MixerError::NotStarted);
        }

        self.stream_open = true;
        debug!("mixer started: {:?}", self.format);

        // unpause the device; unwind completely if it refuses
        if let Err(err) = self.backend.start_stream() {
            self.backend.close_stream();
            self.stream_open = false;
            if let Some(ring) = self.buffered.as_mut() {
                ring.stop();
            }
            return Err(MixerError::Device(err));
        }
        Ok(())
    }

    pub fn start_mixer(&mut self) -> bool {
        self.start_stop_mixer(true)
    }

    pub fn stop_mixer(&mut self) -> bool {
        self.start_stop_mixer(false)
    }

    /// Pause or resume the device stream. The producer keeps filling the
    /// ring until full, which is harmless.
    pub fn pause_resume_mixer(&mut self, pause: bool) -> bool {
        if !self.stream_open {
            return pause;
        }
        match self.backend.status() {
            StreamStatus::Error => false,
            StreamStatus::Active if pause => self.backend.stop_stream().is_ok(),
            StreamStatus::Paused | StreamStatus::Inactive if !pause => {
                self.backend.start_stream().is_ok()
            }
            _ => true,
        }
    }

    pub fn pause_mixer(&mut self) -> bool {
        self.pause_resume_mixer(true)
    }

    pub fn resume_mixer(&mut self) -> bool {
        self.pause_resume_mixer(false)
    }

    pub fn mixer_status(&self) -> MixerStatus {
        if !self.stream_open {
            return MixerStatus::Stopped;
        }
        match self.backend.status() {
            StreamStatus::Error => MixerStatus::Error,
            StreamStatus::Active => MixerStatus::Running,
            StreamStatus::Paused | StreamStatus::Inactive => MixerStatus::Paused,
        }
    }

    /* ---------------- sources ---------------- */

    /// Add a WAV or Ogg Vorbis file as a source. Returns a source handle,
    /// or 0 on failure (nothing is published in that case).
    pub fn add_source(&mut self, path: impl AsRef<Path>) -> u32 {
        let path = path.as_ref();
        match self.load_source(path) {
            Ok(handle) => handle,
            Err(err) => {
                warn!("add_source {:?}: {}", path, err);
                0
            }
        }
    }

    fn load_source(&mut self, path: &Path) -> Result<u32, MixerError> {
        let bytes = std::fs::read(path)
            .map_err(|e| MixerError::BadFormat(pm_formats::FormatError::Io(e.to_string())))?;
        let source: Box<dyn Source> = if is_wav(&bytes) {
            let wav = load_wav(&bytes)?;
            debug!(
                "loaded wav {:?}: {} Hz, {} ch, {:?}",
                path, wav.sample_rate, wav.channels, wav.format
            );
            Box::new(PcmSource::from_wav(wav)?)
        } else {
            Box::new(VorbisSource::open(path)?)
        };

        let slot = self.core.lock().unwrap().add_source(source);
        if slot > MAX_SLOT {
            self.core.lock().unwrap().drop_source_slot(slot as u16);
            return Err(MixerError::BadConfig);
        }
        Ok(handle::source_handle(handle::KIND_SOURCE, slot as u32))
    }

    /// Add a KSS cartridge over a loaded engine image with `lines`
    /// parallel voices. Returns a KSS source handle, or 0 on failure.
    pub fn add_source_kss(
        &mut self,
        engine: Arc<dyn KssEngine>,
        lines: usize,
        silent_limit_ms: u32,
    ) -> u32 {
        if lines == 0 {
            return 0;
        }
        let cartridge = CartridgeKSS::new(engine, lines, self.format, silent_limit_ms);
        let slot = self.core.lock().unwrap().add_cartridge(cartridge);
        if slot > MAX_SLOT {
            self.core.lock().unwrap().drop_cartridge_slot(slot as u16);
            return 0;
        }
        handle::source_handle(handle::KIND_KSS, slot as u32)
    }

    /// Remove a source (handle 0: every source and cartridge), stopping
    /// and unbinding any voices playing it.
    pub fn drop_source(&mut self, source_handle: u32) -> bool {
        let mut core = self.core.lock().unwrap();
        if source_handle == 0 {
            core.drop_all();
            return true;
        }
        let slot = handle::slot(source_handle) as u16;
        match handle::kind(source_handle) {
            handle::KIND_SOURCE => core.drop_source_slot(slot),
            handle::KIND_KSS => core.drop_cartridge_slot(slot),
            _ => false,
        }
    }

    /* ---------------- playback ---------------- */

    /// Play a source on a free voice. Returns the play handle, or 0 when
    /// no voice is free or the handle is stale.
    pub fn play_source(&mut self, source_handle: u32, looped: bool, paused: bool) -> u32 {
        if source_handle == 0 || handle::kind(source_handle) != handle::KIND_SOURCE {
            return 0;
        }
        let slot = handle::slot(source_handle) as u16;
        let mut core = self.core.lock().unwrap();
        if !core.has_source(slot) {
            return 0;
        }
        for (idx, voice) in self.voices.iter().enumerate() {
            if voice.is_free() {
                if core.start_voice(idx, slot, looped, paused) {
                    return handle::play_handle(handle::source_id(source_handle), idx as u32 + 1);
                }
                return 0;
            }
        }
        0
    }

    /// Stop playback. Handle 0 stops everything; a source handle stops
    /// every voice of that source; a play handle stops one voice. Stale
    /// handles no-op.
    pub fn stop_playback(&mut self, play_handle: u32) {
        if play_handle == 0 {
            for voice in &self.voices {
                if voice.active.load(Ordering::Acquire) {
                    voice.stopped.store(true, Ordering::Relaxed);
                    voice.paused.store(false, Ordering::Relaxed);
                    if !self.stream_open {
                        voice.looped.store(false, Ordering::Relaxed);
                        voice.active.store(false, Ordering::Release);
                    }
                }
            }
            let mut core = self.core.lock().unwrap();
            for cartridge in core.cartridges_mut() {
                cartridge.stop_active();
            }
            return;
        }

        if handle::kind(play_handle) == handle::KIND_KSS {
            let line = handle::voice(play_handle) as usize;
            self.with_cartridge(play_handle, line > 0, (), |cartridge, line_id| {
                if line_id > 0 {
                    cartridge.stop(line_id);
                } else {
                    cartridge.stop_active();
                }
            });
            return;
        }

        let slot = handle::slot(play_handle) as u16;
        if slot == 0 {
            return;
        }
        let stream_open = self.stream_open;
        let stop = |voice: &MixerVoice| {
            voice.stopped.store(true, Ordering::Relaxed);
            if !stream_open {
                voice.active.store(false, Ordering::Release);
            }
        };
        match handle::voice(play_handle) as usize {
            0 => {
                for voice in &self.voices {
                    if voice.plays_slot(slot) {
                        stop(voice);
                    }
                }
            }
            voice_id => {
                if let Some(voice) = self.voices.get(voice_id - 1) {
                    if voice.plays_slot(slot) {
                        stop(voice);
                    }
                }
            }
        }
    }

    /// Pause or resume playback with the same routing as
    /// [`Mixer::stop_playback`].
    pub fn pause_resume_playback(&mut self, play_handle: u32, pause: bool) {
        if play_handle == 0 {
            for voice in &self.voices {
                if voice.active.load(Ordering::Acquire) {
                    voice.paused.store(pause, Ordering::Relaxed);
                }
            }
            let mut core = self.core.lock().unwrap();
            for cartridge in core.cartridges_mut() {
                cartridge.set_pause_active(pause);
            }
            return;
        }

        if handle::kind(play_handle) == handle::KIND_KSS {
            let line = handle::voice(play_handle) as usize;
            self.with_cartridge(play_handle, line > 0, (), |cartridge, line_id| {
                if line_id > 0 {
                    cartridge.set_pause(line_id, pause);
                } else {
                    cartridge.set_pause_active(pause);
                }
            });
            return;
        }

        let slot = handle::slot(play_handle) as u16;
        if slot == 0 {
            return;
        }
        match handle::voice(play_handle) as usize {
            0 => {
                for voice in &self.voices {
                    if voice.plays_slot(slot) {
                        voice.paused.store(pause, Ordering::Relaxed);
                    }
                }
            }
            voice_id => {
                if let Some(voice) = self.voices.get(voice_id - 1) {
                    if voice.plays_slot(slot) {
                        voice.paused.store(pause, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    pub fn pause_playback(&mut self, play_handle: u32) {
        self.pause_resume_playback(play_handle, true);
    }

    pub fn resume_playback(&mut self, play_handle: u32) {
        self.pause_resume_playback(play_handle, false);
    }

    /// Change the loop mode of a playing voice.
    pub fn set_loop(&mut self, play_handle: u32, looped: bool) {
        if handle::kind(play_handle) != handle::KIND_SOURCE {
            return;
        }
        let slot = handle::slot(play_handle) as u16;
        let voice_id = handle::voice(play_handle) as usize;
        if slot == 0 || voice_id == 0 {
            return;
        }
        if let Some(voice) = self.voices.get(voice_id - 1) {
            if voice.plays_slot(slot) {
                voice.looped.store(looped, Ordering::Relaxed);
            }
        }
    }

    /* ---------------- KSS control ---------------- */

    /// Play a KSS track on a free cartridge line. With `force`, the
    /// oldest forcable line is preempted when none is free. Returns a
    /// play handle or 0.
    pub fn play_kss_track(
        &mut self,
        kss_handle: u32,
        track: u8,
        autostop: bool,
        forcable: bool,
        force: bool,
    ) -> u32 {
        self.with_cartridge(kss_handle, false, 0, |cartridge, _| {
            let mut line = cartridge.active_line(track, autostop, forcable);
            if line == 0 && force {
                line = cartridge.force_line(track, autostop, forcable);
            }
            if line == 0 {
                0
            } else {
                handle::play_handle(handle::source_id(kss_handle), line as u32)
            }
        })
    }

    /// Retarget a playing KSS line, optionally fading the current track
    /// out over `fade_out_ms` first.
    pub fn update_kss_track(
        &mut self,
        kss_handle: u32,
        new_track: u8,
        autostop: bool,
        forcable: bool,
        fade_out_ms: u32,
    ) -> bool {
        self.with_cartridge(kss_handle, true, false, |cartridge, line_id| {
            cartridge.update_line(line_id, new_track, autostop, forcable, fade_out_ms)
        })
    }

    /// Update the volume of one line (play handle) or a whole cartridge
    /// (source handle). Volume range 0..=100.
    pub fn update_kss_volume(&mut self, kss_handle: u32, volume: i32) -> bool {
        let is_line = handle::voice(kss_handle) > 0;
        self.with_cartridge(kss_handle, is_line, false, |cartridge, line_id| {
            if is_line {
                cartridge.set_line_volume(line_id, volume);
            } else {
                cartridge.set_master_volume(volume);
            }
            true
        })
    }

    /// Update the VSync frequency of one line, one cartridge, or (handle
    /// 0) every cartridge.
    pub fn update_kss_frequency(&mut self, kss_handle: u32, hz: u32) -> bool {
        if kss_handle == 0 {
            let mut core = self.core.lock().unwrap();
            for cartridge in core.cartridges_mut() {
                cartridge.set_vsync_hz(hz);
            }
            return true;
        }
        let is_line = handle::voice(kss_handle) > 0;
        self.with_cartridge(kss_handle, is_line, false, |cartridge, line_id| {
            if is_line {
                cartridge.set_line_vsync_hz(line_id, hz);
            } else {
                cartridge.set_vsync_hz(hz);
            }
            true
        })
    }

    /// Number of currently active lines of a cartridge.
    pub fn kss_active_lines_count(&self, kss_handle: u32) -> usize {
        self.with_cartridge(kss_handle, false, 0, |cartridge, _| cartridge.active_lines_count())
    }

    /// Playback time of a KSS line in milliseconds.
    pub fn kss_playtime_millis(&self, kss_handle: u32) -> u64 {
        self.with_cartridge(kss_handle, true, 0, |cartridge, line_id| {
            cartridge.playtime_millis(line_id)
        })
    }

    /// Route a KSS handle to its cartridge under the core lock (the
    /// quiescence boundary for cartridge mutation). `need_line` demands a
    /// valid 1-based line field.
    fn with_cartridge<T>(
        &self,
        kss_handle: u32,
        need_line: bool,
        default: T,
        action: impl FnOnce(&mut CartridgeKSS, usize) -> T,
    ) -> T {
        if handle::kind(kss_handle) != handle::KIND_KSS {
            return default;
        }
        let slot = handle::slot(kss_handle) as u16;
        if slot == 0 {
            return default;
        }
        let line_id = handle::voice(kss_handle) as usize;
        let mut core = self.core.lock().unwrap();
        match core.cartridge_mut(slot) {
            Some(cartridge) => {
                if need_line && (line_id == 0 || line_id > cartridge.line_count()) {
                    return default;
                }
                action(cartridge, line_id)
            }
            None => default,
        }
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.start_stop_mixer(false);
    }
}
