//! Mix core: slot tables, voice table and the per-packet mix loop.
//!
//! A `MixCore` lives inside a `Mutex` shared between the control plane
//! and the producer thread; the producer locks it for exactly one
//! `mix_packet` call at a time. Locking the core is therefore the
//! quiescence primitive for every mutation the voice flag atomics cannot
//! cover.

use crate::voice::MixerVoice;
use pm_core::{OutputFormat, Sample, Source};
use pm_kss::CartridgeKSS;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Output encoding, chosen once per format change and dispatched once
/// per packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encode {
    Int16,
    Int24,
}

/// Mixer state shared between control threads and the producer.
pub struct MixCore {
    format: OutputFormat,
    encode: Encode,
    /// Master volume 0..=255, shared with the control plane.
    master_volume: Arc<AtomicI32>,
    /// Sparse source table; a handle's slot field is index + 1.
    sources: Vec<Option<Box<dyn Source>>>,
    /// Sparse cartridge table, same indexing.
    cartridges: Vec<Option<CartridgeKSS>>,
    /// Fixed voice table, rebuilt on `set_format`.
    voices: Vec<Arc<MixerVoice>>,
    /// Per-voice owned sample cursors, parallel to `voices`.
    samples: Vec<Option<Box<dyn Sample>>>,
    /// 32-bit accumulation scratch, `packet_frames * channels` long.
    mix_buf: Vec<i32>,
    /// Per-voice read scratch, same length.
    sample_buf: Vec<i32>,
}

impl MixCore {
    pub fn new(master_volume: Arc<AtomicI32>) -> Self {
        Self {
            format: OutputFormat::default(),
            encode: Encode::Int16,
            master_volume,
            sources: Vec::new(),
            cartridges: Vec::new(),
            voices: Vec::new(),
            samples: Vec::new(),
            mix_buf: Vec::new(),
            sample_buf: Vec::new(),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Reconfigure the output format and rebuild the voice table. Only
    /// legal while the device is closed; every source and cartridge is
    /// informed of the new format.
    pub fn set_format(&mut self, format: OutputFormat, voice_count: usize) {
        self.format = format;
        self.encode = if format.bits == 24 { Encode::Int24 } else { Encode::Int16 };

        self.voices = (0..voice_count).map(|_| Arc::new(MixerVoice::new())).collect();
        self.samples = (0..voice_count).map(|_| None).collect();

        for source in self.sources.iter_mut().flatten() {
            source.set_output_format(format);
        }
        for cartridge in self.cartridges.iter_mut().flatten() {
            cartridge.set_output_format(format);
        }
    }

    /// Provision the scratch buffers for a packet size.
    pub fn set_packet_frames(&mut self, packet_frames: usize) {
        let len = packet_frames * self.format.channels as usize;
        self.mix_buf = vec![0; len];
        self.sample_buf = vec![0; len];
    }

    /// Shared handles to the voice table (control threads keep a mirror
    /// for lock-free flag access).
    pub fn voices(&self) -> &[Arc<MixerVoice>] {
        &self.voices
    }

    // === Slot tables ===

    /// Insert a source into the first free slot; returns the 1-based
    /// slot index.
    pub fn add_source(&mut self, mut source: Box<dyn Source>) -> usize {
        source.set_output_format(self.format);
        match self.sources.iter_mut().position(|s| s.is_none()) {
            Some(idx) => {
                self.sources[idx] = Some(source);
                idx + 1
            }
            None => {
                self.sources.push(Some(source));
                self.sources.len()
            }
        }
    }

    pub fn has_source(&self, slot: u16) -> bool {
        slot >= 1
            && self
                .sources
                .get(slot as usize - 1)
                .is_some_and(|s| s.is_some())
    }

    /// Insert a cartridge into the first free slot; returns the 1-based
    /// slot index.
    pub fn add_cartridge(&mut self, cartridge: CartridgeKSS) -> usize {
        match self.cartridges.iter_mut().position(|c| c.is_none()) {
            Some(idx) => {
                self.cartridges[idx] = Some(cartridge);
                idx + 1
            }
            None => {
                self.cartridges.push(Some(cartridge));
                self.cartridges.len()
            }
        }
    }

    pub fn cartridge_mut(&mut self, slot: u16) -> Option<&mut CartridgeKSS> {
        if slot == 0 {
            return None;
        }
        self.cartridges.get_mut(slot as usize - 1)?.as_mut()
    }

    pub fn cartridges_mut(&mut self) -> impl Iterator<Item = &mut CartridgeKSS> {
        self.cartridges.iter_mut().flatten()
    }

    /// Remove one source, invalidating every voice that plays it.
    pub fn drop_source_slot(&mut self, slot: u16) -> bool {
        if !self.has_source(slot) {
            return false;
        }
        for (voice, sample) in self.voices.iter().zip(self.samples.iter_mut()) {
            if voice.source_slot.load(Ordering::Relaxed) == slot {
                voice.active.store(false, Ordering::Release);
                voice.stopped.store(true, Ordering::Relaxed);
                voice.paused.store(false, Ordering::Relaxed);
                voice.looped.store(false, Ordering::Relaxed);
                voice.source_slot.store(0, Ordering::Relaxed);
                *sample = None;
            }
        }
        self.sources[slot as usize - 1] = None;
        true
    }

    /// Remove one cartridge.
    pub fn drop_cartridge_slot(&mut self, slot: u16) -> bool {
        if slot == 0 || slot as usize > self.cartridges.len() {
            return false;
        }
        let entry = &mut self.cartridges[slot as usize - 1];
        if entry.is_none() {
            return false;
        }
        *entry = None;
        true
    }

    /// Remove every source, cartridge and voice binding.
    pub fn drop_all(&mut self) {
        for (voice, sample) in self.voices.iter().zip(self.samples.iter_mut()) {
            voice.active.store(false, Ordering::Release);
            voice.stopped.store(true, Ordering::Relaxed);
            voice.paused.store(false, Ordering::Relaxed);
            voice.looped.store(false, Ordering::Relaxed);
            voice.source_slot.store(0, Ordering::Relaxed);
            *sample = None;
        }
        self.sources.clear();
        self.cartridges.clear();
    }

    // === Voice control ===

    /// Bind a free voice to a source and activate it. The cached sample
    /// is reused (rewound) when the voice last played the same slot;
    /// otherwise a fresh cursor is created.
    pub fn start_voice(&mut self, voice_idx: usize, slot: u16, looped: bool, paused: bool) -> bool {
        if voice_idx >= self.voices.len() || !self.has_source(slot) {
            return false;
        }
        let voice = &self.voices[voice_idx];

        if voice.source_slot.load(Ordering::Relaxed) != slot || self.samples[voice_idx].is_none() {
            let source = self.sources[slot as usize - 1].as_ref().expect("checked above");
            match source.create_sample() {
                Some(sample) => {
                    self.samples[voice_idx] = Some(sample);
                    voice.source_slot.store(slot, Ordering::Relaxed);
                }
                None => return false,
            }
        } else if let Some(sample) = self.samples[voice_idx].as_mut() {
            sample.seek(0);
        }

        voice.stopped.store(false, Ordering::Relaxed);
        voice.looped.store(looped, Ordering::Relaxed);
        voice.paused.store(paused, Ordering::Relaxed);
        voice.active.store(true, Ordering::Release);
        true
    }

    // === Mixing ===

    /// Mix one packet: sum every active voice and cartridge line into the
    /// 32-bit scratch, apply the master volume, and encode into `out` as
    /// packed little-endian PCM. Writes exactly
    /// `frames * channels * bits/8` bytes.
    pub fn mix_packet(&mut self, out: &mut [u8], frames: usize) {
        let channels = self.format.channels as usize;
        let count = frames * channels;
        let mix = &mut self.mix_buf[..count];
        mix.fill(0);

        for (voice, sample_slot) in self.voices.iter().zip(self.samples.iter_mut()) {
            if !voice.active.load(Ordering::Acquire) {
                continue;
            }

            let mut deactivate = false;
            match sample_slot.as_mut() {
                None => deactivate = true,
                Some(_) if voice.stopped.load(Ordering::Relaxed) => deactivate = true,
                Some(sample) => {
                    if !voice.paused.load(Ordering::Relaxed) {
                        let buf = &mut self.sample_buf[..count];
                        let mut produced = sample.read(buf, frames);
                        if voice.looped.load(Ordering::Relaxed) {
                            while produced < frames {
                                let got =
                                    sample.read(&mut buf[produced * channels..], frames - produced);
                                if got == 0 {
                                    break;
                                }
                                produced += got;
                            }
                        }
                        for (acc, &s) in mix.iter_mut().zip(buf[..produced * channels].iter()) {
                            *acc += s;
                        }
                        if produced < frames {
                            deactivate = true;
                        }
                    }
                }
            }

            if deactivate {
                voice.stopped.store(true, Ordering::Relaxed);
                voice.active.store(false, Ordering::Release);
            }
        }

        for cartridge in self.cartridges.iter_mut().flatten() {
            cartridge.read_into(mix, frames);
        }

        let volume = i64::from(self.master_volume.load(Ordering::Relaxed));
        for value in mix.iter_mut() {
            *value = ((i64::from(*value) * volume) >> 8) as i32;
        }

        match self.encode {
            Encode::Int16 => {
                for (chunk, &value) in out.chunks_exact_mut(2).zip(mix.iter()) {
                    chunk[0] = value as u8;
                    chunk[1] = (value >> 8) as u8;
                }
            }
            Encode::Int24 => {
                for (chunk, &value) in out.chunks_exact_mut(3).zip(mix.iter()) {
                    chunk[0] = value as u8;
                    chunk[1] = (value >> 8) as u8;
                    chunk[2] = (value >> 16) as u8;
                }
            }
        }
    }
}
