//! Cartridge: a bank of emulator voices sharing one program image.

use crate::{Chip, KssEngine, KssPlayer};
use log::debug;
use pm_core::OutputFormat;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The emulator always renders 16-bit PCM; 24-bit output is produced by
/// shifting during accumulation.
const KSS_BITS: u16 = 16;

/// How a line's rendered frames are written into the shared mix buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineMix {
    /// Add 16-bit values as-is.
    Add16,
    /// Add 16-bit values shifted into 24-bit range.
    Add24,
    /// Overwrite with 16-bit values.
    Copy16,
    /// Overwrite with 16-bit values shifted into 24-bit range.
    Copy24,
}

/// One emulator voice with its track state machine.
///
/// The lifecycle flags are atomic so control threads can observe and
/// request transitions lock-free; the track fields and the player itself
/// change only under producer quiescence.
struct KssLine {
    active: AtomicBool,
    paused: AtomicBool,
    autostop: AtomicBool,
    forcable: AtomicBool,
    /// Activation sequence stamp; smaller is older.
    id: u64,
    current_track: u8,
    next_track: u8,
    /// Remaining fade frames; while non-zero, `next_track` stays pending.
    transition_fadeout: u64,
    volume: i32,
    player: Box<dyn KssPlayer>,
}

impl KssLine {
    fn new(player: Box<dyn KssPlayer>, volume: i32) -> Self {
        Self {
            active: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            autostop: AtomicBool::new(false),
            forcable: AtomicBool::new(true),
            id: 0,
            current_track: 0,
            next_track: 0,
            transition_fadeout: 0,
            volume,
            player,
        }
    }
}

/// A bank of `N` parallel emulator voices over one program image.
pub struct CartridgeKSS {
    engine: Arc<dyn KssEngine>,
    lines: Vec<KssLine>,
    rate: u32,
    channels: u16,
    out_bits: u16,
    silent_limit_ms: u32,
    master_volume: i32,
    /// Monotonic activation counter feeding line ids.
    next_id: u64,
    /// Render scratch shared by all lines.
    scratch: Vec<i16>,
}

impl CartridgeKSS {
    /// Create a cartridge with `line_count` voices (at least one).
    pub fn new(
        engine: Arc<dyn KssEngine>,
        line_count: usize,
        format: OutputFormat,
        silent_limit_ms: u32,
    ) -> Self {
        let master_volume = 60;
        let mut cartridge = Self {
            engine,
            lines: Vec::new(),
            rate: format.rate,
            channels: format.channels,
            out_bits: format.bits,
            silent_limit_ms,
            master_volume,
            next_id: 0,
            scratch: Vec::new(),
        };
        for _ in 0..line_count.max(1) {
            let player = cartridge.make_player(master_volume, 0);
            cartridge.lines.push(KssLine::new(player, master_volume));
        }
        cartridge
    }

    fn make_player(&self, volume: i32, vsync_hz: u32) -> Box<dyn KssPlayer> {
        let mut player = self.engine.new_player(self.rate, self.channels, KSS_BITS);
        for chip in [Chip::Psg, Chip::Scc, Chip::Opl, Chip::Opll] {
            player.set_quality(chip, 1);
        }
        if self.channels > 1 {
            // PSG a little right of center, SCC a little left, OPLL
            // channels alternating right/left
            player.set_pan_device(Chip::Psg, -32);
            player.set_pan_device(Chip::Scc, 32);
            for ch in 0..6 {
                player.set_pan_channel(Chip::Opll, ch, if ch % 2 == 0 { 1 } else { 2 });
            }
        }
        player.set_silent_limit(self.silent_limit_ms);
        player.set_master_volume(volume);
        player.set_vsync_hz(vsync_hz);
        player
    }

    /// Rebind a line to a fresh player, resetting its lifecycle but
    /// keeping its volume and vsync frequency.
    fn reinit_line(&mut self, idx: usize) {
        let volume = self.lines[idx].volume;
        let vsync = self.lines[idx].player.vsync_hz();
        let player = self.make_player(volume, vsync);

        let line = &mut self.lines[idx];
        line.active.store(false, Ordering::Release);
        line.paused.store(false, Ordering::Relaxed);
        line.autostop.store(false, Ordering::Relaxed);
        line.forcable.store(true, Ordering::Relaxed);
        line.current_track = 0;
        line.next_track = 0;
        line.transition_fadeout = 0;
        line.player = player;
    }

    /// Reconfigure the output format. Requires producer quiescence; every
    /// line is rebound and deactivated.
    pub fn set_output_format(&mut self, format: OutputFormat) -> bool {
        if !format.is_valid() {
            return false;
        }
        self.rate = format.rate;
        self.channels = format.channels;
        self.out_bits = format.bits;
        for idx in 0..self.lines.len() {
            self.reinit_line(idx);
        }
        true
    }

    /// Resize the voice bank. Requires producer quiescence.
    pub fn set_lines_count(&mut self, line_count: usize) -> bool {
        if line_count == 0 {
            return false;
        }
        if line_count < self.lines.len() {
            self.lines.truncate(line_count);
        } else {
            while self.lines.len() < line_count {
                let player = self.make_player(self.master_volume, 0);
                self.lines.push(KssLine::new(player, self.master_volume));
            }
        }
        true
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn active_lines_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.active.load(Ordering::Acquire))
            .count()
    }

    /// Mark line fields and stamp an activation id; `active` is set last.
    fn activate(&mut self, idx: usize, track: u8, autostop: bool, forcable: bool, fade_out_ms: u32) {
        debug!("kss line {}: track {} (fade {} ms)", idx + 1, track, fade_out_ms);
        let id = self.next_id;
        self.next_id += 1;

        let rate = self.rate;
        let line = &mut self.lines[idx];
        line.autostop.store(autostop, Ordering::Relaxed);
        line.next_track = track;
        line.paused.store(false, Ordering::Relaxed);
        line.forcable.store(forcable, Ordering::Relaxed);
        line.id = id;

        if fade_out_ms > 0 {
            line.transition_fadeout = u64::from(fade_out_ms) * u64::from(rate) / 1000;
            line.player.fade_start(fade_out_ms);
        } else {
            line.transition_fadeout = 0;
        }

        line.active.store(true, Ordering::Release);
    }

    /// Find and activate a free line. Returns the 1-based line index, or
    /// 0 when every line is busy. Touches only inactive lines.
    pub fn active_line(&mut self, track: u8, autostop: bool, forcable: bool) -> usize {
        for idx in 0..self.lines.len() {
            if !self.lines[idx].active.load(Ordering::Acquire) {
                self.activate(idx, track, autostop, forcable, 0);
                return idx + 1;
            }
        }
        0
    }

    /// Preempt the oldest forcable line. Requires producer quiescence.
    /// Returns the 1-based line index, or 0 when no line is forcable.
    pub fn force_line(&mut self, track: u8, autostop: bool, forcable: bool) -> usize {
        let mut oldest = self.next_id;
        let mut victim = 0;
        for (idx, line) in self.lines.iter().enumerate() {
            if line.forcable.load(Ordering::Relaxed) && line.id < oldest {
                oldest = line.id;
                victim = idx + 1;
            }
        }
        if victim != 0 {
            self.activate(victim - 1, track, autostop, forcable, 0);
        }
        victim
    }

    /// Retarget a line, optionally fading the current track out first.
    /// Requires producer quiescence.
    pub fn update_line(
        &mut self,
        line_id: usize,
        track: u8,
        autostop: bool,
        forcable: bool,
        fade_out_ms: u32,
    ) -> bool {
        if line_id == 0 || line_id > self.lines.len() {
            return false;
        }
        self.activate(line_id - 1, track, autostop, forcable, fade_out_ms);
        true
    }

    pub fn set_pause(&mut self, line_id: usize, paused: bool) {
        if let Some(line) = self.lines.get(line_id.wrapping_sub(1)) {
            line.paused.store(paused, Ordering::Relaxed);
        }
    }

    pub fn set_pause_active(&mut self, paused: bool) {
        for line in &self.lines {
            if line.active.load(Ordering::Acquire) {
                line.paused.store(paused, Ordering::Relaxed);
            }
        }
    }

    pub fn stop(&mut self, line_id: usize) {
        if let Some(line) = self.lines.get(line_id.wrapping_sub(1)) {
            line.active.store(false, Ordering::Release);
        }
    }

    pub fn stop_active(&mut self) {
        for line in &self.lines {
            line.active.store(false, Ordering::Release);
        }
    }

    /// Volume for every line (0..=100 by convention of the emulator).
    pub fn set_master_volume(&mut self, volume: i32) {
        self.master_volume = volume;
        for line in &mut self.lines {
            line.volume = volume;
            line.player.set_master_volume(volume);
        }
    }

    /// Volume for a single line.
    pub fn set_line_volume(&mut self, line_id: usize, volume: i32) {
        if let Some(line) = self.lines.get_mut(line_id.wrapping_sub(1)) {
            line.volume = volume;
            line.player.set_master_volume(volume);
        }
    }

    /// Change the VSync frequency of every line.
    /// Requires producer quiescence.
    pub fn set_vsync_hz(&mut self, hz: u32) {
        for idx in 0..self.lines.len() {
            self.reassign_frequency(idx, hz);
        }
    }

    /// Change the VSync frequency of one line. Requires producer
    /// quiescence.
    pub fn set_line_vsync_hz(&mut self, line_id: usize, hz: u32) {
        if line_id >= 1 && line_id <= self.lines.len() {
            self.reassign_frequency(line_id - 1, hz);
        }
    }

    /// Retune a line. An inactive line just stores the frequency; an
    /// active one keeps its musical position: the decoded frame count is
    /// rescaled by the frequency ratio, the engine reset, and playback
    /// fast-forwarded silently to the rescaled position. A frequency of 0
    /// ("image default") counts as 60 Hz on either side of the ratio.
    fn reassign_frequency(&mut self, idx: usize, hz: u32) {
        let line = &mut self.lines[idx];
        if !line.active.load(Ordering::Acquire) {
            line.player.set_vsync_hz(hz);
            return;
        }

        let old_hz = match line.player.vsync_hz() {
            0 => 60,
            v => v,
        };
        let new_hz = if hz == 0 { 60 } else { hz };
        let position = line.player.decoded_frames() * u64::from(old_hz) / u64::from(new_hz);

        line.player.set_vsync_hz(hz);
        line.player.reset(line.current_track, 0);
        line.player.advance_silently(position);
    }

    /// Playback time of a line in milliseconds.
    pub fn playtime_millis(&self, line_id: usize) -> u64 {
        if self.rate == 0 {
            return 0;
        }
        match self.lines.get(line_id.wrapping_sub(1)) {
            Some(line) => line.player.decoded_frames() * 1000 / u64::from(self.rate),
            None => 0,
        }
    }

    /// Per-packet read of every line, added into the shared mix buffer.
    /// Producer-side only.
    pub fn read_into(&mut self, out: &mut [i32], frames: usize) {
        let mode = if self.out_bits == 24 { LineMix::Add24 } else { LineMix::Add16 };
        for idx in 0..self.lines.len() {
            self.read_line_at(idx, out, frames, mode);
        }
    }

    /// Bulk read of a single line, overwriting `out`. Returns the frames
    /// produced (0 when the line is inactive or paused).
    pub fn read_line_into(&mut self, line_id: usize, out: &mut [i32], frames: usize) -> usize {
        if line_id == 0 || line_id > self.lines.len() {
            return 0;
        }
        let mode = if self.out_bits == 24 { LineMix::Copy24 } else { LineMix::Copy16 };
        let count = frames * self.channels as usize;
        out[..count].fill(0);
        self.read_line_at(line_id - 1, out, frames, mode)
    }

    /// One line's per-packet step: promote a pending track when no fade
    /// is running, render, check autostop, accumulate, count the fade
    /// down, and deactivate producer-side when the line is done.
    fn read_line_at(&mut self, idx: usize, out: &mut [i32], frames: usize, mode: LineMix) -> usize {
        let count = frames * self.channels as usize;
        if self.scratch.len() < count {
            self.scratch.resize(count, 0);
        }

        let line = &mut self.lines[idx];
        if !line.active.load(Ordering::Acquire) {
            return 0;
        }

        let mut produced = 0;
        let mut deactivate = false;

        if !line.paused.load(Ordering::Relaxed) {
            if line.next_track != 0 && line.transition_fadeout == 0 {
                line.current_track = line.next_track;
                line.next_track = 0;
                line.player.reset(line.current_track, 0);
            }

            line.player.render(&mut self.scratch[..count], frames);
            deactivate = line.autostop.load(Ordering::Relaxed) && line.player.stop_flag();

            let rendered = &self.scratch[..count];
            match mode {
                LineMix::Add16 => {
                    for (acc, &s) in out.iter_mut().zip(rendered) {
                        *acc += i32::from(s);
                    }
                }
                LineMix::Add24 => {
                    for (acc, &s) in out.iter_mut().zip(rendered) {
                        *acc += i32::from(s) << 8;
                    }
                }
                LineMix::Copy16 => {
                    for (slot, &s) in out.iter_mut().zip(rendered) {
                        *slot = i32::from(s);
                    }
                }
                LineMix::Copy24 => {
                    for (slot, &s) in out.iter_mut().zip(rendered) {
                        *slot = i32::from(s) << 8;
                    }
                }
            }
            produced = frames;

            if line.transition_fadeout > 0 {
                if line.transition_fadeout < frames as u64 {
                    line.transition_fadeout = 0;
                    deactivate = line.next_track == 0;
                } else {
                    line.transition_fadeout -= frames as u64;
                }
            }
        }

        if deactivate {
            line.active.store(false, Ordering::Release);
        }
        produced
    }
}
