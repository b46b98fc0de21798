//! Emulator seam.
//!
//! The actual register-level emulation is an external concern. A loaded
//! program image implements [`KssEngine`]; every [`KssEngine::new_player`]
//! call binds an independent copy of that image to a fresh player, so
//! players never share mutable emulator state.

/// Sound chips addressable for quality and panning configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chip {
    /// Programmable sound generator
    Psg,
    /// Konami SCC wavetable
    Scc,
    /// OPL FM synthesis
    Opl,
    /// OPLL FM synthesis
    Opll,
}

/// A loaded KSS program image. Implementations own the authoritative
/// binary; each player receives its own copy.
pub trait KssEngine: Send + Sync {
    /// Create an emulator voice bound to a copy of the program image,
    /// rendering 16-bit interleaved PCM at the given format.
    fn new_player(&self, rate: u32, channels: u16, bits: u16) -> Box<dyn KssPlayer>;
}

/// One emulator voice: a player bound to a program copy.
pub trait KssPlayer: Send {
    /// Restart emulation at the given track. `cpu_speed` 0 selects the
    /// image default.
    fn reset(&mut self, track: u8, cpu_speed: u32);

    /// Render `frames` frames of 16-bit interleaved PCM into `out`.
    fn render(&mut self, out: &mut [i16], frames: usize);

    /// True once the engine detected end of track (silence past the
    /// configured limit, or an explicit stop).
    fn stop_flag(&self) -> bool;

    /// Total frames rendered since the last reset.
    fn decoded_frames(&self) -> u64;

    /// Begin a fade-out of the given length.
    fn fade_start(&mut self, fade_ms: u32);

    /// Advance emulation by `frames` frames without producing audio.
    fn advance_silently(&mut self, frames: u64);

    /// Master volume for this voice.
    fn set_master_volume(&mut self, volume: i32);

    /// Silence duration after which `stop_flag` trips.
    fn set_silent_limit(&mut self, limit_ms: u32);

    /// VSync frequency in Hz; 0 selects the image default.
    fn set_vsync_hz(&mut self, hz: u32);

    /// Currently configured VSync frequency (0 = image default).
    fn vsync_hz(&self) -> u32;

    /// Emulation quality for one chip.
    fn set_quality(&mut self, chip: Chip, quality: u32);

    /// Stereo placement of a whole chip (positive left, negative right,
    /// 0 center).
    fn set_pan_device(&mut self, chip: Chip, pan: i32);

    /// Stereo placement of one channel of a chip (1 right, 2 left,
    /// 3 center).
    fn set_pan_channel(&mut self, chip: Chip, channel: u32, pan: i32);
}
