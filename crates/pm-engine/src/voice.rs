//! Mixer voice: one allocatable playback slot.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// Lifecycle flags of one mixer voice.
///
/// A voice is *free* iff `!active`. Control threads configure a free
/// voice and set `active` last (release); the producer reads `active`
/// first (acquire), so every other field is visible once `active` is
/// observed true. While the device runs, only the producer clears
/// `active`; control threads request a stop through `stopped` and may
/// clear `active` directly only once the producer is quiesced.
#[derive(Debug)]
pub struct MixerVoice {
    pub active: AtomicBool,
    pub stopped: AtomicBool,
    pub paused: AtomicBool,
    pub looped: AtomicBool,
    /// 1-based slot of the source this voice plays (0 = none). Atomic so
    /// handle-routing checks need no lock.
    pub source_slot: AtomicU16,
}

impl MixerVoice {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            stopped: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            looped: AtomicBool::new(false),
            source_slot: AtomicU16::new(0),
        }
    }

    /// True if the voice can be claimed by `play_source`.
    pub fn is_free(&self) -> bool {
        !self.active.load(Ordering::Acquire)
    }

    /// True if this voice currently plays the given source slot.
    pub fn plays_slot(&self, slot: u16) -> bool {
        self.active.load(Ordering::Acquire) && self.source_slot.load(Ordering::Relaxed) == slot
    }
}

impl Default for MixerVoice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn new_voice_is_free() {
        let v = MixerVoice::new();
        assert!(v.is_free());
        assert!(!v.plays_slot(0));
    }

    #[test]
    fn activation_makes_voice_busy() {
        let v = MixerVoice::new();
        v.source_slot.store(3, Ordering::Relaxed);
        v.active.store(true, Ordering::Release);
        assert!(!v.is_free());
        assert!(v.plays_slot(3));
        assert!(!v.plays_slot(2));
    }
}
