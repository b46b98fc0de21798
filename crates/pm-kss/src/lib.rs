//! KSS chiptune playback for the polymix mixer.
//!
//! A KSS cartridge owns a bank of independent emulator voices ("lines")
//! sharing one program image. The emulator itself sits behind the
//! [`KssEngine`]/[`KssPlayer`] traits; this crate implements the per-line
//! track state machine, voice selection policies and the per-packet
//! additive read the mixer calls.

mod cartridge;
mod engine;

pub use cartridge::{CartridgeKSS, LineMix};
pub use engine::{Chip, KssEngine, KssPlayer};
