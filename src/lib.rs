//! Polymix: a real-time polyphonic audio mixer.
//!
//! Blends several independent sound streams — in-memory WAV files,
//! streaming Ogg Vorbis files, and emulated KSS chiptune voices — into a
//! single interleaved 16/24-bit PCM output delivered to an audio backend
//! callback. Voices are addressed through opaque integer handles and can
//! be started, stopped, paused and retargeted while the device runs.
//!
//! ```no_run
//! use polymix::Mixer;
//!
//! let mut mixer = Mixer::new();
//! // 44.1 kHz stereo 16-bit, 10 simultaneous voices
//! assert!(mixer.set_format(44100, true, 16, 10));
//! mixer.set_master_volume(128);
//!
//! let bgm = mixer.add_source("music.ogg");
//! let sfx = mixer.add_source("jump.wav");
//!
//! if mixer.start_mixer() {
//!     let _music = mixer.play_source(bgm, true, false);
//!     let _jump = mixer.play_source(sfx, false, false);
//!     // ...
//!     mixer.stop_mixer();
//! }
//! ```

mod error;
mod handle;
mod mixer;

pub use error::MixerError;
pub use mixer::{Mixer, MixerStatus};

pub use pm_audio::{AudioBackend, AudioError, CpalBackend, PullFn, StreamFormat, StreamStatus};
pub use pm_core::{AuFormat, OutputFormat, Sample, Source};
pub use pm_engine::{
    BufferedMixer, MixCore, MixerVoice, OggStream, PacketReader, PcmSample, PcmSource,
    StreamInfo, VorbisSample, VorbisSource, VorbisStream,
};
pub use pm_formats::{is_wav, load_wav, write_wav, FormatError, WavData};
pub use pm_kss::{CartridgeKSS, Chip, KssEngine, KssPlayer};
