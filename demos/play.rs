//! Plays a WAV or Ogg Vorbis file through the default audio device.
//!
//! Usage:
//!   cargo run --example play -- path/to/file.wav [seconds] [--loop]

use polymix::Mixer;
use std::time::Duration;
use std::{env, thread};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let path = args.get(1).unwrap_or_else(|| {
        eprintln!("Usage: play <file.wav|file.ogg> [seconds] [--loop]");
        std::process::exit(1);
    });
    let seconds: u64 = args
        .get(2)
        .and_then(|a| a.parse().ok())
        .unwrap_or(5);
    let looped = args.iter().any(|a| a == "--loop");

    let mut mixer = Mixer::new();
    if !mixer.set_format(44100, true, 16, 8) {
        eprintln!("Failed to configure the mixer");
        std::process::exit(1);
    }
    mixer.set_master_volume(200);

    let source = mixer.add_source(path);
    if source == 0 {
        eprintln!("Failed to load {}", path);
        std::process::exit(1);
    }

    if !mixer.start_mixer() {
        eprintln!("Failed to start the audio device");
        std::process::exit(1);
    }

    let handle = mixer.play_source(source, looped, false);
    if handle == 0 {
        eprintln!("No free voice");
        std::process::exit(1);
    }

    println!("Playing {} for {}s{}...", path, seconds, if looped { " (looped)" } else { "" });
    thread::sleep(Duration::from_secs(seconds));

    mixer.stop_playback(handle);
    mixer.stop_mixer();
    println!("Done.");
}
