//! End-to-end mixer scenarios: facade → mix core → packet ring → mock
//! device callback.

mod common;

use common::{eventually, mock_backend, scaled, temp_wav};
use polymix::{Mixer, MixerStatus};

const FRAMES: usize = 64;

/// A configured stereo 16-bit mixer over the mock backend.
fn mixer_with(voices: usize) -> (Mixer, common::MockHandle) {
    let (backend, handle) = mock_backend();
    let mut mixer = Mixer::with_backend(Box::new(backend));
    assert!(mixer.set_format(44100, true, 16, voices));
    assert!(mixer.set_mixer_buffer_parameters(5, FRAMES));
    mixer.set_master_volume(255);
    (mixer, handle)
}

// === Scenario: silence ===

#[test]
fn idle_mixer_outputs_silence() {
    let (mut mixer, device) = mixer_with(4);
    assert!(mixer.start_mixer());

    let packet = device.pull_bytes(FRAMES);
    assert_eq!(packet.len(), FRAMES * 4);
    assert!(packet.iter().all(|&b| b == 0));

    mixer.stop_mixer();
}

// === Scenario: single tone passthrough ===

#[test]
fn single_voice_passthrough_is_scaled_by_master_volume() {
    let (mut mixer, device) = mixer_with(4);
    let wav = temp_wav("tone", &[0x1234, -0x1234].repeat(44100), 2, 44100);
    let source = mixer.add_source(&wav);
    assert_ne!(source, 0);

    assert!(mixer.start_mixer());
    let play = mixer.play_source(source, false, false);
    assert_ne!(play, 0);

    let packet = device
        .pull_until(FRAMES, |p| p.iter().any(|&v| v != 0))
        .expect("tone never reached the device");
    for frame in packet.chunks_exact(2) {
        assert_eq!(frame[0], scaled(0x1234, 255));
        assert_eq!(frame[1], scaled(-0x1234, 255));
    }

    mixer.stop_mixer();
}

// === Scenario: resample up ===

#[test]
fn mono_22050_source_upsamples_to_stereo_constant() {
    let (mut mixer, device) = mixer_with(2);
    let wav = temp_wav("low", &[10000; 22050], 1, 22050);
    let source = mixer.add_source(&wav);
    assert_ne!(source, 0);

    assert!(mixer.start_mixer());
    assert_ne!(mixer.play_source(source, false, false), 0);

    let packet = device
        .pull_until(FRAMES, |p| p.iter().any(|&v| v != 0))
        .expect("no audio");
    assert!(packet.iter().all(|&v| v == scaled(10000, 255)));

    mixer.stop_mixer();
}

// === Scenario: two-voice sum ===

#[test]
fn two_voices_sum_into_one_packet() {
    let (mut mixer, device) = mixer_with(4);
    let a = mixer.add_source(temp_wav("sum_a", &[8000; 44100], 1, 44100));
    let b = mixer.add_source(temp_wav("sum_b", &[4000; 44100], 1, 44100));
    assert!(a != 0 && b != 0);

    assert!(mixer.start_mixer());
    assert_ne!(mixer.play_source(a, true, false), 0);
    assert_ne!(mixer.play_source(b, true, false), 0);

    let expected = scaled(12000, 255);
    let packet = device
        .pull_until(FRAMES, |p| p.iter().all(|&v| v == expected))
        .expect("summed packet never appeared");
    assert!(packet.iter().all(|&v| v == expected));

    mixer.stop_mixer();
}

// === Scenario: stop-all ===

#[test]
fn stop_all_silences_and_frees_every_voice() {
    let (mut mixer, device) = mixer_with(4);
    let a = mixer.add_source(temp_wav("stop_a", &[6000; 44100], 1, 44100));
    let b = mixer.add_source(temp_wav("stop_b", &[3000; 44100], 1, 44100));

    assert!(mixer.start_mixer());
    assert_ne!(mixer.play_source(a, true, false), 0);
    assert_ne!(mixer.play_source(b, true, false), 0);
    device
        .pull_until(FRAMES, |p| p.iter().any(|&v| v != 0))
        .expect("no audio before stop");

    mixer.stop_playback(0);

    // the ring may still hold pre-stop packets; drain until silence
    device
        .pull_until(FRAMES, |p| p.iter().all(|&v| v == 0))
        .expect("silence never returned after stop_playback(0)");

    // the producer frees the voices on its next pass
    assert!(eventually(|| mixer.play_source(a, false, false) != 0));

    mixer.stop_mixer();
}

// === Looping ===

#[test]
fn looped_voice_outlives_its_source_length() {
    let (mut mixer, device) = mixer_with(2);
    // 8 frames of source, far shorter than one packet
    let source = mixer.add_source(temp_wav("loop", &[5000; 8], 1, 44100));
    assert_ne!(source, 0);

    assert!(mixer.start_mixer());
    assert_ne!(mixer.play_source(source, true, false), 0);

    let expected = scaled(5000, 255);
    for _ in 0..3 {
        let packet = device
            .pull_until(FRAMES, |p| p.iter().all(|&v| v == expected))
            .expect("looped audio vanished");
        assert_eq!(packet.len(), FRAMES * 2);
    }

    mixer.stop_mixer();
}

#[test]
fn unlooped_short_voice_plays_once_and_frees() {
    let (mut mixer, device) = mixer_with(1);
    let source = mixer.add_source(temp_wav("oneshot", &[5000; 8], 1, 44100));

    assert!(mixer.start_mixer());
    assert_ne!(mixer.play_source(source, false, false), 0);

    // the 8 source frames occupy part of one packet, then the voice ends
    device
        .pull_until(FRAMES, |p| p.iter().any(|&v| v != 0))
        .expect("one-shot never played");
    assert!(eventually(|| {
        let h = mixer.play_source(source, false, false);
        if h != 0 {
            mixer.stop_playback(h);
        }
        h != 0
    }));

    mixer.stop_mixer();
}

// === Drop-source coherence ===

#[test]
fn dropped_source_cannot_be_played_again() {
    let (mut mixer, _device) = mixer_with(2);
    let source = mixer.add_source(temp_wav("dropped", &[1000; 4000], 1, 44100));
    assert_ne!(source, 0);

    assert!(mixer.start_mixer());
    assert_ne!(mixer.play_source(source, true, false), 0);

    assert!(mixer.drop_source(source));
    assert_eq!(mixer.play_source(source, false, false), 0);
    assert!(!mixer.drop_source(source));

    mixer.stop_mixer();
}

#[test]
fn drop_all_releases_every_slot() {
    let (mut mixer, _device) = mixer_with(2);
    let a = mixer.add_source(temp_wav("da", &[1; 8], 1, 44100));
    let b = mixer.add_source(temp_wav("db", &[2; 8], 1, 44100));
    assert!(a != 0 && b != 0);

    assert!(mixer.drop_source(0));
    assert_eq!(mixer.play_source(a, false, false), 0);
    assert_eq!(mixer.play_source(b, false, false), 0);
}

// === Stale handles ===

#[test]
fn stale_play_handle_silently_noops() {
    let (mut mixer, device) = mixer_with(2);
    let a = mixer.add_source(temp_wav("stale_a", &[7000; 44100], 1, 44100));
    let b = mixer.add_source(temp_wav("stale_b", &[2000; 44100], 1, 44100));

    assert!(mixer.start_mixer());
    let play_a = mixer.play_source(a, true, false);
    assert_ne!(play_a, 0);

    // forge a handle with voice of play_a but the slot of b: must not
    // stop the playing voice
    let forged = (play_a & 0xFFFF_0000) | (b & 0xFFFF);
    mixer.stop_playback(forged);

    let expected = scaled(7000, 255);
    assert!(device
        .pull_until(FRAMES, |p| p.iter().all(|&v| v == expected))
        .is_some());

    mixer.stop_mixer();
}

#[test]
fn unknown_source_handle_plays_nothing() {
    let (mut mixer, _device) = mixer_with(2);
    assert_eq!(mixer.play_source(0, false, false), 0);
    assert_eq!(mixer.play_source(0x7, false, false), 0); // empty slot
}

// === Voice exhaustion ===

#[test]
fn voice_table_capacity_is_enforced() {
    let (mut mixer, _device) = mixer_with(2);
    let source = mixer.add_source(temp_wav("cap", &[100; 44100], 1, 44100));

    // device closed: voices stay active until stopped
    assert_ne!(mixer.play_source(source, true, false), 0);
    assert_ne!(mixer.play_source(source, true, false), 0);
    assert_eq!(mixer.play_source(source, true, false), 0);
}

// === Pause / resume ===

#[test]
fn paused_voice_goes_silent_and_resumes() {
    let (mut mixer, device) = mixer_with(2);
    let source = mixer.add_source(temp_wav("pausable", &[9000; 44100], 1, 44100));

    assert!(mixer.start_mixer());
    let play = mixer.play_source(source, true, false);
    let expected = scaled(9000, 255);
    device
        .pull_until(FRAMES, |p| p.iter().all(|&v| v == expected))
        .expect("no audio");

    mixer.pause_playback(play);
    device
        .pull_until(FRAMES, |p| p.iter().all(|&v| v == 0))
        .expect("pause never silenced the voice");

    mixer.resume_playback(play);
    device
        .pull_until(FRAMES, |p| p.iter().all(|&v| v == expected))
        .expect("resume never restored the voice");

    mixer.stop_mixer();
}

// === Mixer lifecycle ===

#[test]
fn status_follows_the_device_lifecycle() {
    let (mut mixer, _device) = mixer_with(2);
    assert_eq!(mixer.mixer_status(), MixerStatus::Stopped);

    assert!(mixer.start_mixer());
    assert_eq!(mixer.mixer_status(), MixerStatus::Running);

    assert!(mixer.pause_mixer());
    assert_eq!(mixer.mixer_status(), MixerStatus::Paused);

    // pausing twice changes nothing
    assert!(mixer.pause_mixer());
    assert_eq!(mixer.mixer_status(), MixerStatus::Paused);

    assert!(mixer.resume_mixer());
    assert_eq!(mixer.mixer_status(), MixerStatus::Running);
    assert!(mixer.resume_mixer());
    assert_eq!(mixer.mixer_status(), MixerStatus::Running);

    assert!(mixer.stop_mixer());
    assert_eq!(mixer.mixer_status(), MixerStatus::Stopped);
}

#[test]
fn format_changes_are_refused_while_running() {
    let (mut mixer, _device) = mixer_with(2);
    assert!(mixer.start_mixer());
    assert!(!mixer.set_format(48000, true, 16, 4));
    assert!(!mixer.set_mixer_buffer_parameters(6, 128));
    mixer.stop_mixer();
    assert!(mixer.set_format(48000, true, 16, 4));
}

#[test]
fn invalid_formats_are_refused() {
    let (mut mixer, _device) = mixer_with(2);
    assert!(!mixer.set_format(4000, true, 16, 4)); // rate too low
    assert!(!mixer.set_format(44100, true, 8, 4)); // bad depth
    assert!(!mixer.set_format(44100, true, 16, 0)); // no voices
}

#[test]
fn reapplying_the_same_format_is_stable() {
    let (mut mixer, device) = mixer_with(4);
    assert!(mixer.set_format(44100, true, 16, 4));
    assert!(mixer.set_format(44100, true, 16, 4));

    let source = mixer.add_source(temp_wav("refmt", &[1234; 44100], 1, 44100));
    assert!(mixer.start_mixer());
    assert_ne!(mixer.play_source(source, true, false), 0);
    assert!(device
        .pull_until(FRAMES, |p| p.iter().all(|&v| v == scaled(1234, 255)))
        .is_some());
    mixer.stop_mixer();
}

#[test]
fn restart_after_stop_works() {
    let (mut mixer, device) = mixer_with(2);
    let source = mixer.add_source(temp_wav("restart", &[4321; 44100], 1, 44100));

    for _ in 0..2 {
        assert!(mixer.start_mixer());
        assert_ne!(mixer.play_source(source, true, false), 0);
        assert!(device
            .pull_until(FRAMES, |p| p.iter().all(|&v| v == scaled(4321, 255)))
            .is_some());
        mixer.stop_playback(0);
        assert!(mixer.stop_mixer());
    }
}

// === Master volume ===

#[test]
fn master_volume_attenuates_everything() {
    let (mut mixer, device) = mixer_with(2);
    let source = mixer.add_source(temp_wav("vol", &[16000; 44100], 1, 44100));

    assert!(mixer.start_mixer());
    assert_ne!(mixer.play_source(source, true, false), 0);
    device
        .pull_until(FRAMES, |p| p.iter().all(|&v| v == scaled(16000, 255)))
        .expect("full volume audio missing");

    mixer.set_master_volume(64);
    device
        .pull_until(FRAMES, |p| p.iter().all(|&v| v == scaled(16000, 64)))
        .expect("attenuated audio missing");

    mixer.set_master_volume(0);
    device
        .pull_until(FRAMES, |p| p.iter().all(|&v| v == 0))
        .expect("muted audio missing");

    mixer.stop_mixer();
}

// === Loader rejections ===

#[test]
fn unreadable_and_malformed_files_yield_handle_zero() {
    let (mut mixer, _device) = mixer_with(2);
    assert_eq!(mixer.add_source("/definitely/not/here.wav"), 0);

    let garbage = std::env::temp_dir().join(format!("polymix_garbage_{}.bin", std::process::id()));
    std::fs::write(&garbage, b"neither wav nor ogg").unwrap();
    assert_eq!(mixer.add_source(&garbage), 0);
}
