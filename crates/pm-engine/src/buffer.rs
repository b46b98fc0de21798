//! Producer/consumer packet ring.
//!
//! A `BufferedMixer` owns a ring of packet-sized byte buffers and a
//! producer thread that fills them through an installed mix function. The
//! consumer side is a [`PacketReader`]: a lock-free handle meant to live
//! inside the audio device callback. Its `read` never blocks and never
//! allocates; on underrun it fills the remainder of the output with
//! silence and returns, preserving device continuity.

use log::debug;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// The mix function: fills one packet (`out.len()` bytes, `frames`
/// frames) with encoded PCM.
pub type MixFn = Box<dyn FnMut(&mut [u8], usize) + Send>;

/// State shared between the producer thread and the consumer handle.
///
/// The byte buffer is aliased across threads: the producer writes only
/// the packet at `write_pos` (unpublished), the consumer reads only
/// packets in `[read_pos, write_pos)`. Publication happens through the
/// release store of `write_pos` / `read_pos`.
struct Shared {
    buf: UnsafeCell<Box<[u8]>>,
    packet_bytes: usize,
    total_bytes: usize,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
    producer_on: AtomicBool,
    paused: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

// Safety: disjoint-region discipline above; positions are packet-aligned
// and only move forward modulo the ring size.
unsafe impl Sync for Shared {}
unsafe impl Send for Shared {}

impl Shared {
    /// Packet slice for the producer.
    ///
    /// Safety: caller must be the producer thread and `pos` must be the
    /// current unpublished `write_pos`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn packet_mut(&self, pos: usize) -> &mut [u8] {
        let buf = &mut *self.buf.get();
        &mut buf[pos..pos + self.packet_bytes]
    }

    /// Published bytes for the consumer.
    ///
    /// Safety: caller must be the single consumer and the range must lie
    /// inside a published packet.
    unsafe fn bytes_at(&self, pos: usize, len: usize) -> &[u8] {
        let buf = &*self.buf.get();
        &buf[pos..pos + len]
    }
}

/// Single-producer single-consumer packet ring with an owned mix thread.
pub struct BufferedMixer {
    shared: Arc<Shared>,
    packet_frames: usize,
    frame_bytes: usize,
    mix: Option<MixFn>,
    producer: Option<JoinHandle<MixFn>>,
}

impl BufferedMixer {
    /// Create a ring of `packet_count` packets of `packet_frames` frames,
    /// `frame_bytes` bytes per frame.
    pub fn new(packet_count: usize, packet_frames: usize, frame_bytes: usize) -> Self {
        let packet_bytes = packet_frames * frame_bytes;
        let total_bytes = packet_count * packet_bytes;
        let shared = Arc::new(Shared {
            buf: UnsafeCell::new(vec![0u8; total_bytes].into_boxed_slice()),
            packet_bytes,
            total_bytes,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            producer_on: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        });
        Self { shared, packet_frames, frame_bytes, mix: None, producer: None }
    }

    pub fn packet_count(&self) -> usize {
        if self.shared.packet_bytes == 0 {
            0
        } else {
            self.shared.total_bytes / self.shared.packet_bytes
        }
    }

    pub fn packet_frames(&self) -> usize {
        self.packet_frames
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    pub fn is_started(&self) -> bool {
        self.shared.producer_on.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.is_started() && !self.is_paused()
    }

    /// Install the mix function. Ignored while the producer runs
    /// unpaused.
    pub fn set_mix_fn(&mut self, mix: MixFn) {
        if !self.is_active() {
            self.mix = Some(mix);
        }
    }

    /// Create the consumer endpoint. The ring supports a single live
    /// consumer; create a fresh reader for each device stream.
    pub fn make_reader(&self) -> PacketReader {
        PacketReader { shared: Arc::clone(&self.shared), read_inrange: 0 }
    }

    /// Spawn the producer thread. No-op if already started or no mix
    /// function is installed.
    pub fn start(&mut self) {
        if self.producer.is_some() || self.mix.is_none() {
            return;
        }
        debug!("packet ring: starting producer");
        self.shared.write_pos.store(0, Ordering::Relaxed);
        self.shared.read_pos.store(0, Ordering::Relaxed);
        self.shared.paused.store(false, Ordering::Relaxed);
        self.shared.producer_on.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let packet_frames = self.packet_frames;
        let mut mix = self.mix.take().expect("mix function present");
        self.producer = Some(thread::spawn(move || {
            produce(&shared, &mut mix, packet_frames);
            mix
        }));
    }

    /// Pause or resume the producer. Acquiring the ring lock serializes
    /// against an in-flight `mix` call, so after `pause(true)` returns
    /// the producer publishes at most the packet it was mixing.
    pub fn pause(&self, paused: bool) {
        if self.shared.paused.load(Ordering::Acquire) == paused {
            return;
        }
        let _guard = self.shared.lock.lock().unwrap();
        self.shared.paused.store(paused, Ordering::Release);
        self.shared.cond.notify_one();
    }

    /// Stop and join the producer thread. The mix function is recovered
    /// so the ring can be started again.
    pub fn stop(&mut self) {
        if let Some(handle) = self.producer.take() {
            debug!("packet ring: stopping producer");
            self.shared.producer_on.store(false, Ordering::Release);
            {
                let _guard = self.shared.lock.lock().unwrap();
                self.shared.cond.notify_one();
            }
            if let Ok(mix) = handle.join() {
                self.mix = Some(mix);
            }
        }
    }
}

impl Drop for BufferedMixer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Producer loop: mix one packet under the ring lock, then wait while
/// the ring is full or paused, then publish.
fn produce(shared: &Shared, mix: &mut MixFn, packet_frames: usize) {
    while shared.producer_on.load(Ordering::Acquire) {
        let write_pos = shared.write_pos.load(Ordering::Relaxed);
        {
            let _guard = shared.lock.lock().unwrap();
            // Safety: this packet is unpublished; only this thread
            // touches it.
            let packet = unsafe { shared.packet_mut(write_pos) };
            mix(packet, packet_frames);
        }

        let next = (write_pos + shared.packet_bytes) % shared.total_bytes;

        let mut guard = shared.lock.lock().unwrap();
        while (next == shared.read_pos.load(Ordering::Acquire)
            || shared.paused.load(Ordering::Acquire))
            && shared.producer_on.load(Ordering::Acquire)
        {
            guard = shared.cond.wait(guard).unwrap();
        }
        drop(guard);

        if !shared.producer_on.load(Ordering::Acquire) {
            break;
        }
        shared.write_pos.store(next, Ordering::Release);
    }
    debug!("packet ring: producer exited");
}

/// Lock-free consumer endpoint for the device callback.
pub struct PacketReader {
    shared: Arc<Shared>,
    /// Byte offset inside the packet currently being consumed.
    read_inrange: usize,
}

impl PacketReader {
    /// Copy published bytes into `out`, always filling it completely:
    /// when the ring is empty the remainder becomes silence. Advances at
    /// most one packet boundary per iteration and wakes the producer
    /// whenever a packet is released.
    pub fn read(&mut self, out: &mut [u8]) {
        let shared = &self.shared;
        let mut filled = 0;

        while filled < out.len() {
            let read_pos = shared.read_pos.load(Ordering::Relaxed);
            if shared.write_pos.load(Ordering::Acquire) == read_pos {
                // underrun: emit silence, never wait
                out[filled..].fill(0);
                return;
            }

            let in_packet = shared.packet_bytes - self.read_inrange;
            let take = in_packet.min(out.len() - filled);
            // Safety: the packet at read_pos is published and not touched
            // by the producer until we advance read_pos past it.
            let src = unsafe { shared.bytes_at(read_pos + self.read_inrange, take) };
            out[filled..filled + take].copy_from_slice(src);
            filled += take;

            if take == in_packet {
                self.read_inrange = 0;
                shared
                    .read_pos
                    .store((read_pos + shared.packet_bytes) % shared.total_bytes, Ordering::Release);
                shared.cond.notify_one();
            } else {
                self.read_inrange += take;
            }
        }
    }
}
