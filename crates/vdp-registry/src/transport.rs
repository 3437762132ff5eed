use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::{BufMut, BytesMut};
use tracing::{debug, info, trace, warn};
use vdp_frame::{cobs_decode, cobs_encode, hex_dump, DELIMITER};
use vdp_link::{Link, LinkError};

use crate::config::TransportConfig;
use crate::error::{RegistryError, Result};
use crate::queue::FrameQueue;

/// Where a [`Registry`](crate::Registry) hands finished packets.
///
/// Returns `false` when the packet was dropped (for example because the
/// outbound queue is full).
pub trait PacketSink: Send + Sync {
    fn send_packet(&self, packet: &[u8]) -> bool;
}

impl<S: PacketSink + ?Sized> PacketSink for Arc<S> {
    fn send_packet(&self, packet: &[u8]) -> bool {
        (**self).send_packet(packet)
    }
}

impl<S: PacketSink + ?Sized> PacketSink for Box<S> {
    fn send_packet(&self, packet: &[u8]) -> bool {
        (**self).send_packet(packet)
    }
}

/// Snapshot of transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Frames written to the link.
    pub frames_sent: u64,
    /// Complete frames taken off the link and queued for decoding.
    pub frames_received: u64,
    /// Packets dropped because the outbound queue was full.
    pub outbound_dropped: u64,
    /// Frames dropped because the inbound queue was full.
    pub inbound_dropped: u64,
    /// Writes the link accepted only part of.
    pub short_writes: u64,
    /// Times the link's outbound buffer was reset to make room.
    pub link_flushes: u64,
    /// Frames discarded for exceeding the size limit.
    pub oversize_frames: u64,
    /// Packets handed to the decode callback.
    pub packets_decoded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    outbound_dropped: AtomicU64,
    inbound_dropped: AtomicU64,
    short_writes: AtomicU64,
    link_flushes: AtomicU64,
    oversize_frames: AtomicU64,
    packets_decoded: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TransportStats {
        TransportStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            outbound_dropped: self.outbound_dropped.load(Ordering::Relaxed),
            inbound_dropped: self.inbound_dropped.load(Ordering::Relaxed),
            short_writes: self.short_writes.load(Ordering::Relaxed),
            link_flushes: self.link_flushes.load(Ordering::Relaxed),
            oversize_frames: self.oversize_frames.load(Ordering::Relaxed),
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct Shared {
    config: TransportConfig,
    outbound: FrameQueue,
    inbound: FrameQueue,
    counters: Counters,
}

/// COBS-framed transport: a link loop and a decode loop joined by two
/// bounded frame queues.
///
/// Build it, take a [`PacketSender`] for whoever produces packets, then
/// [`spawn`](Self::spawn) the loops with the consumer callback.
#[derive(Debug)]
pub struct CobsTransport {
    shared: Arc<Shared>,
}

impl CobsTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                outbound: FrameQueue::new(config.queue_capacity),
                inbound: FrameQueue::new(config.queue_capacity),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.shared.config
    }

    /// Handle for encoding and enqueueing outbound packets.
    pub fn sender(&self) -> PacketSender {
        PacketSender {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stats(&self) -> TransportStats {
        self.shared.counters.snapshot()
    }

    /// Link loop over `link`, for driving by hand.
    pub fn link_loop<L: Link>(&self, link: L) -> LinkLoop<L> {
        LinkLoop::new(Arc::clone(&self.shared), link)
    }

    /// Decode loop feeding `on_packet`, for driving by hand.
    pub fn decode_loop<F: FnMut(&[u8])>(&self, on_packet: F) -> DecodeLoop<F> {
        DecodeLoop::new(Arc::clone(&self.shared), on_packet)
    }

    /// Configure `link` and run both loops on their own threads
    /// (`vdp-link` and `vdp-decode`).
    ///
    /// `on_packet` runs on the decode thread for every decoded packet. The
    /// loops run until the returned handle is shut down or dropped, or the
    /// link fails. A link that rejects its configuration is returned as
    /// [`RegistryError::Link`] and no thread is started.
    pub fn spawn<L, F>(self, mut link: L, on_packet: F) -> Result<TransportHandle>
    where
        L: Link + 'static,
        F: FnMut(&[u8]) + Send + 'static,
    {
        link.configure(&self.shared.config.link)?;
        debug!(
            link = link.name(),
            baud_rate = self.shared.config.link.baud_rate,
            "link configured"
        );

        let stop = Arc::new(AtomicBool::new(false));

        let mut link_loop = self.link_loop(link);
        let link_stop = Arc::clone(&stop);
        let link_thread = thread::Builder::new()
            .name("vdp-link".into())
            .spawn(move || {
                if let Err(err) = link_loop.run(&link_stop) {
                    warn!(error = %err, "link loop stopped");
                }
            })
            .map_err(|source| RegistryError::Spawn {
                name: "vdp-link",
                source,
            })?;

        let mut decode_loop = self.decode_loop(on_packet);
        let decode_stop = Arc::clone(&stop);
        let decode_thread = thread::Builder::new()
            .name("vdp-decode".into())
            .spawn(move || decode_loop.run(&decode_stop));

        let decode_thread = match decode_thread {
            Ok(handle) => handle,
            Err(source) => {
                stop.store(true, Ordering::Release);
                let _ = link_thread.join();
                return Err(RegistryError::Spawn {
                    name: "vdp-decode",
                    source,
                });
            }
        };

        debug!(
            queue_capacity = self.shared.config.queue_capacity,
            "transport loops started"
        );
        Ok(TransportHandle {
            shared: self.shared,
            stop,
            link_thread: Some(link_thread),
            decode_thread: Some(decode_thread),
        })
    }
}

/// Encodes packets and queues them for the link loop. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PacketSender {
    shared: Arc<Shared>,
}

impl PacketSender {
    /// Frame `packet` and enqueue it. Returns `false` if the queue was full
    /// and the packet was dropped.
    pub fn send(&self, packet: &[u8]) -> bool {
        let mut frame = BytesMut::new();
        cobs_encode(packet, self.shared.config.leading_delimiter, &mut frame);
        let len = frame.len();

        if !self.shared.outbound.try_push(frame.freeze()) {
            Counters::bump(&self.shared.counters.outbound_dropped);
            warn!(len, "outbound queue full, dropping packet");
            return false;
        }
        trace!(len, "frame queued");
        true
    }

    /// Frames waiting for the link loop.
    pub fn pending(&self) -> usize {
        self.shared.outbound.len()
    }
}

impl PacketSink for PacketSender {
    fn send_packet(&self, packet: &[u8]) -> bool {
        self.send(packet)
    }
}

/// Moves bytes between the link and the frame queues.
pub struct LinkLoop<L> {
    shared: Arc<Shared>,
    link: L,
    accumulator: BytesMut,
    read_buf: Vec<u8>,
    discarding: bool,
}

impl<L: Link> LinkLoop<L> {
    fn new(shared: Arc<Shared>, link: L) -> Self {
        let read_buf = vec![0; shared.config.read_chunk_size.max(1)];
        let accumulator = BytesMut::with_capacity(shared.config.max_frame_size);
        Self {
            shared,
            link,
            accumulator,
            read_buf,
            discarding: false,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// One iteration: write at most one queued frame, then read whatever is
    /// pending. Returns whether anything was written or read.
    pub fn poll_once(&mut self) -> std::result::Result<bool, LinkError> {
        let wrote = self.write_one()?;
        let read = self.read_available()?;
        Ok(wrote || read)
    }

    /// Loop until `stop` is set or the link fails. A closed link ends the
    /// loop cleanly.
    pub fn run(&mut self, stop: &AtomicBool) -> std::result::Result<(), LinkError> {
        while !stop.load(Ordering::Acquire) {
            match self.poll_once() {
                Ok(true) => {}
                Ok(false) => thread::sleep(self.shared.config.idle_delay),
                Err(LinkError::Closed) => {
                    info!(link = self.link.name(), "link closed by peer");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn write_one(&mut self) -> std::result::Result<bool, LinkError> {
        let Some(frame) = self.shared.outbound.pop() else {
            return Ok(false);
        };

        let free = self.link.write_free()?;
        if free < frame.len() {
            debug!(free, len = frame.len(), "link buffer backed up, flushing");
            self.link.flush()?;
            Counters::bump(&self.shared.counters.link_flushes);
        }

        let written = self.link.write(&frame)?;
        if written < frame.len() {
            Counters::bump(&self.shared.counters.short_writes);
            warn!(
                written,
                len = frame.len(),
                "short write, frame likely corrupted on the wire"
            );
        }
        Counters::bump(&self.shared.counters.frames_sent);
        Ok(true)
    }

    fn read_available(&mut self) -> std::result::Result<bool, LinkError> {
        let available = self.link.bytes_available()?;
        if available == 0 {
            return Ok(false);
        }

        let want = available.min(self.read_buf.len());
        let n = self.link.read(&mut self.read_buf[..want])?.min(want);
        if n < want {
            debug!(read = n, wanted = want, "link returned fewer bytes than reported");
        }

        let buf = std::mem::take(&mut self.read_buf);
        for &byte in &buf[..n] {
            self.accumulate(byte);
        }
        self.read_buf = buf;
        Ok(n > 0)
    }

    fn accumulate(&mut self, byte: u8) {
        if byte == DELIMITER {
            if self.discarding {
                self.discarding = false;
                self.accumulator.clear();
                return;
            }
            if self.accumulator.is_empty() {
                return;
            }
            let frame = self.accumulator.split().freeze();
            if self.shared.inbound.try_push(frame) {
                Counters::bump(&self.shared.counters.frames_received);
            } else {
                Counters::bump(&self.shared.counters.inbound_dropped);
                warn!("inbound queue full, dropping frame");
            }
            return;
        }

        if self.discarding {
            return;
        }
        if self.accumulator.len() >= self.shared.config.max_frame_size {
            Counters::bump(&self.shared.counters.oversize_frames);
            warn!(
                max = self.shared.config.max_frame_size,
                "frame exceeds size limit, discarding until next delimiter"
            );
            self.accumulator.clear();
            self.discarding = true;
            return;
        }
        self.accumulator.put_u8(byte);
    }
}

/// Decodes queued frames and hands each packet to a callback.
pub struct DecodeLoop<F> {
    shared: Arc<Shared>,
    on_packet: F,
    scratch: BytesMut,
}

impl<F: FnMut(&[u8])> DecodeLoop<F> {
    fn new(shared: Arc<Shared>, on_packet: F) -> Self {
        Self {
            shared,
            on_packet,
            scratch: BytesMut::new(),
        }
    }

    /// Decode and dispatch at most one frame. Returns whether one was waiting.
    pub fn poll_once(&mut self) -> bool {
        let Some(frame) = self.shared.inbound.pop() else {
            return false;
        };

        self.scratch.clear();
        cobs_decode(&frame, &mut self.scratch);
        trace!(len = self.scratch.len(), packet = %hex_dump(&self.scratch), "packet decoded");
        Counters::bump(&self.shared.counters.packets_decoded);
        (self.on_packet)(&self.scratch);
        true
    }

    /// Loop until `stop` is set.
    pub fn run(&mut self, stop: &AtomicBool) {
        while !stop.load(Ordering::Acquire) {
            if !self.poll_once() {
                thread::sleep(self.shared.config.idle_delay);
            }
        }
    }
}

/// Owns the running loop threads. Stops and joins them on drop.
#[derive(Debug)]
pub struct TransportHandle {
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    link_thread: Option<JoinHandle<()>>,
    decode_thread: Option<JoinHandle<()>>,
}

impl TransportHandle {
    pub fn stats(&self) -> TransportStats {
        self.shared.counters.snapshot()
    }

    /// Whether the link loop has exited (link closed or failed).
    pub fn is_link_finished(&self) -> bool {
        self.link_thread
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// Stop both loops and wait for them to exit.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        for handle in [self.link_thread.take(), self.decode_thread.take()]
            .into_iter()
            .flatten()
        {
            if handle.join().is_err() {
                warn!("transport thread panicked");
            }
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
