use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, trace, warn};
use vdp_frame::{
    hex_dump, validate_packet, PacketFunction, PacketHeader, PacketReader, PacketType,
    PacketValidity,
};
use vdp_schema::{lock_part, pretty_print, PartPtr};

use crate::channel::{Channel, ChannelId, Side, MAX_CHANNELS};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::packet::{acknowledge_packet, broadcast_packet, data_packet, decode_broadcast};
use crate::transport::PacketSink;

/// Callback invoked with a remote channel.
pub type ChannelCallback = Box<dyn FnMut(&Channel) + Send>;

/// Counters for packets the registry discarded, plus negotiation timeouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Packets whose checksum trailer did not match.
    pub bad_checksum: u64,
    /// Packets shorter than the minimum size.
    pub too_small: u64,
    /// Broadcasts naming an id past the next expected remote id.
    pub out_of_order: u64,
    /// Data packets for a channel the peer never announced.
    pub unknown_channel: u64,
    /// Acknowledgements for a channel that was never opened here.
    pub unknown_ack: u64,
    /// Packets that passed the checksum but could not be parsed.
    pub malformed: u64,
    /// Broadcast attempts that timed out waiting for an acknowledgement.
    pub ack_timeouts: u64,
}

/// Outcome of one [`Registry::negotiate_report`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiationReport {
    /// Channels the peer acknowledged, in order.
    pub acked: Vec<ChannelId>,
    /// Channels that used up every attempt.
    pub failed: Vec<ChannelId>,
    /// Attempts that timed out, across all channels.
    pub failed_attempts: u32,
}

impl NegotiationReport {
    pub fn all_acked(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
struct State {
    my_channels: Vec<Channel>,
    remote_channels: Vec<Channel>,
    stats: RegistryStats,
}

/// Per-device channel table and negotiation state machine.
///
/// All channel state sits behind one lock, shared between the decode thread
/// (through [`take_packet`](Self::take_packet)) and application threads
/// (through [`negotiate`](Self::negotiate), [`send_data`](Self::send_data)
/// and the accessors). The lock is never held while a callback runs, while
/// a part is being serialized, or while a packet is handed to the sink.
pub struct Registry {
    side: Side,
    config: RegistryConfig,
    sink: Box<dyn PacketSink>,
    state: Mutex<State>,
    ack_arrived: Condvar,
    on_broadcast: Mutex<ChannelCallback>,
    on_data: Mutex<ChannelCallback>,
}

impl Registry {
    pub fn new(side: Side, sink: impl PacketSink + 'static, config: RegistryConfig) -> Self {
        Self {
            side,
            config,
            sink: Box::new(sink),
            state: Mutex::new(State::default()),
            ack_arrived: Condvar::new(),
            on_broadcast: Mutex::new(Box::new(log_broadcast)),
            on_data: Mutex::new(Box::new(log_data)),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the callback run when the peer announces a new channel.
    ///
    /// Callbacks run on the decode thread and must not install callbacks
    /// themselves.
    pub fn set_on_broadcast<F>(&self, callback: F)
    where
        F: FnMut(&Channel) + Send + 'static,
    {
        *self
            .on_broadcast
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Box::new(callback);
    }

    /// Replace the callback run when a data packet updates a remote channel.
    pub fn set_on_data<F>(&self, callback: F)
    where
        F: FnMut(&Channel) + Send + 'static,
    {
        *self.on_data.lock().unwrap_or_else(PoisonError::into_inner) = Box::new(callback);
    }

    /// Declare a local channel. Nothing is sent until [`negotiate`](Self::negotiate).
    pub fn open_channel(&self, data: PartPtr) -> Result<ChannelId> {
        let mut state = self.lock();
        let next = state.my_channels.len();
        let id = ChannelId::try_from(next).map_err(|_| RegistryError::TooManyChannels {
            max: MAX_CHANNELS,
        })?;
        state.my_channels.push(Channel::new(id, data));
        debug!(side = %self.side, channel = id, "channel opened");
        Ok(id)
    }

    /// Broadcast every local channel until acknowledged. Controller only.
    ///
    /// Returns `true` iff every channel is acknowledged. Always `false` on a
    /// listener.
    pub fn negotiate(&self) -> bool {
        if self.side != Side::Controller {
            warn!(side = %self.side, "only the controller negotiates");
            return false;
        }
        self.negotiate_report().all_acked()
    }

    /// Like [`negotiate`](Self::negotiate), but reports per-channel results.
    ///
    /// Each channel gets up to `broadcast_attempts` broadcasts, each waiting
    /// up to `ack_timeout`. A channel that runs out of attempts is recorded
    /// as failed and the remaining channels are still negotiated. On a
    /// listener this does nothing and returns an empty report.
    pub fn negotiate_report(&self) -> NegotiationReport {
        let mut report = NegotiationReport::default();
        if self.side != Side::Controller {
            return report;
        }

        let channels: Vec<(ChannelId, PartPtr)> = self
            .lock()
            .my_channels
            .iter()
            .map(|channel| (channel.id, channel.data.clone()))
            .collect();
        info!(side = %self.side, channels = channels.len(), "negotiating");

        for (id, data) in channels {
            let packet = match broadcast_packet(id, &data) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!(channel = id, error = %err, "cannot encode channel schema");
                    report.failed.push(id);
                    continue;
                }
            };

            let mut acked = false;
            for attempt in 1..=self.config.broadcast_attempts {
                debug!(channel = id, attempt, "broadcasting channel");
                let started = Instant::now();
                if !self.sink.send_packet(&packet) {
                    debug!(channel = id, attempt, "broadcast dropped by transport");
                }

                if self.wait_for_ack(id, started) {
                    trace!(
                        channel = id,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "channel acknowledged"
                    );
                    acked = true;
                    break;
                }

                report.failed_attempts += 1;
                self.lock().stats.ack_timeouts += 1;
                warn!(
                    channel = id,
                    attempt,
                    timeout_ms = self.config.ack_timeout.as_millis() as u64,
                    "acknowledgement timed out"
                );
            }

            if acked {
                report.acked.push(id);
            } else {
                report.failed.push(id);
            }
        }

        if report.failed_attempts > 0 {
            warn!(
                failed_attempts = report.failed_attempts,
                failed_channels = report.failed.len(),
                "negotiation finished with timeouts"
            );
        }
        report
    }

    fn wait_for_ack(&self, id: ChannelId, started: Instant) -> bool {
        let deadline = started + self.config.ack_timeout;
        let mut state = self.lock();
        loop {
            if state
                .my_channels
                .get(usize::from(id))
                .is_some_and(|channel| channel.acked)
            {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .ack_arrived
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Publish `data` on local channel `id`.
    ///
    /// Returns `false` without sending if the channel is unknown or not yet
    /// acknowledged; otherwise stores `data` as the channel's part and
    /// returns whether the transport accepted the packet.
    pub fn send_data(&self, id: ChannelId, data: PartPtr) -> bool {
        {
            let mut state = self.lock();
            let Some(channel) = state.my_channels.get_mut(usize::from(id)) else {
                debug!(channel = id, "send on unknown channel");
                return false;
            };
            if !channel.acked {
                debug!(channel = id, "channel not negotiated yet, dropping data");
                return false;
            }
            channel.data = data.clone();
        }

        match data_packet(id, &data) {
            Ok(packet) => self.sink.send_packet(&packet),
            Err(err) => {
                warn!(channel = id, error = %err, "cannot encode channel data");
                false
            }
        }
    }

    /// Refresh local channel `id` from its fetchers and publish it.
    ///
    /// Fetchers only run once the channel is acknowledged.
    pub fn fetch_and_send(&self, id: ChannelId) -> bool {
        let Some(channel) = self.my_channel(id) else {
            debug!(channel = id, "send on unknown channel");
            return false;
        };
        if !channel.acked {
            debug!(channel = id, "channel not negotiated yet, skipping fetch");
            return false;
        }
        lock_part(&channel.data).fetch();
        self.send_data(id, channel.data)
    }

    /// Handle one decoded packet from the peer.
    ///
    /// Invalid, out-of-order and unknown-channel packets are logged, counted
    /// in [`stats`](Self::stats) and dropped.
    pub fn take_packet(&self, packet: &[u8]) {
        trace!(side = %self.side, len = packet.len(), "received packet");
        match validate_packet(packet) {
            PacketValidity::Ok => {}
            PacketValidity::BadChecksum => {
                self.lock().stats.bad_checksum += 1;
                warn!(side = %self.side, len = packet.len(), "bad packet checksum, skipping");
                return;
            }
            PacketValidity::TooSmall => {
                self.lock().stats.too_small += 1;
                warn!(
                    side = %self.side,
                    len = packet.len(),
                    dump = %hex_dump(packet),
                    "packet too small to be valid, skipping"
                );
                return;
            }
        }

        let header = PacketHeader::from_byte(packet[0]);
        match (header.func, header.ty) {
            (PacketFunction::Acknowledge, _) => self.take_acknowledge(packet[1]),
            (PacketFunction::Send, PacketType::Broadcast) => self.take_broadcast(packet),
            (PacketFunction::Send, PacketType::Data) => self.take_data(packet),
            (func @ (PacketFunction::Response | PacketFunction::Request), _) => {
                self.lock().stats.malformed += 1;
                warn!(side = %self.side, ?func, "unsupported packet function, dropping");
            }
        }
    }

    fn take_acknowledge(&self, id: ChannelId) {
        let mut state = self.lock();
        let Some(channel) = state.my_channels.get_mut(usize::from(id)) else {
            state.stats.unknown_ack += 1;
            drop(state);
            warn!(side = %self.side, channel = id, "ack for unknown channel");
            return;
        };
        channel.acked = true;
        drop(state);
        self.ack_arrived.notify_all();
        trace!(side = %self.side, channel = id, "ack received");
    }

    fn take_broadcast(&self, packet: &[u8]) {
        let (id, schema) = match decode_broadcast(packet) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.lock().stats.malformed += 1;
                warn!(side = %self.side, error = %err, "malformed broadcast, dropping");
                return;
            }
        };

        let mut state = self.lock();
        let expected = state.remote_channels.len();
        let index = usize::from(id);
        if index > expected {
            state.stats.out_of_order += 1;
            drop(state);
            warn!(side = %self.side, channel = id, expected, "out of order broadcast, dropping");
            return;
        }
        if index < expected {
            drop(state);
            debug!(side = %self.side, channel = id, "repeated broadcast, acknowledging again");
            self.sink.send_packet(&acknowledge_packet(id));
            return;
        }

        let channel = Channel::new(id, schema);
        state.remote_channels.push(channel.clone());
        drop(state);
        debug!(side = %self.side, channel = id, "remote channel added");

        invoke(&self.on_broadcast, &channel);
        if !self.sink.send_packet(&acknowledge_packet(id)) {
            warn!(side = %self.side, channel = id, "acknowledgement dropped by transport");
        }
    }

    fn take_data(&self, packet: &[u8]) {
        let id = packet[1];
        let Some(channel) = self.remote_channel(id) else {
            self.lock().stats.unknown_channel += 1;
            debug!(side = %self.side, channel = id, "data for unknown channel, dropping");
            return;
        };

        let mut reader = PacketReader::body(packet, 2);
        let decoded = lock_part(&channel.data).read_message(&mut reader);
        if let Err(err) = decoded {
            self.lock().stats.malformed += 1;
            warn!(side = %self.side, channel = id, error = %err, "malformed data packet");
            return;
        }
        invoke(&self.on_data, &channel);
    }

    /// Snapshot of a local channel.
    pub fn my_channel(&self, id: ChannelId) -> Option<Channel> {
        self.lock().my_channels.get(usize::from(id)).cloned()
    }

    /// Snapshot of a channel the peer announced.
    pub fn remote_channel(&self, id: ChannelId) -> Option<Channel> {
        self.lock().remote_channels.get(usize::from(id)).cloned()
    }

    /// Part tree of a channel the peer announced.
    pub fn remote_schema(&self, id: ChannelId) -> Option<PartPtr> {
        self.remote_channel(id).map(|channel| channel.data)
    }

    pub fn my_channels(&self) -> Vec<Channel> {
        self.lock().my_channels.clone()
    }

    pub fn remote_channels(&self) -> Vec<Channel> {
        self.lock().remote_channels.clone()
    }

    pub fn stats(&self) -> RegistryStats {
        self.lock().stats
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Registry")
            .field("side", &self.side)
            .field("my_channels", &state.my_channels.len())
            .field("remote_channels", &state.remote_channels.len())
            .field("stats", &state.stats)
            .finish()
    }
}

fn invoke(callback: &Mutex<ChannelCallback>, channel: &Channel) {
    let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
    (*callback)(channel);
}

fn log_broadcast(channel: &Channel) {
    let schema = pretty_print(&*lock_part(&channel.data));
    info!(channel = channel.id, schema = %schema, "remote channel announced");
}

fn log_data(channel: &Channel) {
    let value = lock_part(&channel.data).value();
    info!(channel = channel.id, value = %value, "channel data");
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, OnceLock, Weak};
    use std::time::Duration;

    use bytes::Bytes;
    use serde_json::json;
    use vdp_frame::checksum;
    use vdp_schema::{part_ptr, Float64, Int16, Record, Text, Uint8};

    use super::*;

    /// Records every packet. Optionally acknowledges broadcasts for the
    /// listed channels straight back into a registry.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Vec<u8>>>,
        ack: Vec<ChannelId>,
        target: OnceLock<Weak<Registry>>,
        accept: Option<bool>,
    }

    impl RecordingSink {
        fn acking(ids: &[ChannelId]) -> Arc<Self> {
            Arc::new(Self {
                ack: ids.to_vec(),
                ..Self::default()
            })
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }

        fn count_with_header(&self, header: u8) -> usize {
            self.sent().iter().filter(|p| p[0] == header).count()
        }
    }

    impl PacketSink for RecordingSink {
        fn send_packet(&self, packet: &[u8]) -> bool {
            self.sent.lock().unwrap().push(packet.to_vec());
            if packet[0] == 0x00 && self.ack.contains(&packet[1]) {
                if let Some(registry) = self.target.get().and_then(Weak::upgrade) {
                    registry.take_packet(&acknowledge_packet(packet[1]));
                }
            }
            self.accept.unwrap_or(true)
        }
    }

    fn fast() -> RegistryConfig {
        RegistryConfig {
            ack_timeout: Duration::from_millis(20),
            broadcast_attempts: 3,
        }
    }

    fn controller(sink: &Arc<RecordingSink>) -> Arc<Registry> {
        let registry = Arc::new(Registry::new(Side::Controller, Arc::clone(sink), fast()));
        let _ = sink.target.set(Arc::downgrade(&registry));
        registry
    }

    fn listener(sink: &Arc<RecordingSink>) -> Registry {
        Registry::new(Side::Listener, Arc::clone(sink), fast())
    }

    fn corrupt(packet: Bytes) -> Vec<u8> {
        let mut packet = packet.to_vec();
        packet[1] ^= 0x40;
        packet
    }

    #[test]
    fn open_channel_assigns_sequential_ids() {
        let sink = RecordingSink::acking(&[]);
        let registry = listener(&sink);
        for expected in 0..3u8 {
            let id = registry.open_channel(part_ptr(Uint8::new("n"))).unwrap();
            assert_eq!(id, expected);
        }
        assert_eq!(registry.my_channels().len(), 3);
        assert!(registry.my_channels().iter().all(|c| !c.acked));
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn open_channel_limit() {
        let sink = RecordingSink::acking(&[]);
        let registry = listener(&sink);
        for _ in 0..MAX_CHANNELS {
            registry.open_channel(part_ptr(Uint8::new("n"))).unwrap();
        }
        let err = registry.open_channel(part_ptr(Uint8::new("n"))).unwrap_err();
        assert!(matches!(err, RegistryError::TooManyChannels { max: 256 }));
    }

    #[test]
    fn listener_does_not_negotiate() {
        let sink = RecordingSink::acking(&[0]);
        let registry = listener(&sink);
        registry.open_channel(part_ptr(Uint8::new("n"))).unwrap();
        assert!(!registry.negotiate());
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn negotiate_with_no_channels_succeeds() {
        let sink = RecordingSink::acking(&[]);
        let registry = controller(&sink);
        assert!(registry.negotiate());
    }

    #[test]
    fn partial_negotiation_and_guarded_send() {
        let sink = RecordingSink::acking(&[0]);
        let registry = controller(&sink);
        let speed = part_ptr(Float64::new("speed"));
        let mode = part_ptr(Text::new("mode"));
        assert_eq!(registry.open_channel(speed.clone()).unwrap(), 0);
        assert_eq!(registry.open_channel(mode.clone()).unwrap(), 1);

        let report = registry.negotiate_report();
        assert_eq!(report.acked, vec![0]);
        assert_eq!(report.failed, vec![1]);
        assert_eq!(report.failed_attempts, 3);
        assert!(!report.all_acked());
        assert_eq!(registry.stats().ack_timeouts, 3);

        // one broadcast for channel 0, three for channel 1
        assert_eq!(sink.count_with_header(0x00), 4);
        assert!(registry.my_channel(0).unwrap().acked);
        assert!(!registry.my_channel(1).unwrap().acked);

        let before = sink.sent().len();
        assert!(registry.send_data(0, speed));
        assert_eq!(sink.sent().len(), before + 1);
        assert_eq!(&sink.sent()[before][..2], &[0x80, 0x00]);

        assert!(!registry.send_data(1, mode));
        assert!(!registry.send_data(9, part_ptr(Uint8::new("x"))));
        assert_eq!(sink.sent().len(), before + 1);
    }

    #[test]
    fn negotiate_is_bounded() {
        let sink = RecordingSink::acking(&[]);
        let registry = controller(&sink);
        registry.open_channel(part_ptr(Uint8::new("a"))).unwrap();
        registry.open_channel(part_ptr(Uint8::new("b"))).unwrap();

        let started = Instant::now();
        assert!(!registry.negotiate());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(2 * 3 * 20));
        assert!(elapsed < Duration::from_millis(2 * 3 * 20 + 500));
    }

    #[test]
    fn ack_from_another_thread_wakes_negotiation() {
        let sink = RecordingSink::acking(&[]);
        let registry = Arc::new(Registry::new(
            Side::Controller,
            Arc::clone(&sink),
            RegistryConfig {
                ack_timeout: Duration::from_secs(2),
                broadcast_attempts: 1,
            },
        ));
        registry.open_channel(part_ptr(Uint8::new("a"))).unwrap();

        let peer = Arc::clone(&registry);
        let acker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            peer.take_packet(&acknowledge_packet(0));
        });

        let started = Instant::now();
        assert!(registry.negotiate());
        assert!(started.elapsed() < Duration::from_secs(1));
        acker.join().unwrap();
    }

    #[test]
    fn broadcast_is_added_and_acknowledged() {
        let sink = RecordingSink::acking(&[]);
        let registry = listener(&sink);
        let announced = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&announced);
        registry.set_on_broadcast(move |channel| seen.lock().unwrap().push(channel.name()));

        let schema = part_ptr(Record::new("imu").field(Int16::new("yaw")));
        registry.take_packet(&broadcast_packet(0, &schema).unwrap());

        assert_eq!(registry.remote_channels().len(), 1);
        assert_eq!(*announced.lock().unwrap(), vec!["imu".to_string()]);
        assert_eq!(sink.sent(), vec![acknowledge_packet(0).to_vec()]);
    }

    #[test]
    fn out_of_order_broadcast_is_dropped() {
        let sink = RecordingSink::acking(&[]);
        let registry = listener(&sink);
        let schema = part_ptr(Uint8::new("late"));

        registry.take_packet(&broadcast_packet(1, &schema).unwrap());

        assert!(registry.remote_channels().is_empty());
        assert!(sink.sent().is_empty());
        assert_eq!(registry.stats().out_of_order, 1);
    }

    #[test]
    fn repeated_broadcast_is_reacknowledged_without_growing() {
        let sink = RecordingSink::acking(&[]);
        let registry = listener(&sink);
        let schema = part_ptr(Uint8::new("n"));

        registry.take_packet(&broadcast_packet(0, &schema).unwrap());
        registry.take_packet(&broadcast_packet(0, &schema).unwrap());

        assert_eq!(registry.remote_channels().len(), 1);
        assert_eq!(sink.count_with_header(0x20), 2);
    }

    #[test]
    fn data_updates_remote_channel() {
        let sink = RecordingSink::acking(&[]);
        let registry = listener(&sink);
        let updates = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&updates);
        registry.set_on_data(move |channel| {
            seen.lock().unwrap().push(lock_part(&channel.data).value());
        });

        let schema = part_ptr(Record::new("imu").field(Int16::new("yaw")));
        registry.take_packet(&broadcast_packet(0, &schema).unwrap());

        let mut source = Int16::new("yaw");
        source.set(-90);
        let source = part_ptr(Record::new("imu").field(source));
        registry.take_packet(&data_packet(0, &source).unwrap());

        assert_eq!(*updates.lock().unwrap(), vec![json!({ "yaw": -90 })]);
        let remote = registry.remote_schema(0).unwrap();
        assert_eq!(lock_part(&remote).value(), json!({ "yaw": -90 }));
    }

    #[test]
    fn data_for_unknown_channel_is_dropped() {
        let sink = RecordingSink::acking(&[]);
        let registry = listener(&sink);
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        registry.set_on_data(move |_| *flag.lock().unwrap() = true);

        registry.take_packet(&data_packet(3, &part_ptr(Uint8::new("n"))).unwrap());

        assert!(!*called.lock().unwrap());
        assert_eq!(registry.stats().unknown_channel, 1);
    }

    #[test]
    fn truncated_data_is_malformed() {
        let sink = RecordingSink::acking(&[]);
        let registry = listener(&sink);
        registry.take_packet(&broadcast_packet(0, &part_ptr(Float64::new("x"))).unwrap());

        registry.take_packet(&data_packet(0, &part_ptr(Uint8::new("x"))).unwrap());
        assert_eq!(registry.stats().malformed, 1);
    }

    #[test]
    fn ack_for_unknown_channel_is_ignored() {
        let sink = RecordingSink::acking(&[]);
        let registry = controller(&sink);
        registry.take_packet(&acknowledge_packet(7));
        assert_eq!(registry.stats().unknown_ack, 1);
        assert!(registry.my_channels().is_empty());
    }

    #[test]
    fn ack_is_idempotent() {
        let sink = RecordingSink::acking(&[]);
        let registry = controller(&sink);
        registry.open_channel(part_ptr(Uint8::new("n"))).unwrap();
        registry.take_packet(&acknowledge_packet(0));
        registry.take_packet(&acknowledge_packet(0));
        assert!(registry.my_channel(0).unwrap().acked);
    }

    #[test]
    fn integrity_failures_are_counted() {
        let sink = RecordingSink::acking(&[]);
        let registry = listener(&sink);

        registry.take_packet(&[0x20, 0x00, 0x01]);
        registry.take_packet(&corrupt(acknowledge_packet(0)));

        let stats = registry.stats();
        assert_eq!(stats.too_small, 1);
        assert_eq!(stats.bad_checksum, 1);
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn acknowledge_ignores_type_bit() {
        let sink = RecordingSink::acking(&[]);
        let registry = controller(&sink);
        registry.open_channel(part_ptr(Uint8::new("n"))).unwrap();

        let mut packet = vec![0xA0, 0x00];
        packet.extend_from_slice(&checksum(&packet).to_le_bytes());
        registry.take_packet(&packet);
        assert!(registry.my_channel(0).unwrap().acked);
    }

    #[test]
    fn send_reports_transport_refusal() {
        let sink = Arc::new(RecordingSink {
            ack: vec![0],
            accept: Some(false),
            ..RecordingSink::default()
        });
        let registry = controller(&sink);
        let data = part_ptr(Uint8::new("n"));
        registry.open_channel(data.clone()).unwrap();
        assert!(registry.negotiate());
        assert!(!registry.send_data(0, data));
    }

    #[test]
    fn send_data_replaces_stored_part() {
        let sink = RecordingSink::acking(&[0]);
        let registry = controller(&sink);
        registry.open_channel(part_ptr(Uint8::new("old"))).unwrap();
        assert!(registry.negotiate());

        assert!(registry.send_data(0, part_ptr(Uint8::new("new"))));
        assert_eq!(registry.my_channel(0).unwrap().name(), "new");
    }

    #[test]
    fn fetch_and_send_pulls_fresh_values() {
        let sink = RecordingSink::acking(&[0]);
        let registry = controller(&sink);
        let mut tick = 0u8;
        registry
            .open_channel(part_ptr(Uint8::with_fetcher("tick", move || {
                tick += 1;
                tick
            })))
            .unwrap();
        assert!(registry.negotiate());

        assert!(registry.fetch_and_send(0));
        assert!(registry.fetch_and_send(0));
        let data: Vec<_> = sink.sent().into_iter().filter(|p| p[0] == 0x80).collect();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0][2], 1);
        assert_eq!(data[1][2], 2);
    }

    #[test]
    fn fetch_waits_for_acknowledgement() {
        let sink = RecordingSink::acking(&[]);
        let registry = controller(&sink);
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);
        registry
            .open_channel(part_ptr(Uint8::with_fetcher("tick", move || {
                *counter.lock().unwrap() += 1;
                1
            })))
            .unwrap();

        assert!(!registry.fetch_and_send(0));
        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn poll_functions_are_rejected() {
        let sink = RecordingSink::acking(&[]);
        let registry = listener(&sink);
        registry.take_packet(&broadcast_packet(0, &part_ptr(Uint8::new("n"))).unwrap());

        let updated = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&updated);
        registry.set_on_data(move |_| *flag.lock().unwrap() = true);

        for header in [0xC0u8, 0xE0] {
            let mut packet = vec![header, 0x00, 0x07];
            packet.extend_from_slice(&checksum(&packet).to_le_bytes());
            registry.take_packet(&packet);
        }

        assert!(!*updated.lock().unwrap());
        assert_eq!(registry.stats().malformed, 2);
        let remote = registry.remote_schema(0).unwrap();
        assert_eq!(lock_part(&remote).value(), json!(0));
    }

    #[test]
    fn runt_packet_is_not_dispatched() {
        let sink = RecordingSink::acking(&[]);
        let registry = controller(&sink);
        registry.open_channel(part_ptr(Uint8::new("n"))).unwrap();

        registry.take_packet(&[0x20, 0x00, 0x00, 0x00, 0x00]);

        assert!(!registry.my_channel(0).unwrap().acked);
        assert_eq!(registry.stats().too_small, 1);
        assert_eq!(registry.stats().bad_checksum, 0);
    }
}
