//! Channel negotiation and transport for VDP.
//!
//! - [`Registry`]: the per-device channel state machine. Declares local
//!   channels, negotiates them with the peer, tracks channels the peer
//!   announced, and dispatches every decoded packet.
//! - [`CobsTransport`]: the link loop and decode loop pair, joined by two
//!   bounded [`FrameQueue`]s.
//!
//! The two meet through [`PacketSink`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use vdp_link::MemoryLink;
//! use vdp_registry::{CobsTransport, Registry, RegistryConfig, Side, TransportConfig};
//!
//! # fn main() -> vdp_registry::Result<()> {
//! let (link, _peer) = MemoryLink::pair();
//! let transport = CobsTransport::new(TransportConfig::default());
//! let registry = Arc::new(Registry::new(
//!     Side::Controller,
//!     transport.sender(),
//!     RegistryConfig::default(),
//! ));
//! let dispatch = Arc::clone(&registry);
//! let _handle = transport.spawn(link, move |packet| dispatch.take_packet(packet))?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod packet;
pub mod queue;
pub mod registry;
pub mod transport;

pub use channel::{Channel, ChannelId, Side, MAX_CHANNELS};
pub use config::{
    RegistryConfig, TransportConfig, DEFAULT_ACK_TIMEOUT, DEFAULT_BROADCAST_ATTEMPTS,
    DEFAULT_IDLE_DELAY, DEFAULT_MAX_FRAME_SIZE, DEFAULT_QUEUE_CAPACITY, DEFAULT_READ_CHUNK_SIZE,
};
pub use error::{RegistryError, Result};
pub use packet::{acknowledge_packet, broadcast_packet, data_packet, decode_broadcast};
pub use queue::FrameQueue;
pub use registry::{NegotiationReport, Registry, RegistryStats};
pub use transport::{
    CobsTransport, DecodeLoop, LinkLoop, PacketSender, PacketSink, TransportHandle, TransportStats,
};
