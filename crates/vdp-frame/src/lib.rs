//! Wire formats for the VDP serial protocol.
//!
//! A packet travels the link as:
//! - a COBS-stuffed frame terminated by a `0x00` delimiter ([`cobs`])
//! - which decodes to `[header][channel id?][payload...][crc32 LE]` ([`packet`])
//! - whose first byte carries the function and type bits ([`header`])
//! - and whose last four bytes are a CRC-32 trailer ([`checksum`])
//!
//! Nothing here keeps state between packets.

pub mod checksum;
pub mod cobs;
pub mod error;
pub mod header;
pub mod packet;

pub use checksum::{checksum, validate_packet, PacketValidity, CHECKSUM_SIZE, MIN_PACKET_SIZE};
pub use cobs::{cobs_decode, cobs_encode, max_encoded_len, DELIMITER};
pub use error::{FrameError, Result};
pub use header::{PacketFunction, PacketHeader, PacketType};
pub use packet::{hex_dump, PacketReader, PacketWriter};
