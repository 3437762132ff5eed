use tracing::trace;

/// Size of the CRC-32 trailer at the end of every packet.
pub const CHECKSUM_SIZE: usize = 4;

/// Header byte + channel id byte + checksum trailer.
pub const MIN_PACKET_SIZE: usize = 2 + CHECKSUM_SIZE;

/// Outcome of checking a decoded packet before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketValidity {
    /// Size and checksum are both fine.
    Ok,
    /// Fewer than [`MIN_PACKET_SIZE`] bytes.
    TooSmall,
    /// The trailer does not match the computed checksum.
    BadChecksum,
}

/// CRC-32 (IEEE 802.3, reflected, init and final XOR `0xFFFFFFFF`).
pub fn checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Classify a decoded packet. Purely advisory: nothing is corrected or retried.
///
/// The trailer is little-endian: the byte at `len - 4` is the least
/// significant byte of the checksum and the byte at `len - 1` the most
/// significant.
pub fn validate_packet(packet: &[u8]) -> PacketValidity {
    if packet.len() < MIN_PACKET_SIZE {
        return PacketValidity::TooSmall;
    }

    let (body, trailer) = packet.split_at(packet.len() - CHECKSUM_SIZE);
    let expected = checksum(body);
    let written = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);

    if expected != written {
        trace!(
            expected = format_args!("{expected:08x}"),
            written = format_args!("{written:08x}"),
            "checksum mismatch"
        );
        return PacketValidity::BadChecksum;
    }
    PacketValidity::Ok
}
