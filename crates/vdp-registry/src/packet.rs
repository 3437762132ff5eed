//! Builders for the three packet shapes and the broadcast parser.
//!
//! ```text
//! broadcast    00 id <schema...>  crc32
//! acknowledge  20 id              crc32
//! data         80 id <values...>  crc32
//! ```

use bytes::Bytes;
use vdp_frame::{PacketFunction, PacketHeader, PacketReader, PacketType, PacketWriter};
use vdp_schema::{decode_schema, lock_part, PartPtr};

use crate::channel::ChannelId;
use crate::error::Result;

const BROADCAST: PacketHeader = PacketHeader::new(PacketType::Broadcast, PacketFunction::Send);
const ACKNOWLEDGE: PacketHeader =
    PacketHeader::new(PacketType::Broadcast, PacketFunction::Acknowledge);
const DATA: PacketHeader = PacketHeader::new(PacketType::Data, PacketFunction::Send);

/// Announce channel `id` with the schema of `data`.
pub fn broadcast_packet(id: ChannelId, data: &PartPtr) -> Result<Bytes> {
    let mut writer = PacketWriter::new(BROADCAST);
    writer.put_u8(id);
    lock_part(data).write_schema(&mut writer)?;
    Ok(writer.finish())
}

/// Confirm receipt of the broadcast for channel `id`.
pub fn acknowledge_packet(id: ChannelId) -> Bytes {
    let mut writer = PacketWriter::new(ACKNOWLEDGE);
    writer.put_u8(id);
    writer.finish()
}

/// Carry the current value of `data` on channel `id`.
pub fn data_packet(id: ChannelId, data: &PartPtr) -> Result<Bytes> {
    let mut writer = PacketWriter::new(DATA);
    writer.put_u8(id);
    lock_part(data).write_message(&mut writer)?;
    Ok(writer.finish())
}

/// Parse a validated broadcast into its channel id and a fresh part tree.
pub fn decode_broadcast(packet: &[u8]) -> Result<(ChannelId, PartPtr)> {
    let mut reader = PacketReader::body(packet, 1);
    let id = reader.get_u8()?;
    let schema = decode_schema(&mut reader)?;
    Ok((id, schema))
}
