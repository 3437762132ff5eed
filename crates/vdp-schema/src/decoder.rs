use tracing::trace;
use vdp_frame::PacketReader;

use crate::error::{Result, SchemaError};
use crate::number::{Float32, Float64, Int16, Int32, Int64, Int8, Uint16, Uint32, Uint64, Uint8};
use crate::part::{part_ptr, PartPtr};
use crate::record::Record;
use crate::text::Text;
use crate::types::SchemaType;

/// Deepest record nesting accepted from a peer.
pub const MAX_DEPTH: usize = 16;

/// Rebuild a part tree from the schema section of a broadcast.
///
/// The decoded parts carry default values until the first data message.
pub fn decode_schema(reader: &mut PacketReader<'_>) -> Result<PartPtr> {
    decode_part(reader, 0)
}

fn decode_part(reader: &mut PacketReader<'_>, depth: usize) -> Result<PartPtr> {
    let offset = reader.position();
    let byte = reader.get_u8()?;
    let ty = SchemaType::from_byte(byte).ok_or(SchemaError::UnknownType { ty: byte, offset })?;
    let name = reader.get_str()?.to_owned();
    trace!(%ty, name = %name, depth, "decoding schema part");

    let part = match ty {
        SchemaType::Record => {
            if depth >= MAX_DEPTH {
                return Err(SchemaError::TooDeep { max: MAX_DEPTH });
            }
            let count = reader.get_u32()?;
            let mut fields = Vec::new();
            for _ in 0..count {
                fields.push(decode_part(reader, depth + 1)?);
            }
            part_ptr(Record::with_fields(name, fields))
        }
        SchemaType::String => part_ptr(Text::new(name)),
        SchemaType::Double => part_ptr(Float64::new(name)),
        SchemaType::Float => part_ptr(Float32::new(name)),
        SchemaType::Uint8 => part_ptr(Uint8::new(name)),
        SchemaType::Uint16 => part_ptr(Uint16::new(name)),
        SchemaType::Uint32 => part_ptr(Uint32::new(name)),
        SchemaType::Uint64 => part_ptr(Uint64::new(name)),
        SchemaType::Int8 => part_ptr(Int8::new(name)),
        SchemaType::Int16 => part_ptr(Int16::new(name)),
        SchemaType::Int32 => part_ptr(Int32::new(name)),
        SchemaType::Int64 => part_ptr(Int64::new(name)),
    };
    Ok(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::{lock_part, pretty_print, Part};
    use vdp_frame::{FrameError, PacketFunction, PacketHeader, PacketType, PacketWriter};

    fn broadcast_writer() -> PacketWriter {
        PacketWriter::new(PacketHeader::new(PacketType::Broadcast, PacketFunction::Send))
    }

    #[test]
    fn rebuilds_written_schema() {
        let source = Record::new("drive")
            .field(Float32::new("left"))
            .field(Float32::new("right"))
            .field(Record::new("flags").field(Uint8::new("brake")).field(Text::new("gear")))
            .field(Int64::new("ticks"));

        let mut writer = broadcast_writer();
        source.write_schema(&mut writer).unwrap();
        let packet = writer.finish();

        let mut reader = PacketReader::body(&packet, 1);
        let decoded = decode_schema(&mut reader).unwrap();
        assert!(reader.is_empty());

        let decoded = lock_part(&decoded);
        assert_eq!(decoded.schema_type(), SchemaType::Record);
        assert_eq!(pretty_print(&*decoded), pretty_print(&source));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut writer = broadcast_writer();
        writer.put_u8(2);
        writer.put_str("bad").unwrap();
        let packet = writer.finish();

        let err = decode_schema(&mut PacketReader::body(&packet, 1)).err().unwrap();
        assert_eq!(err, SchemaError::UnknownType { ty: 2, offset: 1 });
    }

    #[test]
    fn truncated_record_is_rejected() {
        let mut writer = broadcast_writer();
        writer.put_u8(0);
        writer.put_str("r").unwrap();
        writer.put_u32(3);
        writer.put_u8(5);
        writer.put_str("a").unwrap();
        let packet = writer.finish();

        let err = decode_schema(&mut PacketReader::body(&packet, 1)).err().unwrap();
        assert!(matches!(err, SchemaError::Frame(FrameError::Truncated { .. })));
    }

    #[test]
    fn nesting_is_bounded() {
        let mut writer = broadcast_writer();
        for _ in 0..=MAX_DEPTH {
            writer.put_u8(0);
            writer.put_str("r").unwrap();
            writer.put_u32(1);
        }
        writer.put_u8(5);
        writer.put_str("leaf").unwrap();
        let packet = writer.finish();

        let err = decode_schema(&mut PacketReader::body(&packet, 1)).err().unwrap();
        assert_eq!(err, SchemaError::TooDeep { max: MAX_DEPTH });
    }

    #[test]
    fn nesting_at_limit_is_accepted() {
        let mut writer = broadcast_writer();
        for _ in 0..MAX_DEPTH {
            writer.put_u8(0);
            writer.put_str("r").unwrap();
            writer.put_u32(1);
        }
        writer.put_u8(5);
        writer.put_str("leaf").unwrap();
        let packet = writer.finish();

        assert!(decode_schema(&mut PacketReader::body(&packet, 1)).is_ok());
    }
}
