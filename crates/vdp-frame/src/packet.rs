use std::fmt::Write as _;

use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::{checksum, CHECKSUM_SIZE};
use crate::error::{FrameError, Result};
use crate::header::PacketHeader;

const INITIAL_PACKET_CAPACITY: usize = 64;

/// Builds one packet: header byte, body, then the CRC-32 trailer on
/// [`finish`](PacketWriter::finish).
///
/// Multi-byte numbers are little-endian. Strings are NUL-terminated.
#[derive(Debug, Clone)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    /// Start a packet with the given header byte.
    pub fn new(header: PacketHeader) -> Self {
        let mut buf = BytesMut::with_capacity(INITIAL_PACKET_CAPACITY);
        buf.put_u8(header.to_byte());
        Self { buf }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    /// Append raw bytes (already in wire order).
    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Append a NUL-terminated string.
    pub fn put_str(&mut self, value: &str) -> Result<()> {
        if value.as_bytes().contains(&0) {
            return Err(FrameError::EmbeddedNul);
        }
        self.buf.put_slice(value.as_bytes());
        self.buf.put_u8(0);
        Ok(())
    }

    /// Bytes written so far, without a trailer.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append the checksum trailer and hand back the finished packet.
    pub fn finish(mut self) -> Bytes {
        let crc = checksum(&self.buf);
        self.buf.reserve(CHECKSUM_SIZE);
        self.buf.put_u32_le(crc);
        self.buf.freeze()
    }
}

/// Bounds-checked cursor over the body of a received packet.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Read `data` from the start.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read a whole packet from `start`, stopping before the checksum trailer.
    pub fn body(packet: &'a [u8], start: usize) -> Self {
        let end = packet.len().saturating_sub(CHECKSUM_SIZE);
        Self {
            data: &packet[..end],
            pos: start.min(end),
        }
    }

    /// Current offset into the data.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(FrameError::Truncated {
                offset: self.pos,
                needed: n,
                len: self.data.len(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a NUL-terminated string, consuming the terminator.
    pub fn get_str(&mut self) -> Result<&'a str> {
        let start = self.pos;
        let rest = &self.data[start..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(FrameError::UnterminatedString { offset: start })?;
        let text = std::str::from_utf8(&rest[..nul])
            .map_err(|_| FrameError::InvalidString { offset: start })?;
        self.pos += nul + 1;
        Ok(text)
    }
}

/// Render bytes as lowercase hex, 16 per line.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, chunk) in bytes.chunks(16).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for (j, byte) in chunk.iter().enumerate() {
            if j > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{byte:02x}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{validate_packet, PacketValidity};
    use crate::header::{PacketFunction, PacketType};

    #[test]
    fn writer_produces_valid_packet() {
        let mut writer = PacketWriter::new(PacketHeader::new(PacketType::Data, PacketFunction::Send));
        writer.put_u8(3);
        writer.put_u32(0xDEAD_BEEF);
        writer.put_str("hi").unwrap();
        assert_eq!(writer.len(), 1 + 1 + 4 + 3);

        let packet = writer.finish();
        assert_eq!(packet.len(), 9 + CHECKSUM_SIZE);
        assert_eq!(&packet[..2], &[0x80, 0x03]);
        assert_eq!(&packet[2..6], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(&packet[6..9], b"hi\0");
        assert_eq!(validate_packet(&packet), PacketValidity::Ok);
    }

    #[test]
    fn writer_rejects_embedded_nul() {
        let mut writer = PacketWriter::new(PacketHeader::new(PacketType::Broadcast, PacketFunction::Send));
        assert_eq!(writer.put_str("a\0b"), Err(FrameError::EmbeddedNul));
    }

    #[test]
    fn reader_walks_body_and_skips_trailer() {
        let mut writer = PacketWriter::new(PacketHeader::new(PacketType::Broadcast, PacketFunction::Send));
        writer.put_u8(7);
        writer.put_str("speed").unwrap();
        writer.put_u32(42);
        let packet = writer.finish();

        let mut reader = PacketReader::body(&packet, 1);
        assert_eq!(reader.get_u8().unwrap(), 7);
        assert_eq!(reader.get_str().unwrap(), "speed");
        assert_eq!(reader.get_u32().unwrap(), 42);
        assert!(reader.is_empty());
        assert!(matches!(reader.get_u8(), Err(FrameError::Truncated { .. })));
    }

    #[test]
    fn reader_reports_unterminated_string() {
        let mut reader = PacketReader::new(b"abc");
        assert_eq!(
            reader.get_str(),
            Err(FrameError::UnterminatedString { offset: 0 })
        );
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn reader_reports_truncated_number() {
        let mut reader = PacketReader::new(&[1, 2]);
        assert_eq!(
            reader.get_u32(),
            Err(FrameError::Truncated {
                offset: 0,
                needed: 4,
                len: 2
            })
        );
    }

    #[test]
    fn body_of_tiny_packet_is_empty() {
        let reader = PacketReader::body(&[1, 2], 1);
        assert!(reader.is_empty());
    }

    #[test]
    fn hex_dump_wraps_at_sixteen() {
        let bytes: Vec<u8> = (0..18).collect();
        let dump = hex_dump(&bytes);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f");
        assert_eq!(lines[1], "10 11");
    }
}
