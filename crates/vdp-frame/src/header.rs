//! The control byte that opens every packet.
//!
//! ```text
//!  bit   7     6..5   4..0
//!      type   func    (0)
//! ```
//!
//! Bits 4..0 are written as zero and ignored when reading. Of the four
//! function codes, only Send and Acknowledge are handled by the registry;
//! Response and Request come from a polling variant of the protocol and are
//! decoded so they can be rejected.

const TYPE_BIT: u8 = 7;
const FUNCTION_SHIFT: u8 = 5;
const FUNCTION_MASK: u8 = 0b11;

/// What a packet is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Channel announcement (schema).
    Broadcast,
    /// Channel value update.
    Data,
}

/// What a packet asks of the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketFunction {
    /// Deliver the contents.
    Send,
    /// Confirm receipt of a broadcast.
    Acknowledge,
    /// Answer to a poll. Not used by this protocol variant.
    Response,
    /// Poll the peer. Not used by this protocol variant.
    Request,
}

impl PacketFunction {
    const fn code(self) -> u8 {
        match self {
            Self::Send => 0,
            Self::Acknowledge => 1,
            Self::Response => 2,
            Self::Request => 3,
        }
    }

    const fn from_code(code: u8) -> Self {
        match code & FUNCTION_MASK {
            0 => Self::Send,
            1 => Self::Acknowledge,
            2 => Self::Response,
            _ => Self::Request,
        }
    }
}

/// Decoded form of the first packet byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketHeader {
    pub ty: PacketType,
    pub func: PacketFunction,
}

impl PacketHeader {
    pub const fn new(ty: PacketType, func: PacketFunction) -> Self {
        Self { ty, func }
    }

    /// Pack into a header byte.
    pub const fn to_byte(self) -> u8 {
        let ty = match self.ty {
            PacketType::Broadcast => 0,
            PacketType::Data => 1,
        };
        (ty << TYPE_BIT) | (self.func.code() << FUNCTION_SHIFT)
    }

    /// Unpack a header byte.
    pub const fn from_byte(byte: u8) -> Self {
        let ty = if (byte >> TYPE_BIT) & 1 == 1 {
            PacketType::Data
        } else {
            PacketType::Broadcast
        };
        let func = PacketFunction::from_code(byte >> FUNCTION_SHIFT);
        Self { ty, func }
    }
}

impl From<u8> for PacketHeader {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

impl From<PacketHeader> for u8 {
    fn from(header: PacketHeader) -> Self {
        header.to_byte()
    }
}
