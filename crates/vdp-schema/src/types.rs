use std::fmt;

/// Type tag written before every part in a schema broadcast.
///
/// Byte value 2 is unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SchemaType {
    Record = 0,
    String = 1,
    Double = 3,
    Float = 4,
    Uint8 = 5,
    Uint16 = 6,
    Uint32 = 7,
    Uint64 = 8,
    Int8 = 9,
    Int16 = 10,
    Int32 = 11,
    Int64 = 12,
}

impl SchemaType {
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Record,
            1 => Self::String,
            3 => Self::Double,
            4 => Self::Float,
            5 => Self::Uint8,
            6 => Self::Uint16,
            7 => Self::Uint32,
            8 => Self::Uint64,
            9 => Self::Int8,
            10 => Self::Int16,
            11 => Self::Int32,
            12 => Self::Int64,
            _ => return None,
        })
    }

    /// Lowercase name used in pretty-printed schemas.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::String => "string",
            Self::Double => "double",
            Self::Float => "float",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
