use vdp_frame::FrameError;

/// Errors that can occur while encoding or decoding a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The underlying packet bytes were malformed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A type byte does not name any known part type.
    #[error("unknown schema type {ty} at offset {offset}")]
    UnknownType { ty: u8, offset: usize },

    /// Records nested deeper than the decoder allows.
    #[error("schema nesting exceeds {max} levels")]
    TooDeep { max: usize },
}

pub type Result<T> = std::result::Result<T, SchemaError>;
