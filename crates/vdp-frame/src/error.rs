/// Errors that can occur while reading or writing packet contents.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A read needed more bytes than the packet holds.
    #[error("packet truncated: need {needed} bytes at offset {offset}, packet is {len} bytes")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    /// A string field ran to the end of the packet without its NUL terminator.
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    /// A string field is not valid UTF-8.
    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidString { offset: usize },

    /// A string to be written contains an embedded NUL.
    #[error("string contains an embedded NUL byte")]
    EmbeddedNul,
}

pub type Result<T> = std::result::Result<T, FrameError>;
