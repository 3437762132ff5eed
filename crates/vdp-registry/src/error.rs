/// Errors that can occur while setting up channels or the transport.
///
/// Problems with individual packets on the wire are not errors: they are
/// logged, counted and dropped.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Link-level error.
    #[error("link error: {0}")]
    Link(#[from] vdp_link::LinkError),

    /// Packet contents could not be read or written.
    #[error("frame error: {0}")]
    Frame(#[from] vdp_frame::FrameError),

    /// A schema could not be encoded or decoded.
    #[error("schema error: {0}")]
    Schema(#[from] vdp_schema::SchemaError),

    /// Channel ids are one byte wide.
    #[error("cannot open more than {max} channels")]
    TooManyChannels { max: usize },

    /// A transport thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
