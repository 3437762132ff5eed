use std::fmt;

use vdp_schema::{lock_part, PartPtr};

/// Channel identifier. Assigned sequentially from 0 on each side.
pub type ChannelId = u8;

/// Most channels one side can declare (or learn from its peer).
pub const MAX_CHANNELS: usize = ChannelId::MAX as usize + 1;

/// Protocol role of one end of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Initiates negotiation.
    Controller,
    /// Answers broadcasts.
    Listener,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Controller => f.write_str("controller"),
            Self::Listener => f.write_str("listener"),
        }
    }
}

/// A negotiated unit of data exchange.
#[derive(Clone)]
pub struct Channel {
    pub id: ChannelId,
    /// Schema and current value, shared with the application.
    pub data: PartPtr,
    /// Set once the peer acknowledged this channel's broadcast. Only
    /// meaningful for locally declared channels.
    pub acked: bool,
}

impl Channel {
    pub fn new(id: ChannelId, data: PartPtr) -> Self {
        Self {
            id,
            data,
            acked: false,
        }
    }

    /// Name of the channel's root part.
    pub fn name(&self) -> String {
        lock_part(&self.data).name().to_owned()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("acked", &self.acked)
            .finish()
    }
}
