use std::time::Duration;

use vdp_link::LinkConfig;

/// Frames each queue holds before further frames are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;
/// Sleep taken by a loop iteration that found nothing to do.
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(2);
/// Largest single read from the link.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;
/// Longest encoded frame the accumulator will hold.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4096;
/// How long one broadcast attempt waits for its acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(500);
/// Broadcasts sent per channel before it is given up on.
pub const DEFAULT_BROADCAST_ATTEMPTS: u32 = 3;

/// Controls the link and decode loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Applied to the link once, before the link loop starts.
    pub link: LinkConfig,
    /// Capacity of both the inbound and the outbound frame queue.
    pub queue_capacity: usize,
    /// Sleep when an iteration neither wrote nor read.
    pub idle_delay: Duration,
    /// Maximum bytes read from the link per iteration.
    pub read_chunk_size: usize,
    /// Encoded frames longer than this are discarded while accumulating.
    pub max_frame_size: usize,
    /// Emit a delimiter before every frame as well as after it.
    pub leading_delimiter: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            idle_delay: DEFAULT_IDLE_DELAY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            leading_delimiter: false,
        }
    }
}

/// Controls channel negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Wait per broadcast attempt.
    pub ack_timeout: Duration,
    /// Attempts per channel.
    pub broadcast_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            broadcast_attempts: DEFAULT_BROADCAST_ATTEMPTS,
        }
    }
}
