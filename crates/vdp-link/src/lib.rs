//! Non-blocking byte-link abstraction.
//!
//! The protocol stack never blocks on I/O. A [`Link`] only answers "how many
//! bytes can I read", "how much room is there to write", and moves bytes in
//! and out without waiting. Concrete links:
//! - [`MemoryLink`]: an in-process pair of bounded byte pipes
//! - [`UnixLink`]: a non-blocking Unix domain stream (unix only)
//!
//! This is the lowest layer of vdp. Everything else builds on top of the
//! [`Link`] trait defined here.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{LinkError, Result};
pub use memory::MemoryLink;
pub use traits::{Link, LinkConfig, DEFAULT_BAUD_RATE};

#[cfg(unix)]
pub use uds::{UnixLink, UnixLinkListener};
