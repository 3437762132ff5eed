//! Channel negotiation and data exchange between two nodes on a serial link.
//!
//! One side (the controller) declares channels and negotiates them with the
//! other (the listener); afterwards either side publishes best-effort value
//! updates. Every packet is CRC-32 checked and COBS framed.
//!
//! # Crate Structure
//!
//! - [`link`]: Non-blocking byte links (in-memory pairs, Unix sockets)
//! - [`frame`]: COBS framing, CRC-32 integrity check, packet header and contents
//! - [`schema`]: Self-describing channel schemas (behind `registry` feature)
//! - [`registry`]: Channel registry and transport loops (behind `registry` feature)

/// Re-export link types.
pub mod link {
    pub use vdp_link::*;
}

/// Re-export frame types.
pub mod frame {
    pub use vdp_frame::*;
}

/// Re-export schema types (requires `registry` feature).
#[cfg(feature = "registry")]
pub mod schema {
    pub use vdp_schema::*;
}

/// Re-export registry and transport types (requires `registry` feature).
#[cfg(feature = "registry")]
pub mod registry {
    pub use vdp_registry::*;
}
