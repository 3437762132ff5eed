use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use vdp_frame::{PacketReader, PacketWriter};

use crate::error::Result;
use crate::types::SchemaType;

/// One node of a channel schema.
///
/// Leaves hold a single value; a [`Record`](crate::Record) holds an ordered
/// list of child parts. Implementations must write exactly what they read:
/// `read_message` consumes the bytes `write_message` produced.
pub trait Part: Send {
    /// Field name as announced in the schema.
    fn name(&self) -> &str;

    fn schema_type(&self) -> SchemaType;

    /// Append the type tag, name and (for records) children.
    fn write_schema(&self, writer: &mut PacketWriter) -> Result<()>;

    /// Append the current value.
    fn write_message(&self, writer: &mut PacketWriter) -> Result<()>;

    /// Replace the current value with one read from a data packet.
    fn read_message(&mut self, reader: &mut PacketReader<'_>) -> Result<()>;

    /// Refresh the value from its source, if the part has one.
    fn fetch(&mut self) {}

    /// Current value as JSON. Records render as objects keyed by field name.
    fn value(&self) -> Value;

    /// Append an indented, human-readable schema line (or block) to `out`.
    fn describe(&self, out: &mut String, indent: usize) {
        push_indent(out, indent);
        out.push_str(self.name());
        out.push_str(": ");
        out.push_str(self.schema_type().as_str());
    }
}

/// Shared handle to a part, held by both the application and the registry.
pub type PartPtr = Arc<Mutex<dyn Part>>;

/// Wrap a part in a [`PartPtr`].
pub fn part_ptr<P: Part + 'static>(part: P) -> PartPtr {
    Arc::new(Mutex::new(part))
}

/// Lock a shared part. A poisoned lock is recovered since parts hold plain
/// values that are never left half-written.
pub fn lock_part(part: &PartPtr) -> MutexGuard<'_, dyn Part + 'static> {
    part.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Render a part's schema as indented text.
pub fn pretty_print(part: &dyn Part) -> String {
    let mut out = String::new();
    part.describe(&mut out, 0);
    out
}

pub(crate) fn push_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("  ");
    }
}
