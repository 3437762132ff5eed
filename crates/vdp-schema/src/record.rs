use serde_json::{Map, Value};
use vdp_frame::{PacketReader, PacketWriter};

use crate::error::Result;
use crate::part::{lock_part, part_ptr, push_indent, Part, PartPtr};
use crate::types::SchemaType;

/// An ordered group of named fields.
///
/// Fields are shared handles, so the application can keep a [`PartPtr`] to a
/// field and update it while the record is registered on a channel.
#[derive(Default)]
pub struct Record {
    name: String,
    fields: Vec<PartPtr>,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_fields(name: impl Into<String>, fields: Vec<PartPtr>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Append an owned field.
    pub fn field<P: Part + 'static>(self, part: P) -> Self {
        self.field_ptr(part_ptr(part))
    }

    /// Append a field the caller keeps a handle to.
    pub fn field_ptr(mut self, part: PartPtr) -> Self {
        self.fields.push(part);
        self
    }

    pub fn fields(&self) -> &[PartPtr] {
        &self.fields
    }

    pub fn set_fields(&mut self, fields: Vec<PartPtr>) {
        self.fields = fields;
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .finish()
    }
}

impl Part for Record {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema_type(&self) -> SchemaType {
        SchemaType::Record
    }

    fn write_schema(&self, writer: &mut PacketWriter) -> Result<()> {
        writer.put_u8(SchemaType::Record.to_byte());
        writer.put_str(&self.name)?;
        writer.put_u32(self.fields.len() as u32);
        for field in &self.fields {
            lock_part(field).write_schema(writer)?;
        }
        Ok(())
    }

    fn write_message(&self, writer: &mut PacketWriter) -> Result<()> {
        for field in &self.fields {
            lock_part(field).write_message(writer)?;
        }
        Ok(())
    }

    fn read_message(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        for field in &self.fields {
            lock_part(field).read_message(reader)?;
        }
        Ok(())
    }

    fn fetch(&mut self) {
        for field in &self.fields {
            lock_part(field).fetch();
        }
    }

    fn value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len());
        for field in &self.fields {
            let field = lock_part(field);
            map.insert(field.name().to_owned(), field.value());
        }
        Value::Object(map)
    }

    fn describe(&self, out: &mut String, indent: usize) {
        push_indent(out, indent);
        out.push_str(&format!("{}: record[{}]{{\n", self.name, self.fields.len()));
        for field in &self.fields {
            lock_part(field).describe(out, indent + 1);
            out.push('\n');
        }
        push_indent(out, indent);
        out.push('}');
    }
}
