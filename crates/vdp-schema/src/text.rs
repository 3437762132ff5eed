use std::fmt;

use serde_json::Value;
use vdp_frame::{PacketReader, PacketWriter};

use crate::error::Result;
use crate::part::Part;
use crate::types::SchemaType;

type TextFetcher = Box<dyn FnMut() -> String + Send>;

/// A NUL-terminated string field.
pub struct Text {
    name: String,
    value: String,
    fetcher: Option<TextFetcher>,
}

impl Text {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            fetcher: None,
        }
    }

    /// A string whose value is pulled from `fetcher` on every [`Part::fetch`].
    pub fn with_fetcher<F>(name: impl Into<String>, fetcher: F) -> Self
    where
        F: FnMut() -> String + Send + 'static,
    {
        Self {
            fetcher: Some(Box::new(fetcher)),
            ..Self::new(name)
        }
    }

    pub fn get(&self) -> &str {
        &self.value
    }

    pub fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Text")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("fetcher", &self.fetcher.is_some())
            .finish()
    }
}

impl Part for Text {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema_type(&self) -> SchemaType {
        SchemaType::String
    }

    fn write_schema(&self, writer: &mut PacketWriter) -> Result<()> {
        writer.put_u8(SchemaType::String.to_byte());
        writer.put_str(&self.name)?;
        Ok(())
    }

    fn write_message(&self, writer: &mut PacketWriter) -> Result<()> {
        writer.put_str(&self.value)?;
        Ok(())
    }

    fn read_message(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        self.value = reader.get_str()?.to_owned();
        Ok(())
    }

    fn fetch(&mut self) {
        if let Some(fetcher) = self.fetcher.as_mut() {
            self.value = fetcher();
        }
    }

    fn value(&self) -> Value {
        Value::String(self.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdp_frame::{PacketFunction, PacketHeader, PacketType};

    #[test]
    fn message_is_nul_terminated() {
        let mut text = Text::new("mode");
        text.set("auto");

        let mut writer = PacketWriter::new(PacketHeader::new(PacketType::Data, PacketFunction::Send));
        text.write_message(&mut writer).unwrap();
        let packet = writer.finish();
        assert_eq!(&packet[1..6], b"auto\0");

        let mut other = Text::new("mode");
        other
            .read_message(&mut PacketReader::body(&packet, 1))
            .unwrap();
        assert_eq!(other.get(), "auto");
    }

    #[test]
    fn fetcher_refreshes_value() {
        let mut n = 0;
        let mut text = Text::with_fetcher("tick", move || {
            n += 1;
            format!("t{n}")
        });
        text.fetch();
        text.fetch();
        assert_eq!(text.get(), "t2");
        assert_eq!(text.value(), Value::String("t2".into()));
    }
}
