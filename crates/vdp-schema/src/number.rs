use std::fmt;

use serde_json::Value;
use vdp_frame::{PacketReader, PacketWriter};

use crate::error::Result;
use crate::part::Part;
use crate::types::SchemaType;

/// A fixed-width number that can travel in a message, little-endian.
pub trait NumberKind: Copy + Default + PartialEq + fmt::Debug + Send + 'static {
    const TYPE: SchemaType;

    fn put(self, writer: &mut PacketWriter);

    fn get(reader: &mut PacketReader<'_>) -> Result<Self>;

    fn to_json(self) -> Value;
}

macro_rules! number_kind {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl NumberKind for $ty {
                const TYPE: SchemaType = SchemaType::$tag;

                fn put(self, writer: &mut PacketWriter) {
                    writer.put_slice(&self.to_le_bytes());
                }

                fn get(reader: &mut PacketReader<'_>) -> Result<Self> {
                    const SIZE: usize = std::mem::size_of::<$ty>();
                    let mut bytes = [0u8; SIZE];
                    bytes.copy_from_slice(reader.take(SIZE)?);
                    Ok(<$ty>::from_le_bytes(bytes))
                }

                fn to_json(self) -> Value {
                    Value::from(self)
                }
            }
        )*
    };
}

number_kind! {
    f64 => Double,
    f32 => Float,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
}

type NumberFetcher<T> = Box<dyn FnMut() -> T + Send>;

/// A numeric leaf field.
pub struct Number<T: NumberKind> {
    name: String,
    value: T,
    fetcher: Option<NumberFetcher<T>>,
}

pub type Float64 = Number<f64>;
pub type Float32 = Number<f32>;
pub type Uint8 = Number<u8>;
pub type Uint16 = Number<u16>;
pub type Uint32 = Number<u32>;
pub type Uint64 = Number<u64>;
pub type Int8 = Number<i8>;
pub type Int16 = Number<i16>;
pub type Int32 = Number<i32>;
pub type Int64 = Number<i64>;

impl<T: NumberKind> Number<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: T::default(),
            fetcher: None,
        }
    }

    /// A number whose value is pulled from `fetcher` on every [`Part::fetch`].
    pub fn with_fetcher<F>(name: impl Into<String>, fetcher: F) -> Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        Self {
            fetcher: Some(Box::new(fetcher)),
            ..Self::new(name)
        }
    }

    pub fn get(&self) -> T {
        self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
    }
}

impl<T: NumberKind> fmt::Debug for Number<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Number")
            .field("name", &self.name)
            .field("type", &T::TYPE)
            .field("value", &self.value)
            .finish()
    }
}

impl<T: NumberKind> Part for Number<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema_type(&self) -> SchemaType {
        T::TYPE
    }

    fn write_schema(&self, writer: &mut PacketWriter) -> Result<()> {
        writer.put_u8(T::TYPE.to_byte());
        writer.put_str(&self.name)?;
        Ok(())
    }

    fn write_message(&self, writer: &mut PacketWriter) -> Result<()> {
        self.value.put(writer);
        Ok(())
    }

    fn read_message(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        self.value = T::get(reader)?;
        Ok(())
    }

    fn fetch(&mut self) {
        if let Some(fetcher) = self.fetcher.as_mut() {
            self.value = fetcher();
        }
    }

    fn value(&self) -> Value {
        self.value.to_json()
    }
}
