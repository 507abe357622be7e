//! AMF encoding session, version dispatch and the AMF0 writers.

use std::io;

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::{AmfError, Result};
use crate::value::{Object, Trait, Value};
use crate::{Amf0Marker, VERSION_AMF0, VERSION_AMF3};

mod amf3;

/// AMF encoding session.
///
/// The mirror of [`Decoder`](crate::Decoder): one session emits one top-level
/// value, and its three AMF3 reference tables are append-only for the
/// session's lifetime. The AMF0 path has no inter-value sharing and never
/// emits the avmplus marker.
#[derive(Debug, Default)]
pub struct Encoder {
    pub(crate) string_refs: Vec<String>,
    pub(crate) object_refs: Vec<Value>,
    pub(crate) trait_refs: Vec<Trait>,
}

impl Encoder {
    /// Create a new session with empty reference tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the reference tables, as if the session were fresh.
    pub fn reset(&mut self) {
        self.string_refs.clear();
        self.object_refs.clear();
        self.trait_refs.clear();
    }

    /// Encode exactly one top-level value to the writer.
    ///
    /// Returns the number of bytes written.
    pub fn encode<W: io::Write>(&mut self, writer: &mut W, value: &Value, version: u8) -> Result<usize> {
        match version {
            VERSION_AMF0 => self.encode_amf0(writer, value),
            VERSION_AMF3 => self.encode_amf3(writer, value),
            v => Err(AmfError::UnsupportedVersion(v)),
        }
    }

    /// Encode a slice of consecutive top-level values.
    pub fn encode_all<W: io::Write>(&mut self, writer: &mut W, values: &[Value], version: u8) -> Result<usize> {
        let mut n = 0;
        for value in values {
            n += self.encode(writer, value, version)?;
        }
        Ok(n)
    }

    /// Encode a single AMF0 value.
    pub fn encode_amf0<W: io::Write>(&mut self, writer: &mut W, value: &Value) -> Result<usize> {
        match value {
            Value::Undefined => write_marker(writer, Amf0Marker::Undefined),
            Value::Null => write_marker(writer, Amf0Marker::Null),
            Value::Unsupported => write_marker(writer, Amf0Marker::Unsupported),
            Value::Boolean(b) => write_boolean(writer, *b),
            Value::Number(n) => write_number(writer, *n),
            Value::Integer(i) => write_number(writer, *i as f64),
            Value::String(s) => write_string(writer, s),
            Value::Date(timestamp) => write_date(writer, *timestamp),
            Value::Array(values) => self.write_strict_array(writer, values),
            Value::EcmaArray(object) => self.write_ecma_array(writer, object),
            Value::Object(object) => self.write_object(writer, object),
            Value::TypedObject { class_name, properties } => self.write_typed_object(writer, class_name, properties),
            Value::ByteArray(_) => Err(AmfError::UnsupportedType("byte array")),
        }
    }

    fn write_strict_array<W: io::Write>(&mut self, writer: &mut W, values: &[Value]) -> Result<usize> {
        let mut n = write_marker(writer, Amf0Marker::StrictArray)?;

        writer.write_u32::<BigEndian>(values.len().try_into()?)?;
        n += 4;

        for value in values {
            n += self.encode_amf0(writer, value)?;
        }

        Ok(n)
    }

    fn write_ecma_array<W: io::Write>(&mut self, writer: &mut W, object: &Object) -> Result<usize> {
        let mut n = write_marker(writer, Amf0Marker::EcmaArray)?;

        writer.write_u32::<BigEndian>(object.len().try_into()?)?;
        n += 4;

        n += self.write_object_body(writer, object)?;
        Ok(n)
    }

    fn write_object<W: io::Write>(&mut self, writer: &mut W, object: &Object) -> Result<usize> {
        let mut n = write_marker(writer, Amf0Marker::Object)?;
        n += self.write_object_body(writer, object)?;
        Ok(n)
    }

    fn write_typed_object<W: io::Write>(&mut self, writer: &mut W, class_name: &str, object: &Object) -> Result<usize> {
        let mut n = write_marker(writer, Amf0Marker::TypedObject)?;
        n += write_key(writer, class_name)?;
        n += self.write_object_body(writer, object)?;
        Ok(n)
    }

    /// Write (key, value) pairs followed by the empty key and the object-end
    /// marker.
    fn write_object_body<W: io::Write>(&mut self, writer: &mut W, object: &Object) -> Result<usize> {
        let mut n = 0;

        for (key, value) in object {
            n += write_key(writer, key)?;
            n += self.encode_amf0(writer, value)?;
        }

        writer.write_u16::<BigEndian>(0)?;
        n += 2;
        n += write_marker(writer, Amf0Marker::ObjectEnd)?;

        Ok(n)
    }
}

fn write_marker<W: io::Write>(writer: &mut W, marker: Amf0Marker) -> Result<usize> {
    writer.write_u8(marker as u8)?;
    Ok(1)
}

fn write_boolean<W: io::Write>(writer: &mut W, value: bool) -> Result<usize> {
    let n = write_marker(writer, Amf0Marker::Boolean)?;
    writer.write_u8(value as u8)?;
    Ok(n + 1)
}

fn write_number<W: io::Write>(writer: &mut W, value: f64) -> Result<usize> {
    let n = write_marker(writer, Amf0Marker::Number)?;
    writer.write_f64::<BigEndian>(value)?;
    Ok(n + 8)
}

/// Write a string value, switching to the long-string form when the length
/// does not fit a 16-bit prefix.
fn write_string<W: io::Write>(writer: &mut W, value: &str) -> Result<usize> {
    let len = value.len();

    let mut n = if len <= u16::MAX as usize {
        let n = write_marker(writer, Amf0Marker::String)?;
        writer.write_u16::<BigEndian>(len as u16)?;
        n + 2
    } else {
        let n = write_marker(writer, Amf0Marker::LongString)?;
        writer.write_u32::<BigEndian>(len.try_into()?)?;
        n + 4
    };

    writer.write_all(value.as_bytes())?;
    n += len;

    Ok(n)
}

fn write_date<W: io::Write>(writer: &mut W, timestamp: f64) -> Result<usize> {
    let n = write_marker(writer, Amf0Marker::Date)?;
    writer.write_f64::<BigEndian>(timestamp)?;

    // Timezone offset; reserved, always zero.
    writer.write_i16::<BigEndian>(0)?;

    Ok(n + 10)
}

/// Write an object key or class name: a 16-bit length prefix, no marker.
fn write_key<W: io::Write>(writer: &mut W, key: &str) -> Result<usize> {
    writer.write_u16::<BigEndian>(key.len().try_into()?)?;
    writer.write_all(key.as_bytes())?;
    Ok(2 + key.len())
}
