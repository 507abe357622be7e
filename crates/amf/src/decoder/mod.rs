//! AMF decoding session, version dispatch and the AMF0 readers.

use std::io;

use byteorder::{BigEndian, ReadBytesExt};
use num_traits::FromPrimitive;

use crate::error::{AmfError, Result};
use crate::value::{Object, Trait, Value};
use crate::{Amf0Marker, VERSION_AMF0, VERSION_AMF3};

pub(crate) mod amf3;
mod external;

/// AMF decoding session.
///
/// One session decodes one top-level value (which may recurse into nested
/// values). The three AMF3 reference tables are append-only and live for the
/// lifetime of the session; they are never reset implicitly, so a session may
/// deliberately be reused across messages when the peer expects its tables to
/// persist. AMF0 never touches the tables, but its avmplus marker switches to
/// AMF3 mid-stream and the tables carry forward.
#[derive(Debug, Default)]
pub struct Decoder {
    pub(crate) string_refs: Vec<String>,
    pub(crate) object_refs: Vec<Value>,
    pub(crate) trait_refs: Vec<Trait>,
}

impl Decoder {
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

    /// Decode exactly one top-level value from the reader.
    pub fn decode<R: io::Read>(&mut self, reader: &mut R, version: u8) -> Result<Value> {
        match version {
            VERSION_AMF0 => self.decode_amf0(reader),
            VERSION_AMF3 => self.decode_amf3(reader),
            v => Err(AmfError::UnsupportedVersion(v)),
        }
    }

    /// Decode values until the reader is exhausted.
    ///
    /// A clean end of input before a marker byte terminates the stream; an
    /// end of input anywhere else is an error like any other short read.
    pub fn decode_all<R: io::Read>(&mut self, reader: &mut R, version: u8) -> Result<Vec<Value>> {
        if version != VERSION_AMF0 && version != VERSION_AMF3 {
            return Err(AmfError::UnsupportedVersion(version));
        }

        let mut values = Vec::new();

        while let Some(marker) = read_marker_opt(reader)? {
            let value = if version == VERSION_AMF0 {
                self.decode_amf0_value(marker, reader)?
            } else {
                self.decode_amf3_value(marker, reader)?
            };
            values.push(value);
        }

        Ok(values)
    }

    /// Decode a single AMF0 value.
    pub fn decode_amf0<R: io::Read>(&mut self, reader: &mut R) -> Result<Value> {
        let marker = reader.read_u8()?;
        self.decode_amf0_value(marker, reader)
    }

    fn decode_amf0_value<R: io::Read>(&mut self, marker: u8, reader: &mut R) -> Result<Value> {
        let marker = Amf0Marker::from_u8(marker).ok_or(AmfError::UnknownMarker(marker))?;

        match marker {
            Amf0Marker::Number => Ok(Value::Number(reader.read_f64::<BigEndian>()?)),
            Amf0Marker::Boolean => read_boolean(reader),
            Amf0Marker::String => Ok(Value::String(read_utf8(reader)?)),
            Amf0Marker::Object => Ok(Value::Object(self.read_object_body(reader)?)),
            Amf0Marker::Null => Ok(Value::Null),
            Amf0Marker::Undefined => Ok(Value::Undefined),
            Amf0Marker::EcmaArray => self.read_ecma_array(reader),
            Amf0Marker::StrictArray => self.read_strict_array(reader),
            Amf0Marker::Date => read_date(reader),
            Amf0Marker::LongString => Ok(Value::String(read_utf8_long(reader)?)),
            Amf0Marker::Unsupported => Ok(Value::Unsupported),
            Amf0Marker::TypedObject => self.read_typed_object(reader),
            Amf0Marker::AvmPlusObject => self.decode_amf3(reader),
            Amf0Marker::ObjectEnd => Err(AmfError::UnsupportedType("object end outside an object")),
            Amf0Marker::MovieClip => Err(AmfError::UnsupportedType("movieclip")),
            Amf0Marker::Reference => Err(AmfError::UnsupportedType("reference")),
            Amf0Marker::Recordset => Err(AmfError::UnsupportedType("recordset")),
            Amf0Marker::XmlDocument => Err(AmfError::UnsupportedType("xml document")),
        }
    }

    /// Read (key, value) pairs until the empty key, which must be followed by
    /// the object-end marker.
    fn read_object_body<R: io::Read>(&mut self, reader: &mut R) -> Result<Object> {
        let mut object = Object::new();

        loop {
            let key = read_utf8(reader)?;

            if key.is_empty() {
                let marker = reader.read_u8()?;
                if marker != Amf0Marker::ObjectEnd as u8 {
                    return Err(AmfError::UnexpectedMarker {
                        expected: Amf0Marker::ObjectEnd as u8,
                        got: marker,
                    });
                }
                break;
            }

            let value = self.decode_amf0(reader)?;
            object.insert(key, value);
        }

        Ok(object)
    }

    fn read_ecma_array<R: io::Read>(&mut self, reader: &mut R) -> Result<Value> {
        let declared = reader.read_u32::<BigEndian>()? as usize;

        // The declared count is advisory; the body terminates itself.
        let object = self.read_object_body(reader)?;
        if object.len() != declared {
            return Err(AmfError::LengthMismatch {
                expected: declared,
                got: object.len(),
            });
        }

        Ok(Value::EcmaArray(object))
    }

    fn read_strict_array<R: io::Read>(&mut self, reader: &mut R) -> Result<Value> {
        let len = reader.read_u32::<BigEndian>()? as usize;

        let mut array = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            array.push(self.decode_amf0(reader)?);
        }

        Ok(Value::Array(array))
    }

    fn read_typed_object<R: io::Read>(&mut self, reader: &mut R) -> Result<Value> {
        let class_name = read_utf8(reader)?;
        let properties = self.read_object_body(reader)?;

        Ok(Value::TypedObject { class_name, properties })
    }
}

fn read_boolean<R: io::Read>(reader: &mut R) -> Result<Value> {
    match reader.read_u8()? {
        0x00 => Ok(Value::Boolean(false)),
        0x01 => Ok(Value::Boolean(true)),
        b => Err(AmfError::UnexpectedValue(b)),
    }
}

fn read_date<R: io::Read>(reader: &mut R) -> Result<Value> {
    let timestamp = reader.read_f64::<BigEndian>()?;

    // Timezone offset in minutes; reserved, should be zero. Discarded.
    reader.read_i16::<BigEndian>()?;

    Ok(Value::Date(timestamp))
}

/// Read a UTF-8 string with a 16-bit length prefix.
fn read_utf8<R: io::Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_u16::<BigEndian>()? as usize;
    read_utf8_bytes(reader, len)
}

/// Read a UTF-8 string with a 32-bit length prefix.
fn read_utf8_long<R: io::Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_u32::<BigEndian>()? as usize;
    read_utf8_bytes(reader, len)
}

fn read_utf8_bytes<R: io::Read>(reader: &mut R, len: usize) -> Result<String> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

fn read_marker_opt<R: io::Read>(reader: &mut R) -> Result<Option<u8>> {
    let mut buf = [0u8; 1];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(buf[0])),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}
