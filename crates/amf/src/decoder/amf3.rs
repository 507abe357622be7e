//! AMF3 readers: u29 integers, reference tables and the trait protocol.

use std::io;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use num_traits::FromPrimitive;

use super::Decoder;
use crate::error::{AmfError, Result};
use crate::value::{Object, Trait, Value};
use crate::Amf3Marker;

impl Decoder {
    /// Decode a single AMF3 value.
    pub fn decode_amf3<R: io::Read>(&mut self, reader: &mut R) -> Result<Value> {
        let marker = reader.read_u8()?;
        self.decode_amf3_value(marker, reader)
    }

    pub(crate) fn decode_amf3_value<R: io::Read>(&mut self, marker: u8, reader: &mut R) -> Result<Value> {
        let marker = Amf3Marker::from_u8(marker).ok_or(AmfError::UnknownMarker(marker))?;

        match marker {
            Amf3Marker::Undefined => Ok(Value::Undefined),
            Amf3Marker::Null => Ok(Value::Null),
            Amf3Marker::False => Ok(Value::Boolean(false)),
            Amf3Marker::True => Ok(Value::Boolean(true)),
            Amf3Marker::Integer => Ok(Value::Integer(read_u29(reader)?)),
            Amf3Marker::Double => Ok(Value::Number(reader.read_f64::<BigEndian>()?)),
            Amf3Marker::String => Ok(Value::String(self.read_amf3_string(reader)?)),
            Amf3Marker::Date => self.read_amf3_date(reader),
            Amf3Marker::Array => self.read_amf3_array(reader),
            Amf3Marker::Object => self.read_amf3_object(reader),
            Amf3Marker::ByteArray => self.read_amf3_byte_array(reader),
            Amf3Marker::XmlDocument => Err(AmfError::UnsupportedType("xml document")),
            Amf3Marker::Xml => Err(AmfError::UnsupportedType("xml")),
        }
    }

    /// Read a string: either a table reference or an inline length and bytes.
    ///
    /// Non-empty inline strings join the string table; the empty string is
    /// always inline and never enters the table.
    pub(crate) fn read_amf3_string<R: io::Read>(&mut self, reader: &mut R) -> Result<String> {
        let (is_ref, value) = read_reference_int(reader)?;

        if is_ref {
            let index = value as usize;
            return self
                .string_refs
                .get(index)
                .cloned()
                .ok_or(AmfError::BadReference { kind: "string", index });
        }

        let string = read_utf8(reader, value as usize)?;
        if !string.is_empty() {
            self.string_refs.push(string.clone());
        }

        Ok(string)
    }

    fn read_amf3_date<R: io::Read>(&mut self, reader: &mut R) -> Result<Value> {
        let (is_ref, value) = read_reference_int(reader)?;

        if is_ref {
            return self.object_ref(value as usize, "date", |v| matches!(v, Value::Date(_)));
        }

        let timestamp = reader.read_f64::<BigEndian>()?;
        let date = Value::Date(timestamp);
        self.object_refs.push(date.clone());

        Ok(date)
    }

    fn read_amf3_array<R: io::Read>(&mut self, reader: &mut R) -> Result<Value> {
        let (is_ref, value) = read_reference_int(reader)?;

        if is_ref {
            return self.object_ref(value as usize, "array", |v| matches!(v, Value::Array(_)));
        }

        // Reserve the table slot before the body so references inside the
        // body resolve to this array's position.
        let index = self.object_refs.len();
        self.object_refs.push(Value::Array(Vec::new()));

        let key = self.read_amf3_string(reader)?;
        if !key.is_empty() {
            return Err(AmfError::UnsupportedAssociativeArray);
        }

        let mut array = Vec::with_capacity((value as usize).min(1024));
        for _ in 0..value {
            array.push(self.decode_amf3(reader)?);
        }

        let array = Value::Array(array);
        self.object_refs[index] = array.clone();

        Ok(array)
    }

    fn read_amf3_byte_array<R: io::Read>(&mut self, reader: &mut R) -> Result<Value> {
        let (is_ref, value) = read_reference_int(reader)?;

        if is_ref {
            return self.object_ref(value as usize, "byte array", |v| matches!(v, Value::ByteArray(_)));
        }

        let mut buf = vec![0u8; value as usize];
        reader.read_exact(&mut buf)?;

        let bytes = Value::ByteArray(Bytes::from(buf));
        self.object_refs.push(bytes.clone());

        Ok(bytes)
    }

    fn read_amf3_object<R: io::Read>(&mut self, reader: &mut R) -> Result<Value> {
        let (is_ref, value) = read_reference_int(reader)?;

        if is_ref {
            return self.object_ref(value as usize, "typed object", |v| {
                matches!(v, Value::TypedObject { .. })
            });
        }

        let object_trait = self.read_trait(reader, value)?;

        let index = self.object_refs.len();
        self.object_refs.push(Value::TypedObject {
            class_name: object_trait.class_name.clone(),
            properties: Object::new(),
        });

        let object = if object_trait.externalizable {
            self.read_externalizable(reader, &object_trait.class_name)?
        } else {
            let mut properties = Object::new();

            // Sealed property values appear in trait order.
            for name in &object_trait.properties {
                let value = self.decode_amf3(reader)?;
                properties.insert(name.clone(), value);
            }

            // A dynamic object carries extra (key, value) pairs, terminated
            // by an empty key.
            if object_trait.dynamic {
                loop {
                    let key = self.read_amf3_string(reader)?;
                    if key.is_empty() {
                        break;
                    }
                    let value = self.decode_amf3(reader)?;
                    properties.insert(key, value);
                }
            }

            Value::TypedObject {
                class_name: object_trait.class_name,
                properties,
            }
        };

        self.object_refs[index] = object.clone();

        Ok(object)
    }

    /// Resolve the trait for an object header whose reference bit was clear.
    ///
    /// The header packs, from the low bit up: trait-by-reference, then for
    /// inline traits the externalizable flag, the dynamic flag and the sealed
    /// property count.
    fn read_trait<R: io::Read>(&mut self, reader: &mut R, header: u32) -> Result<Trait> {
        if header & 0x01 == 0 {
            let index = (header >> 1) as usize;
            return self
                .trait_refs
                .get(index)
                .cloned()
                .ok_or(AmfError::BadTraitReference(index));
        }

        let externalizable = header & 0x02 != 0;
        let dynamic = header & 0x04 != 0;
        let class_name = self.read_amf3_string(reader)?;

        let mut properties = Vec::new();
        for _ in 0..(header >> 3) {
            properties.push(self.read_amf3_string(reader)?);
        }

        let object_trait = Trait {
            class_name,
            externalizable,
            dynamic,
            properties,
        };
        self.trait_refs.push(object_trait.clone());

        Ok(object_trait)
    }

    /// Resolve an object-table reference, requiring the expected variant.
    fn object_ref(&self, index: usize, expected: &'static str, check: fn(&Value) -> bool) -> Result<Value> {
        let value = self
            .object_refs
            .get(index)
            .ok_or(AmfError::BadReference { kind: "object", index })?;

        if !check(value) {
            return Err(AmfError::BadTypeConversion { expected, index });
        }

        tracing::trace!(index, "resolved object reference");
        Ok(value.clone())
    }
}

/// Read a variable-length 29-bit unsigned integer.
///
/// Up to three bytes contribute their low seven bits while the high bit says
/// to continue; a fourth byte contributes all eight bits.
pub(crate) fn read_u29<R: io::Read>(reader: &mut R) -> Result<u32> {
    let mut value = 0u32;

    for _ in 0..3 {
        let b = reader.read_u8()?;
        value = (value << 7) | u32::from(b & 0x7f);
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }

    let b = reader.read_u8()?;
    Ok((value << 8) | u32::from(b))
}

/// Read a u29 split into its reference bit and payload.
///
/// A clear low bit means "reference, index = value >> 1"; a set low bit means
/// "inline, length-or-flags = value >> 1".
pub(crate) fn read_reference_int<R: io::Read>(reader: &mut R) -> Result<(bool, u32)> {
    let u29 = read_u29(reader)?;
    Ok((u29 & 0x01 == 0, u29 >> 1))
}

fn read_utf8<R: io::Read>(reader: &mut R, len: usize) -> Result<String> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}
