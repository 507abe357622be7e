//! AMF3 writers: u29 integers, reference-table lookups and the trait writer.

use std::io;

use byteorder::{BigEndian, WriteBytesExt};

use super::Encoder;
use crate::error::{AmfError, Result};
use crate::value::{Object, Trait, Value};
use crate::Amf3Marker;

/// Largest value a u29 can carry.
pub(crate) const U29_MAX: u32 = (1 << 29) - 1;

impl Encoder {
    /// Encode a single AMF3 value.
    pub fn encode_amf3<W: io::Write>(&mut self, writer: &mut W, value: &Value) -> Result<usize> {
        match value {
            Value::Undefined => write_marker(writer, Amf3Marker::Undefined),
            Value::Null => write_marker(writer, Amf3Marker::Null),
            Value::Boolean(false) => write_marker(writer, Amf3Marker::False),
            Value::Boolean(true) => write_marker(writer, Amf3Marker::True),
            Value::Integer(i) => write_integer(writer, *i),
            Value::Number(n) => write_double(writer, *n),
            Value::String(s) => {
                let mut n = write_marker(writer, Amf3Marker::String)?;
                n += self.write_amf3_string(writer, s)?;
                Ok(n)
            }
            Value::Date(timestamp) => self.write_amf3_date(writer, *timestamp),
            Value::Array(elements) => self.write_amf3_array(writer, value, elements),
            Value::ByteArray(bytes) => self.write_amf3_byte_array(writer, value, bytes),
            Value::TypedObject { class_name, properties } => {
                self.write_amf3_object(writer, value, class_name, properties)
            }
            Value::Object(_) => Err(AmfError::UnsupportedType("anonymous object")),
            Value::EcmaArray(_) => Err(AmfError::UnsupportedType("ecma array")),
            Value::Unsupported => Err(AmfError::UnsupportedType("unsupported")),
        }
    }

    /// Write a string: a table reference when the session has seen it, the
    /// inline length and bytes otherwise.
    ///
    /// The empty string is always inline (u29 0x01) and never joins the
    /// table.
    pub(crate) fn write_amf3_string<W: io::Write>(&mut self, writer: &mut W, value: &str) -> Result<usize> {
        if let Some(index) = self.string_refs.iter().position(|s| s == value) {
            tracing::trace!(index, "string table hit");
            return write_u29(writer, (index as u32) << 1);
        }

        let n = write_u29(writer, length_header(value.len())?)?;
        writer.write_all(value.as_bytes())?;

        if !value.is_empty() {
            self.string_refs.push(value.to_owned());
        }

        Ok(n + value.len())
    }

    fn write_amf3_date<W: io::Write>(&mut self, writer: &mut W, timestamp: f64) -> Result<usize> {
        let mut n = write_marker(writer, Amf3Marker::Date)?;

        if let Some(index) = self.find_object_ref(&Value::Date(timestamp)) {
            return Ok(n + write_u29(writer, (index as u32) << 1)?);
        }

        self.object_refs.push(Value::Date(timestamp));

        n += write_u29(writer, 0x01)?;
        writer.write_f64::<BigEndian>(timestamp)?;

        Ok(n + 8)
    }

    fn write_amf3_array<W: io::Write>(&mut self, writer: &mut W, value: &Value, elements: &[Value]) -> Result<usize> {
        let mut n = write_marker(writer, Amf3Marker::Array)?;

        if let Some(index) = self.find_object_ref(value) {
            return Ok(n + write_u29(writer, (index as u32) << 1)?);
        }

        // The table slot is taken before the children are written, so a
        // nested occurrence of this array becomes a reference.
        self.object_refs.push(value.clone());

        n += write_u29(writer, length_header(elements.len())?)?;

        // No associative members: the key list is just the terminator.
        n += self.write_amf3_string(writer, "")?;

        for element in elements {
            n += self.encode_amf3(writer, element)?;
        }

        Ok(n)
    }

    fn write_amf3_byte_array<W: io::Write>(&mut self, writer: &mut W, value: &Value, bytes: &[u8]) -> Result<usize> {
        let mut n = write_marker(writer, Amf3Marker::ByteArray)?;

        if let Some(index) = self.find_object_ref(value) {
            return Ok(n + write_u29(writer, (index as u32) << 1)?);
        }

        self.object_refs.push(value.clone());

        n += write_u29(writer, length_header(bytes.len())?)?;
        writer.write_all(bytes)?;

        Ok(n + bytes.len())
    }

    fn write_amf3_object<W: io::Write>(
        &mut self,
        writer: &mut W,
        value: &Value,
        class_name: &str,
        properties: &Object,
    ) -> Result<usize> {
        let mut n = write_marker(writer, Amf3Marker::Object)?;

        if let Some(index) = self.find_object_ref(value) {
            return Ok(n + write_u29(writer, (index as u32) << 1)?);
        }

        // Traits are shared by class name: a second object of a class reuses
        // the property layout the first one registered, and properties the
        // trait names but the object lacks are written as null.
        let object_trait = match self.trait_refs.iter().position(|t| t.class_name == class_name) {
            Some(index) => {
                tracing::trace!(index, "trait table hit");
                n += write_u29(writer, ((index as u32) << 2) | 0x01)?;
                self.trait_refs[index].clone()
            }
            None => {
                let object_trait = Trait {
                    class_name: class_name.to_owned(),
                    externalizable: false,
                    dynamic: false,
                    properties: properties.keys().cloned().collect(),
                };

                n += write_u29(writer, trait_header(&object_trait)?)?;
                n += self.write_amf3_string(writer, &object_trait.class_name)?;
                for name in &object_trait.properties {
                    n += self.write_amf3_string(writer, name)?;
                }

                self.trait_refs.push(object_trait.clone());
                object_trait
            }
        };

        if object_trait.externalizable {
            return Err(AmfError::UnsupportedType("externalizable object"));
        }

        self.object_refs.push(value.clone());

        for name in &object_trait.properties {
            let property = properties.get(name).unwrap_or(&Value::Null);
            n += self.encode_amf3(writer, property)?;
        }

        Ok(n)
    }

    fn find_object_ref(&self, value: &Value) -> Option<usize> {
        let index = self.object_refs.iter().position(|v| v == value)?;
        tracing::trace!(index, "object table hit");
        Some(index)
    }
}

fn write_marker<W: io::Write>(writer: &mut W, marker: Amf3Marker) -> Result<usize> {
    writer.write_u8(marker as u8)?;
    Ok(1)
}

/// Write an integer, falling back to a double when it exceeds the u29 range.
fn write_integer<W: io::Write>(writer: &mut W, value: u32) -> Result<usize> {
    if value > U29_MAX {
        return write_double(writer, value as f64);
    }

    let mut n = write_marker(writer, Amf3Marker::Integer)?;
    n += write_u29(writer, value)?;
    Ok(n)
}

fn write_double<W: io::Write>(writer: &mut W, value: f64) -> Result<usize> {
    let n = write_marker(writer, Amf3Marker::Double)?;
    writer.write_f64::<BigEndian>(value)?;
    Ok(n + 8)
}

/// Write a variable-length 29-bit unsigned integer in its shortest form.
pub(crate) fn write_u29<W: io::Write>(writer: &mut W, value: u32) -> Result<usize> {
    if value <= 0x7f {
        writer.write_u8(value as u8)?;
        Ok(1)
    } else if value <= 0x3fff {
        writer.write_all(&[(value >> 7) as u8 | 0x80, (value & 0x7f) as u8])?;
        Ok(2)
    } else if value <= 0x1f_ffff {
        writer.write_all(&[
            (value >> 14) as u8 | 0x80,
            ((value >> 7) & 0x7f) as u8 | 0x80,
            (value & 0x7f) as u8,
        ])?;
        Ok(3)
    } else if value <= U29_MAX {
        writer.write_all(&[
            (value >> 22) as u8 | 0x80,
            ((value >> 15) & 0x7f) as u8 | 0x80,
            ((value >> 8) & 0x7f) as u8 | 0x80,
            value as u8,
        ])?;
        Ok(4)
    } else {
        Err(AmfError::U29OutOfRange(value))
    }
}

/// The u29 header of an inline length: `(len << 1) | 1`.
fn length_header(len: usize) -> Result<u32> {
    let len: u32 = len.try_into()?;
    if len > U29_MAX >> 1 {
        return Err(AmfError::U29OutOfRange(len));
    }
    Ok((len << 1) | 0x01)
}

/// The u29 header of an inline trait: property count, the dynamic and
/// externalizable flags, then the inline-trait and inline-object bits.
fn trait_header(object_trait: &Trait) -> Result<u32> {
    let count: u32 = object_trait.properties.len().try_into()?;
    if count > U29_MAX >> 4 {
        return Err(AmfError::U29OutOfRange(count));
    }

    let mut header = (count << 4) | 0x03;
    if object_trait.externalizable {
        header |= 0x04;
    }
    if object_trait.dynamic {
        header |= 0x08;
    }

    Ok(header)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn encode(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        let n = Encoder::new().encode(&mut buf, value, crate::VERSION_AMF3).unwrap();
        assert_eq!(n, buf.len());
        buf
    }

    #[test]
    fn u29() {
        let cases: &[(u32, &[u8])] = &[
            (0, &[0x00]),
            (0x7f, &[0x7f]),
            (0x80, &[0x81, 0x00]),
            (0x3fff, &[0xff, 0x7f]),
            (0x4000, &[0x81, 0x80, 0x00]),
            (0x1f_ffff, &[0xff, 0xff, 0x7f]),
            (0x20_0000, &[0x80, 0xc0, 0x80, 0x00]),
            (4_194_303, &[0x80, 0xff, 0xff, 0xff]),
            (U29_MAX, &[0xff, 0xff, 0xff, 0xff]),
        ];

        for (value, expected) in cases {
            let mut buf = Vec::new();
            let n = write_u29(&mut buf, *value).unwrap();
            assert_eq!(n, buf.len());
            assert_eq!(buf, *expected, "value {value:#x}");
        }

        let err = write_u29(&mut Vec::new(), U29_MAX + 1).unwrap_err();
        assert!(matches!(err, AmfError::U29OutOfRange(_)));
    }

    #[test]
    fn u29_round_trip() {
        for value in [0, 1, 0x7f, 0x80, 0x3fff, 0x4000, 0x1f_ffff, 0x20_0000, 0xbeef, U29_MAX] {
            let mut buf = Vec::new();
            write_u29(&mut buf, value).unwrap();
            assert_eq!(crate::decoder::amf3::read_u29(&mut buf.as_slice()).unwrap(), value);
        }
    }

    #[test]
    fn scalars() {
        assert_eq!(encode(&Value::Undefined), [0x00]);
        assert_eq!(encode(&Value::Null), [0x01]);
        assert_eq!(encode(&Value::Boolean(false)), [0x02]);
        assert_eq!(encode(&Value::Boolean(true)), [0x03]);
    }

    #[test]
    fn integer() {
        assert_eq!(encode(&Value::Integer(0x7f)), [0x04, 0x7f]);
        assert_eq!(encode(&Value::Integer(0x80)), [0x04, 0x81, 0x00]);
        assert_eq!(encode(&Value::Integer(4_194_303)), [0x04, 0x80, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn integer_above_u29_becomes_a_double() {
        let bytes = encode(&Value::Integer(1 << 29));
        assert_eq!(bytes[0], 0x05);
        assert_eq!(bytes.len(), 9);
        assert_eq!(f64::from_be_bytes(bytes[1..].try_into().unwrap()), (1u32 << 29) as f64);
    }

    #[test]
    fn string_table() {
        // ["foo", "foo"]: inline once, then reference 0.
        #[rustfmt::skip]
        let expected = [
            0x09,
            0x05, // two elements
            0x01, // empty key
            0x06, 0x07, b'f', b'o', b'o',
            0x06, 0x00,
        ];

        let value = Value::Array(vec![Value::String("foo".into()), Value::String("foo".into())]);
        assert_eq!(encode(&value), expected);
    }

    #[test]
    fn empty_string() {
        assert_eq!(encode(&Value::String(String::new())), [0x06, 0x01]);

        let mut encoder = Encoder::new();
        let mut buf = Vec::new();
        encoder.encode(&mut buf, &Value::String(String::new()), crate::VERSION_AMF3).unwrap();
        assert!(encoder.string_refs.is_empty());
    }

    #[test]
    fn date() {
        #[rustfmt::skip]
        let expected = [
            0x08,
            0x01,
            0x3f, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        assert_eq!(encode(&Value::Date(1.0)), expected);
    }

    #[test]
    fn byte_array() {
        #[rustfmt::skip]
        let expected = [
            0x0c,
            0x07,
            0x01, 0x02, 0x03,
        ];

        let value = Value::ByteArray(Bytes::from_static(&[0x01, 0x02, 0x03]));
        assert_eq!(encode(&value), expected);
    }

    #[test]
    fn object_with_new_trait() {
        let properties: Object = [("a".to_owned(), Value::Boolean(true))].into_iter().collect();

        #[rustfmt::skip]
        let expected = [
            0x0a,
            0x13, // inline object, inline trait, sealed, one property
            0x07, b'D', b'o', b'g',
            0x03, b'a',
            0x03, // true
        ];

        let value = Value::TypedObject {
            class_name: "Dog".into(),
            properties,
        };
        assert_eq!(encode(&value), expected);
    }

    #[test]
    fn trait_reuse_by_class_name() {
        let first: Object = [("a".to_owned(), Value::Boolean(true))].into_iter().collect();
        let second: Object = [("a".to_owned(), Value::Boolean(false))].into_iter().collect();

        let value = Value::Array(vec![
            Value::TypedObject {
                class_name: "Dog".into(),
                properties: first,
            },
            Value::TypedObject {
                class_name: "Dog".into(),
                properties: second,
            },
        ]);

        #[rustfmt::skip]
        let expected = [
            0x09,
            0x05, 0x01,
            0x0a, 0x13, 0x07, b'D', b'o', b'g', 0x03, b'a', 0x03,
            0x0a, 0x01, 0x02, // trait reference 0, sealed value false
        ];

        assert_eq!(encode(&value), expected);
    }

    #[test]
    fn repeated_object_becomes_a_reference() {
        let properties: Object = [("a".to_owned(), Value::Boolean(true))].into_iter().collect();
        let object = Value::TypedObject {
            class_name: "Dog".into(),
            properties,
        };

        let value = Value::Array(vec![object.clone(), object]);

        #[rustfmt::skip]
        let expected = [
            0x09,
            0x05, 0x01,
            0x0a, 0x13, 0x07, b'D', b'o', b'g', 0x03, b'a', 0x03,
            0x0a, 0x02, // object reference 1 (the array is entry 0)
        ];

        assert_eq!(encode(&value), expected);
    }

    #[test]
    fn trait_reuse_fills_missing_properties_with_null() {
        let first: Object = [("a".to_owned(), Value::Boolean(true))].into_iter().collect();

        let value = Value::Array(vec![
            Value::TypedObject {
                class_name: "Dog".into(),
                properties: first,
            },
            Value::TypedObject {
                class_name: "Dog".into(),
                properties: Object::new(),
            },
        ]);

        #[rustfmt::skip]
        let expected = [
            0x09,
            0x05, 0x01,
            0x0a, 0x13, 0x07, b'D', b'o', b'g', 0x03, b'a', 0x03,
            0x0a, 0x01, 0x01, // trait reference 0, missing "a" written as null
        ];

        assert_eq!(encode(&value), expected);
    }

    #[test]
    fn maps_have_no_amf3_form() {
        let mut buf = Vec::new();
        let err = Encoder::new()
            .encode(&mut buf, &Value::Object(Object::new()), crate::VERSION_AMF3)
            .unwrap_err();
        assert!(matches!(err, AmfError::UnsupportedType("anonymous object")));

        let err = Encoder::new()
            .encode(&mut buf, &Value::EcmaArray(Object::new()), crate::VERSION_AMF3)
            .unwrap_err();
        assert!(matches!(err, AmfError::UnsupportedType("ecma array")));
    }
}
