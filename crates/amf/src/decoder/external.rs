//! Externalizable object readers.
//!
//! Flex messaging classes serialize through `IExternalizable`, so their body
//! is opaque to the generic object reader. The classes known here share a
//! bit-flag protocol: one or more flag bytes, where the low seven bits map to
//! fields (LSB first, seven fields per flag byte) and the high bit announces
//! another flag byte. Every set bit consumes one value; bits past the known
//! field list are consumed and discarded so newer peers still parse.

use std::io;

use byteorder::ReadBytesExt;

use super::Decoder;
use crate::error::{AmfError, Result};
use crate::value::{Object, Value};

/// AsyncMessage field names, first flag round.
const DSA_FIELDS_ONE: &[&str] = &[
    "body",
    "clientId",
    "destination",
    "headers",
    "messageId",
    "timeStamp",
    "timeToLive",
    "clientIdBytes",
    "messageIdBytes",
];

/// AsyncMessage field names, second flag round.
const DSA_FIELDS_TWO: &[&str] = &["correlationId", "correlationIdBytes"];

impl Decoder {
    pub(crate) fn read_externalizable<R: io::Read>(&mut self, reader: &mut R, class_name: &str) -> Result<Value> {
        match class_name {
            "flex.messaging.io.ArrayCollection" => self.read_array_collection(reader),
            "DSA" => self.read_dsa(reader),
            "DSK" => self.read_dsk(reader),
            name => {
                tracing::debug!(class_name = name, "no externalizable reader for class");
                Err(AmfError::UnsupportedExternalizable(name.to_owned()))
            }
        }
    }

    /// An ArrayCollection body is a single value, usually the backing array.
    fn read_array_collection<R: io::Read>(&mut self, reader: &mut R) -> Result<Value> {
        let array = self.decode_amf3(reader)?;

        let mut properties = Object::new();
        properties.insert("array".to_owned(), array);

        Ok(Value::TypedObject {
            class_name: "flex.messaging.io.ArrayCollection".to_owned(),
            properties,
        })
    }

    fn read_dsa<R: io::Read>(&mut self, reader: &mut R) -> Result<Value> {
        let mut properties = Object::new();
        self.read_external_fields(reader, &mut properties, DSA_FIELDS_ONE)?;
        self.read_external_fields(reader, &mut properties, DSA_FIELDS_TWO)?;

        Ok(Value::TypedObject {
            class_name: "DSA".to_owned(),
            properties,
        })
    }

    /// A CommandMessage is an AsyncMessage plus one flag round this decoder
    /// has no fields for; its values are consumed to keep the stream aligned.
    fn read_dsk<R: io::Read>(&mut self, reader: &mut R) -> Result<Value> {
        let mut properties = Object::new();
        self.read_external_fields(reader, &mut properties, DSA_FIELDS_ONE)?;
        self.read_external_fields(reader, &mut properties, DSA_FIELDS_TWO)?;
        self.read_external_fields(reader, &mut properties, &[])?;

        Ok(Value::TypedObject {
            class_name: "DSK".to_owned(),
            properties,
        })
    }

    /// Read one flag round: the flag bytes, then one value per set bit.
    ///
    /// The field order is part of the wire contract; bits map to `fields`
    /// LSB first, seven per flag byte.
    fn read_external_fields<R: io::Read>(
        &mut self,
        reader: &mut R,
        properties: &mut Object,
        fields: &[&str],
    ) -> Result<()> {
        let flags = read_external_flags(reader)?;

        for (i, flag) in flags.into_iter().enumerate() {
            for bit in 0..7usize {
                if flag & (1 << bit) == 0 {
                    continue;
                }

                let value = self.decode_amf3(reader)?;
                match fields.get(i * 7 + bit) {
                    Some(name) => {
                        properties.insert((*name).to_owned(), value);
                    }
                    None => {
                        tracing::debug!(flag, bit, "discarding unknown external field");
                    }
                }
            }
        }

        Ok(())
    }
}

/// Read flag bytes until one without the continuation bit.
fn read_external_flags<R: io::Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut flags = Vec::new();

    loop {
        let flag = reader.read_u8()?;
        flags.push(flag);
        if flag & 0x80 == 0 {
            break;
        }
    }

    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<Value> {
        Decoder::new().decode(&mut &bytes[..], crate::VERSION_AMF3)
    }

    // Object marker, inline object, inline externalizable trait with no
    // sealed properties, followed by an inline class name.
    fn externalizable_header(class_name: &str) -> Vec<u8> {
        let mut bytes = vec![0x0a, 0x07];
        bytes.push(((class_name.len() as u8) << 1) | 0x01);
        bytes.extend_from_slice(class_name.as_bytes());
        bytes
    }

    #[test]
    fn array_collection() {
        let mut bytes = externalizable_header("flex.messaging.io.ArrayCollection");
        // body: [integer 5]
        bytes.extend_from_slice(&[0x09, 0x03, 0x01, 0x04, 0x05]);

        let value = decode(&bytes).unwrap();
        assert!(
            matches!(value, Value::TypedObject { ref class_name, .. } if class_name == "flex.messaging.io.ArrayCollection")
        );
        assert_eq!(value.get("array"), Some(&Value::Array(vec![Value::Integer(5)])));
    }

    #[test]
    fn dsa() {
        let mut bytes = externalizable_header("DSA");
        #[rustfmt::skip]
        bytes.extend_from_slice(&[
            0x03,       // round one: body and clientId
            0x04, 0x05, // body = 5
            0x04, 0x06, // clientId = 6
            0x01,       // round two: correlationId
            0x04, 0x07, // correlationId = 7
        ]);

        let value = decode(&bytes).unwrap();
        assert_eq!(value.get("body"), Some(&Value::Integer(5)));
        assert_eq!(value.get("clientId"), Some(&Value::Integer(6)));
        assert_eq!(value.get("correlationId"), Some(&Value::Integer(7)));
        assert_eq!(value.get("destination"), None);
    }

    #[test]
    fn dsa_second_flag_byte() {
        let mut bytes = externalizable_header("DSA");
        #[rustfmt::skip]
        bytes.extend_from_slice(&[
            0x81,       // round one, continued: body...
            0x01,       // ...and clientIdBytes (bit 7 overall)
            0x04, 0x05, // body = 5
            0x04, 0x06, // clientIdBytes = 6
            0x00,       // round two: nothing
        ]);

        let value = decode(&bytes).unwrap();
        assert_eq!(value.get("body"), Some(&Value::Integer(5)));
        assert_eq!(value.get("clientIdBytes"), Some(&Value::Integer(6)));
        assert_eq!(value.get("correlationId"), None);
    }

    #[test]
    fn dsa_discards_trailing_extension_bits() {
        let mut bytes = externalizable_header("DSA");
        #[rustfmt::skip]
        bytes.extend_from_slice(&[
            0x00,       // round one: nothing
            0x05,       // round two: correlationId plus an unknown bit 2
            0x04, 0x07, // correlationId = 7
            0x04, 0x2a, // unknown field, consumed and dropped
        ]);

        let value = decode(&bytes).unwrap();
        assert_eq!(value.get("correlationId"), Some(&Value::Integer(7)));
        assert_eq!(value.as_object().unwrap().len(), 1);
    }

    #[test]
    fn dsk() {
        let mut bytes = externalizable_header("DSK");
        #[rustfmt::skip]
        bytes.extend_from_slice(&[
            0x01,       // round one: body
            0x04, 0x05,
            0x00,       // round two: nothing
            0x03,       // forward-compatibility round: two unknown values
            0x04, 0x08,
            0x04, 0x09,
        ]);

        let value = decode(&bytes).unwrap();
        assert!(matches!(value, Value::TypedObject { ref class_name, .. } if class_name == "DSK"));
        assert_eq!(value.get("body"), Some(&Value::Integer(5)));
        assert_eq!(value.as_object().unwrap().len(), 1);
    }

    #[test]
    fn unknown_externalizable_class() {
        let mut bytes = externalizable_header("org.example.Opaque");
        bytes.push(0x00);

        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, AmfError::UnsupportedExternalizable(ref name) if name == "org.example.Opaque"));
    }
}
