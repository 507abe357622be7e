//! AMF value types.
//!
//! Both AMF0 and AMF3 serialize the same value universe, so one tagged sum
//! covers both formats. Maps are kept sorted by key (not in insertion order),
//! which makes the encoder's output canonical.

use std::collections::BTreeMap;

use bytes::Bytes;

/// Represents any AMF object body: string keys, sorted.
pub type Object = BTreeMap<String, Value>;

/// Represents any AMF value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Undefined (AMF0: 0x06, AMF3: 0x00).
    Undefined,
    /// Null (AMF0: 0x05, AMF3: 0x01).
    Null,
    /// Boolean (AMF0: 0x01, AMF3: 0x02/0x03).
    Boolean(bool),
    /// IEEE-754 double (AMF0: 0x00, AMF3: 0x05).
    Number(f64),
    /// 29-bit unsigned integer (AMF3 only: 0x04).
    ///
    /// Values outside the u29 range are encoded as [`Value::Number`].
    Integer(u32),
    /// UTF-8 string (AMF0: 0x02/0x0c, AMF3: 0x06).
    String(String),
    /// Milliseconds since the Unix epoch (AMF0: 0x0b, AMF3: 0x08).
    ///
    /// The AMF0 timezone field is written as zero and discarded on read.
    Date(f64),
    /// Dense array (AMF0 strict array 0x0a, AMF3 array 0x09).
    Array(Vec<Value>),
    /// Associative array (AMF0 only: 0x08).
    EcmaArray(Object),
    /// Anonymous object (AMF0 only: 0x03).
    Object(Object),
    /// Object with a class name (AMF0: 0x10, AMF3: 0x0a).
    TypedObject {
        /// The registered class alias, or the empty string for anonymous
        /// AMF3 objects.
        class_name: String,
        /// Named properties, sealed and dynamic alike.
        properties: Object,
    },
    /// Raw byte buffer (AMF3 only: 0x0c).
    ByteArray(Bytes),
    /// AMF0 unsupported-marker (0x0d).
    Unsupported,
}

/// Describes the shape of a typed object for AMF3 object encoding.
///
/// A trait is registered in its session's trait table the first time it is
/// seen and is immutable afterwards; later objects of the same class refer to
/// it by index.
#[derive(Debug, Clone, PartialEq)]
pub struct Trait {
    /// The registered class alias.
    pub class_name: String,
    /// The object body is opaque and read by a class-specific reader.
    pub externalizable: bool,
    /// The sealed properties are followed by (key, value) pairs terminated
    /// by an empty key.
    pub dynamic: bool,
    /// Sealed property names, in serialization order.
    pub properties: Vec<String>,
}

impl Value {
    /// Try to get this value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get this value as a boolean.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value's object body.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            Value::EcmaArray(o) => Some(o),
            Value::TypedObject { properties, .. } => Some(properties),
            _ => None,
        }
    }

    /// Try to get this value as an array slice.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get a property from an object body.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object()?.get(key)
    }

    /// Check if this value is null or undefined.
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::ByteArray(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(value: Vec<V>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> FromIterator<(String, V)> for Value {
    fn from_iter<T: IntoIterator<Item = (String, V)>>(iter: T) -> Self {
        Value::Object(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::{SerializeMap, SerializeSeq};

        match self {
            Value::Undefined | Value::Null | Value::Unsupported => serializer.serialize_none(),
            Value::Boolean(v) => serializer.serialize_bool(*v),
            Value::Number(v) => serializer.serialize_f64(*v),
            Value::Integer(v) => serializer.serialize_u32(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Date(v) => serializer.serialize_f64(*v),
            Value::ByteArray(v) => serializer.serialize_bytes(v),
            Value::Array(v) => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;

                for value in v {
                    seq.serialize_element(value)?;
                }

                seq.end()
            }
            Value::Object(v) | Value::EcmaArray(v) | Value::TypedObject { properties: v, .. } => {
                let mut map = serializer.serialize_map(Some(v.len()))?;

                for (key, value) in v {
                    map.serialize_entry(key, value)?;
                }

                map.end()
            }
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> serde::de::Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("an AMF value")
            }

            #[inline]
            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::Boolean(v))
            }

            #[inline]
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::Number(v as f64))
            }

            #[inline]
            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::Number(v as f64))
            }

            #[inline]
            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::Number(v))
            }

            #[inline]
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::String(v.to_owned()))
            }

            #[inline]
            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::String(v))
            }

            #[inline]
            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::Null)
            }

            #[inline]
            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::Null)
            }

            #[inline]
            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                serde::Deserialize::deserialize(deserializer)
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Value::ByteArray(Bytes::copy_from_slice(v)))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut vec = Vec::new();

                while let Some(value) = seq.next_element()? {
                    vec.push(value);
                }

                Ok(Value::Array(vec))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut object = Object::new();

                while let Some((key, value)) = map.next_entry()? {
                    object.insert(key, value);
                }

                Ok(Value::Object(object))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let s = Value::String("test".into());
        assert_eq!(s.as_str(), Some("test"));
        assert_eq!(s.as_number(), None);

        let n = Value::Number(42.0);
        assert_eq!(n.as_number(), Some(42.0));
        assert_eq!(n.as_str(), None);

        let i = Value::Integer(7);
        assert_eq!(i.as_number(), Some(7.0));

        assert!(Value::Null.is_null_or_undefined());
        assert!(Value::Undefined.is_null_or_undefined());
        assert!(!Value::Boolean(false).is_null_or_undefined());

        let object: Value = [("key".to_owned(), "value")].into_iter().collect();
        assert_eq!(object.get("key").and_then(Value::as_str), Some("value"));
        assert_eq!(object.get("missing"), None);
    }

    #[test]
    fn from_conversions() {
        let v: Value = "test".into();
        assert!(matches!(v, Value::String(_)));

        let v: Value = 42.0.into();
        assert!(matches!(v, Value::Number(_)));

        let v: Value = 42u32.into();
        assert!(matches!(v, Value::Integer(42)));

        let v: Value = true.into();
        assert!(matches!(v, Value::Boolean(true)));

        let v: Value = vec![1.0, 2.0].into();
        assert_eq!(v.as_array().map(<[Value]>::len), Some(2));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_json_round_trip() {
        let object: Value = [
            ("name".to_owned(), Value::String("alfie".into())),
            ("age".to_owned(), Value::Number(7.0)),
            ("tags".to_owned(), Value::Array(vec![Value::String("dog".into())])),
            ("owner".to_owned(), Value::Null),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&object).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, object);
    }
}
