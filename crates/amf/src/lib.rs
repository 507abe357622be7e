//! A pure-rust implementation of an AMF0 and AMF3 encoder and decoder.
//!
//! Action Message Format is the binary serialization used by the Flash/RTMP
//! ecosystem to exchange dynamically-typed values. Two revisions coexist on
//! the wire: AMF0 (tag-prefixed, self-describing) and AMF3 (compact, with
//! session-scoped reference tables for strings, complex values and object
//! traits). AMF0's avmplus marker (0x11) escapes into AMF3 mid-stream, so
//! both formats are decoded by a single session.
//!
//! # Limitations
//!
//! - Does not support the XML, XMLDocument, MovieClip, RecordSet or AMF0
//!   Reference types.
//! - AMF3 arrays with associative members are rejected.
//! - Only the Flex messaging externalizable classes (`DSA`, `DSK` and
//!   `flex.messaging.io.ArrayCollection`) can be decoded; externalizable
//!   objects cannot be encoded.
//!
//! # Examples
//!
//! ```rust
//! # fn test() -> Result<(), Box<dyn std::error::Error>> {
//! use amf::{Value, VERSION_AMF0};
//!
//! let mut buf = Vec::new();
//! amf::encode(&mut buf, &Value::Boolean(true), VERSION_AMF0)?;
//! assert_eq!(buf, [0x01, 0x01]);
//!
//! let value = amf::decode(&mut buf.as_slice(), VERSION_AMF0)?;
//! assert_eq!(value, Value::Boolean(true));
//! # Ok(())
//! # }
//! # test().expect("test failed");
//! ```
#![deny(unsafe_code)]
#![deny(unreachable_pub)]

use std::io;

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod value;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{AmfError, Result};
pub use value::{Object, Trait, Value};

/// AMF version 0.
pub const VERSION_AMF0: u8 = 0;
/// AMF version 3.
pub const VERSION_AMF3: u8 = 3;

/// AMF0 marker types.
///
/// Defined by:
/// - AMF 0 spec, 2.1.
#[derive(Debug, PartialEq, Eq, Clone, Copy, num_derive::FromPrimitive)]
#[repr(u8)]
pub enum Amf0Marker {
    /// number-marker
    Number = 0x00,
    /// boolean-marker
    Boolean = 0x01,
    /// string-marker
    String = 0x02,
    /// object-marker
    Object = 0x03,
    /// movieclip-marker
    ///
    /// reserved, not supported
    MovieClip = 0x04,
    /// null-marker
    Null = 0x05,
    /// undefined-marker
    Undefined = 0x06,
    /// reference-marker
    ///
    /// not supported
    Reference = 0x07,
    /// ecma-array-marker
    EcmaArray = 0x08,
    /// object-end-marker
    ObjectEnd = 0x09,
    /// strict-array-marker
    StrictArray = 0x0a,
    /// date-marker
    Date = 0x0b,
    /// long-string-marker
    LongString = 0x0c,
    /// unsupported-marker
    Unsupported = 0x0d,
    /// recordset-marker
    ///
    /// reserved, not supported
    Recordset = 0x0e,
    /// xml-document-marker
    ///
    /// not supported
    XmlDocument = 0x0f,
    /// typed-object-marker
    TypedObject = 0x10,
    /// avmplus-object-marker
    ///
    /// switches the stream to AMF3 for the next value
    AvmPlusObject = 0x11,
}

/// AMF3 marker types.
///
/// Defined by:
/// - AMF 3 spec, 3.1-3.14.
#[derive(Debug, PartialEq, Eq, Clone, Copy, num_derive::FromPrimitive)]
#[repr(u8)]
pub enum Amf3Marker {
    /// undefined-marker
    Undefined = 0x00,
    /// null-marker
    Null = 0x01,
    /// false-marker
    False = 0x02,
    /// true-marker
    True = 0x03,
    /// integer-marker
    Integer = 0x04,
    /// double-marker
    Double = 0x05,
    /// string-marker
    String = 0x06,
    /// xml-doc-marker
    ///
    /// not supported
    XmlDocument = 0x07,
    /// date-marker
    Date = 0x08,
    /// array-marker
    Array = 0x09,
    /// object-marker
    Object = 0x0a,
    /// xml-marker
    ///
    /// not supported
    Xml = 0x0b,
    /// bytearray-marker
    ByteArray = 0x0c,
}

/// Decode exactly one top-level value from the reader using a fresh session.
///
/// Version 0 selects the AMF0 path (which follows the avmplus marker into
/// AMF3 when the peer sends it), version 3 the AMF3 path.
pub fn decode<R: io::Read>(reader: &mut R, version: u8) -> Result<Value> {
    Decoder::new().decode(reader, version)
}

/// Encode exactly one top-level value to the writer using a fresh session.
///
/// Returns the number of bytes written.
pub fn encode<W: io::Write>(writer: &mut W, value: &Value, version: u8) -> Result<usize> {
    Encoder::new().encode(writer, value, version)
}
