//! Codec error type.

use std::io;
use std::num::TryFromIntError;
use std::string::FromUtf8Error;

/// Result type.
pub type Result<T, E = AmfError> = std::result::Result<T, E>;

/// AMF codec error.
///
/// Errors propagate upward; nothing is retried. A session that has errored
/// must not be reused: the byte stream is left wherever the failure occurred.
#[derive(thiserror::Error, Debug)]
pub enum AmfError {
    /// IO error.
    ///
    /// Short reads and short writes surface here as
    /// [`io::ErrorKind::UnexpectedEof`] and [`io::ErrorKind::WriteZero`].
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// A marker byte outside the format's marker set.
    #[error("unknown marker: {0:#04x}")]
    UnknownMarker(u8),
    /// A required marker assertion failed.
    #[error("unexpected marker: expected {expected:#04x}, got {got:#04x}")]
    UnexpectedMarker {
        /// The marker required at this position.
        expected: u8,
        /// The marker actually read.
        got: u8,
    },
    /// A boolean byte was neither 0x00 nor 0x01.
    #[error("unexpected boolean value: {0:#04x}")]
    UnexpectedValue(u8),
    /// A reserved marker, or a value with no mapping in the requested format.
    #[error("this type is not supported: {0}")]
    UnsupportedType(&'static str),
    /// An externalizable class without a bespoke reader.
    #[error("cannot decode externalizable class: {0}")]
    UnsupportedExternalizable(String),
    /// Version other than 0 or 3.
    #[error("unsupported amf version: {0}")]
    UnsupportedVersion(u8),
    /// A reference index exceeded its table's current length.
    #[error("bad {kind} reference: {index}")]
    BadReference {
        /// Which table the reference addressed.
        kind: &'static str,
        /// The out-of-range index.
        index: usize,
    },
    /// A trait index exceeded the trait table's current length.
    #[error("bad trait reference: {0}")]
    BadTraitReference(usize),
    /// An object-table entry exists but is not the expected variant.
    #[error("object reference {index} is not a {expected}")]
    BadTypeConversion {
        /// The variant the marker called for.
        expected: &'static str,
        /// The table index that resolved to something else.
        index: usize,
    },
    /// An ecma-array's declared length disagreed with its decoded entries.
    #[error("length mismatch: declared {expected}, decoded {got}")]
    LengthMismatch {
        /// The length the stream declared.
        expected: usize,
        /// The number of entries actually present.
        got: usize,
    },
    /// A u29 can carry at most 29 bits.
    #[error("cannot encode u29 out of range: {0}")]
    U29OutOfRange(u32),
    /// An AMF3 array body carried associative entries.
    #[error("associative arrays are not supported")]
    UnsupportedAssociativeArray,
    /// Element (string or sequence) is too long for its length prefix.
    #[error("element is too long: {0}")]
    TooLong(#[from] TryFromIntError),
    /// String bytes were not valid UTF-8.
    #[error("string parse error: {0}")]
    StringParse(#[from] FromUtf8Error),
}
