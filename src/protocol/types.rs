//! RESP2 value types
//!
//! Defines the core data types for RESP2 protocol

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// RESP2 value types
///
/// `SimpleString` and `Error` payloads are line-oriented and must not
/// contain `\r` or `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Simple strings: +OK\r\n
    SimpleString(String),

    /// Errors: -Error message\r\n
    Error(String),

    /// Integers: :1000\r\n
    Integer(i64),

    /// Bulk strings: $6\r\nfoobar\r\n
    BulkString(Bytes),

    /// Null bulk string: $-1\r\n
    Null,

    /// Arrays: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Create a simple string
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Create an error
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Create an integer
    pub fn integer(i: i64) -> Self {
        RespValue::Integer(i)
    }

    /// Create a bulk string from bytes
    pub fn bulk_string(b: impl Into<Bytes>) -> Self {
        RespValue::BulkString(b.into())
    }

    /// Create a null value
    pub fn null() -> Self {
        RespValue::Null
    }

    /// Create an array
    pub fn array(v: Vec<RespValue>) -> Self {
        RespValue::Array(v)
    }

    /// Build a command array out of bulk strings: `["SET", "k", "v"]`
    pub fn command<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        RespValue::Array(parts.into_iter().map(RespValue::bulk_string).collect())
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Try to extract array elements
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to extract bulk string bytes
    pub fn as_bulk_string(&self) -> Option<&Bytes> {
        match self {
            RespValue::BulkString(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "SimpleString({})", s),
            RespValue::Error(e) => write!(f, "Error({})", e),
            RespValue::Integer(i) => write!(f, "Integer({})", i),
            RespValue::BulkString(b) => write!(f, "BulkString({} bytes)", b.len()),
            RespValue::Null => write!(f, "Null"),
            RespValue::Array(arr) => write!(f, "Array({} elements)", arr.len()),
        }
    }
}

/// RESP parsing errors
#[derive(Debug, Error)]
pub enum RespError {
    /// Incomplete data, need more bytes
    #[error("incomplete frame")]
    Incomplete,

    /// Invalid protocol format
    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),

    /// Negative or oversized length prefix
    #[error("invalid length prefix: {0}")]
    InvalidLength(i64),

    /// Invalid UTF-8 in a simple string or error line
    #[error("invalid UTF-8")]
    InvalidUtf8,

    /// The source ended after part of a value had been read
    #[error("stream ended in the middle of a frame")]
    UnexpectedEof,

    /// IO error while reading the source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RespError {
    /// True for errors caused by bytes that violate the grammar, as opposed
    /// to a short read or an IO failure.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            RespError::InvalidProtocol(_) | RespError::InvalidLength(_) | RespError::InvalidUtf8
        )
    }
}
