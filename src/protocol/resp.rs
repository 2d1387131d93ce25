//! RESP2 parser and encoder
//!
//! Implements parsing from bytes to RespValue and encoding from RespValue to bytes

use super::types::{RespError, RespValue};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// Largest bulk string accepted from the wire (512 MiB, same as Redis)
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Longest header or simple-string line accepted before the CRLF shows up
const MAX_LINE_LEN: usize = 64 * 1024;

/// Upper bound on the up-front allocation for an array's elements
const MAX_PREALLOC: usize = 1024;

/// Deepest array nesting accepted; commands only ever use one level
const MAX_DEPTH: usize = 32;

/// RESP2 Parser
pub struct RespParser;

impl RespParser {
    /// Parse a RESP value from the front of a buffer
    ///
    /// Returns Ok(Some(value)) if a complete value was parsed and consumed,
    /// Ok(None) if more data is needed (nothing is consumed),
    /// Err(e) if the bytes violate the grammar
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        let mut pos = 0;
        match Self::parse_at(buf, &mut pos, 0) {
            Ok(value) => {
                buf.advance(pos);
                Ok(Some(value))
            }
            Err(RespError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Parse one value starting at `pos`, moving `pos` past it
    fn parse_at(src: &[u8], pos: &mut usize, depth: usize) -> Result<RespValue, RespError> {
        let tag = *src.get(*pos).ok_or(RespError::Incomplete)?;
        *pos += 1;

        match tag {
            b'+' => Ok(RespValue::SimpleString(Self::read_text(src, pos)?)),
            b'-' => Ok(RespValue::Error(Self::read_text(src, pos)?)),
            b':' => Ok(RespValue::Integer(Self::read_integer(src, pos)?)),
            b'$' => Self::parse_bulk_string(src, pos),
            b'*' => Self::parse_array(src, pos, depth + 1),
            other => Err(RespError::InvalidProtocol(format!(
                "unknown type prefix: {:?}",
                other as char
            ))),
        }
    }

    /// Parse bulk string: $6\r\nfoobar\r\n or $-1\r\n (null)
    fn parse_bulk_string(src: &[u8], pos: &mut usize) -> Result<RespValue, RespError> {
        let len = Self::read_integer(src, pos)?;

        if len == -1 {
            return Ok(RespValue::Null);
        }
        if !(0..=MAX_BULK_LEN).contains(&len) {
            return Err(RespError::InvalidLength(len));
        }

        let len = len as usize;
        let end = *pos + len;
        if src.len() < end + CRLF.len() {
            return Err(RespError::Incomplete);
        }
        if &src[end..end + CRLF.len()] != CRLF {
            return Err(RespError::InvalidProtocol(
                "missing CRLF after bulk string data".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&src[*pos..end]);
        *pos = end + CRLF.len();
        Ok(RespValue::BulkString(data))
    }

    /// Parse array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    fn parse_array(src: &[u8], pos: &mut usize, depth: usize) -> Result<RespValue, RespError> {
        if depth > MAX_DEPTH {
            return Err(RespError::InvalidProtocol("nesting too deep".to_string()));
        }

        let count = Self::read_integer(src, pos)?;

        // Null array, only ever sent by other implementations
        if count == -1 {
            return Ok(RespValue::Null);
        }
        if count < 0 {
            return Err(RespError::InvalidLength(count));
        }

        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            elements.push(Self::parse_at(src, pos, depth)?);
        }

        Ok(RespValue::Array(elements))
    }

    /// Read a line as UTF-8 text
    fn read_text(src: &[u8], pos: &mut usize) -> Result<String, RespError> {
        let line = Self::read_line(src, pos)?;
        String::from_utf8(line.to_vec()).map_err(|_| RespError::InvalidUtf8)
    }

    /// Read a line holding a signed decimal number
    fn read_integer(src: &[u8], pos: &mut usize) -> Result<i64, RespError> {
        let line = Self::read_line(src, pos)?;
        std::str::from_utf8(line)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                RespError::InvalidProtocol(format!(
                    "invalid integer: {:?}",
                    String::from_utf8_lossy(line)
                ))
            })
    }

    /// Read up to the next CRLF, advance past it, return the line without CRLF
    fn read_line<'a>(src: &'a [u8], pos: &mut usize) -> Result<&'a [u8], RespError> {
        let rest = &src[*pos..];
        match rest.windows(2).position(|w| w == CRLF) {
            Some(i) => {
                *pos += i + CRLF.len();
                Ok(&rest[..i])
            }
            None if rest.len() > MAX_LINE_LEN => Err(RespError::InvalidProtocol(
                "line too long".to_string(),
            )),
            None => Err(RespError::Incomplete),
        }
    }
}

/// RESP2 Encoder
pub struct RespEncoder;

impl RespEncoder {
    /// Encode a RESP value to bytes
    pub fn encode(value: &RespValue) -> Bytes {
        let mut buf = BytesMut::new();
        Self::encode_to(&mut buf, value);
        buf.freeze()
    }

    /// Encode a RESP value into an existing buffer
    pub fn encode_to(buf: &mut BytesMut, value: &RespValue) {
        match value {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Error(e) => {
                buf.put_u8(b'-');
                buf.put_slice(e.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Integer(i) => {
                buf.put_u8(b':');
                buf.put_slice(i.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::BulkString(bytes) => {
                buf.put_u8(b'$');
                buf.put_slice(bytes.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(bytes);
                buf.put_slice(CRLF);
            }
            RespValue::Null => {
                buf.put_slice(b"$-1\r\n");
            }
            RespValue::Array(arr) => {
                buf.put_u8(b'*');
                buf.put_slice(arr.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for elem in arr {
                    Self::encode_to(buf, elem);
                }
            }
        }
    }
}
