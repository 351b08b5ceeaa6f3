//! RESP2 protocol implementation
//!
//! This module implements the Redis Serialization Protocol (RESP2) for
//! encoding commands and incrementally decoding replies off a streaming
//! buffer. Decoding never consumes bytes for an incomplete reply; partial
//! data stays in the buffer until more arrives.

use crate::core::{
    error::{RedisError, RedisResult},
    value::{CommandArg, RespValue},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

const CRLF: &[u8] = b"\r\n";

/// Encodes Redis commands into RESP frames
pub struct RespEncoder;

impl RespEncoder {
    /// Encode a command with arguments as an array of bulk strings.
    /// Lengths are byte lengths, so arguments are binary-safe.
    pub fn encode_command(command: &str, args: &[CommandArg]) -> Bytes {
        let mut buf = BytesMut::new();

        let total_len = 1 + args.len();
        buf.put_u8(b'*');
        buf.put_slice(total_len.to_string().as_bytes());
        buf.put_slice(CRLF);

        Self::put_bulk(&mut buf, command.as_bytes());
        for arg in args {
            Self::put_bulk(&mut buf, arg.as_bytes());
        }

        buf.freeze()
    }

    fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
        buf.put_u8(b'$');
        buf.put_slice(data.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        buf.put_slice(data);
        buf.put_slice(CRLF);
    }
}

/// Decodes RESP replies from a streaming byte buffer
pub struct RespDecoder;

impl RespDecoder {
    /// Decode the next complete reply from the buffer, consuming its bytes.
    /// Returns `Ok(None)` when the buffer does not yet hold a complete reply;
    /// in that case the buffer is left untouched.
    pub fn decode_next(buf: &mut BytesMut) -> RedisResult<Option<RespValue>> {
        let mut cursor = Cursor::new(&buf[..]);
        match Self::decode(&mut cursor)? {
            Some(value) => {
                let consumed = cursor.position() as usize;
                buf.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Decode a RESP value from a cursor. Returns `Ok(None)` when the data is
    /// incomplete; the caller must not advance the underlying buffer then.
    pub fn decode(buf: &mut Cursor<&[u8]>) -> RedisResult<Option<RespValue>> {
        if !buf.has_remaining() {
            return Ok(None);
        }

        let type_byte = buf.chunk()[0];

        match type_byte {
            b'+' => Self::decode_simple_string(buf),
            b'-' => Self::decode_error(buf),
            b':' => Self::decode_integer(buf),
            b'$' => Self::decode_bulk_string(buf),
            b'*' => Self::decode_array(buf),
            _ => Err(RedisError::Protocol(format!(
                "response type not recognized: {}",
                type_byte as char
            ))),
        }
    }

    fn decode_simple_string(buf: &mut Cursor<&[u8]>) -> RedisResult<Option<RespValue>> {
        buf.advance(1); // Skip '+'

        if let Some(line) = Self::read_line(buf) {
            Ok(Some(RespValue::SimpleString(Self::line_to_string(&line)?)))
        } else {
            Ok(None)
        }
    }

    fn decode_error(buf: &mut Cursor<&[u8]>) -> RedisResult<Option<RespValue>> {
        buf.advance(1); // Skip '-'

        if let Some(line) = Self::read_line(buf) {
            Ok(Some(RespValue::Error(Self::line_to_string(&line)?)))
        } else {
            Ok(None)
        }
    }

    fn decode_integer(buf: &mut Cursor<&[u8]>) -> RedisResult<Option<RespValue>> {
        buf.advance(1); // Skip ':'

        if let Some(line) = Self::read_line(buf) {
            Ok(Some(RespValue::Integer(Self::line_to_int(&line)?)))
        } else {
            Ok(None)
        }
    }

    fn decode_bulk_string(buf: &mut Cursor<&[u8]>) -> RedisResult<Option<RespValue>> {
        buf.advance(1); // Skip '$'

        let len_line = match Self::read_line(buf) {
            Some(line) => line,
            None => return Ok(None),
        };
        let len = Self::line_to_int(&len_line)?;

        if len == -1 {
            return Ok(Some(RespValue::Null));
        }
        if len < 0 {
            return Err(RedisError::Protocol(format!(
                "invalid bulk string length: {len}"
            )));
        }

        let len = len as usize;

        // The data plus its trailing CRLF must be present; otherwise the
        // whole reply (length line included) stays in the buffer.
        if buf.remaining() < len + 2 {
            return Ok(None);
        }

        let data = buf.chunk()[..len].to_vec();
        buf.advance(len + 2);

        Ok(Some(RespValue::BulkString(Bytes::from(data))))
    }

    fn decode_array(buf: &mut Cursor<&[u8]>) -> RedisResult<Option<RespValue>> {
        buf.advance(1); // Skip '*'

        let len_line = match Self::read_line(buf) {
            Some(line) => line,
            None => return Ok(None),
        };
        let len = Self::line_to_int(&len_line)?;

        // A zero or negative element count yields an empty array immediately.
        if len <= 0 {
            return Ok(Some(RespValue::Array(Vec::new())));
        }

        let len = len as usize;
        let mut items = Vec::with_capacity(len);

        // The array stays open until every declared child has arrived.
        for _ in 0..len {
            match Self::decode(buf)? {
                Some(value) => items.push(value),
                None => return Ok(None),
            }
        }

        Ok(Some(RespValue::Array(items)))
    }

    fn read_line(buf: &mut Cursor<&[u8]>) -> Option<Vec<u8>> {
        let start = buf.position() as usize;
        let slice = buf.get_ref();

        for i in start..slice.len().saturating_sub(1) {
            if slice[i] == b'\r' && slice[i + 1] == b'\n' {
                let line = slice[start..i].to_vec();
                buf.set_position((i + 2) as u64);
                return Some(line);
            }
        }

        None
    }

    fn line_to_string(line: &[u8]) -> RedisResult<String> {
        String::from_utf8(line.to_vec())
            .map_err(|e| RedisError::Protocol(format!("invalid UTF-8: {e}")))
    }

    fn line_to_int(line: &[u8]) -> RedisResult<i64> {
        Self::line_to_string(line)?
            .parse::<i64>()
            .map_err(|e| RedisError::Protocol(format!("invalid integer: {e}")))
    }
}
