//! RESP (`REdis` Serialization Protocol) value types

use crate::core::error::{RedisError, RedisResult};
use bytes::Bytes;
use std::collections::HashMap;

/// RESP protocol value as decoded off the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Simple string: +OK\r\n
    SimpleString(String),
    /// Error: -ERR message\r\n
    Error(String),
    /// Integer: :1000\r\n
    Integer(i64),
    /// Bulk string: $6\r\nfoobar\r\n
    BulkString(Bytes),
    /// Null bulk string: $-1\r\n
    Null,
    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Convert to a string if possible
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be converted to a string.
    pub fn as_string(&self) -> RedisResult<String> {
        match self {
            Self::SimpleString(s) => Ok(s.clone()),
            Self::BulkString(b) => String::from_utf8(b.to_vec())
                .map_err(|e| RedisError::Type(format!("invalid UTF-8: {e}"))),
            Self::Integer(i) => Ok(i.to_string()),
            _ => Err(RedisError::Type(format!(
                "cannot convert {self:?} to string"
            ))),
        }
    }

    /// Check if this is a null value
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this is an error reply
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Value handed to callers after the send-time response transform has been
/// applied. Raw replies map onto `Nil`/`String`/`Bytes`/`Int`/`Array`;
/// transforms produce `Bool` and `Map`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisValue {
    /// Absent value (nil bulk string)
    Nil,
    /// Simple string reply
    String(String),
    /// Bulk string reply (binary-safe)
    Bytes(Bytes),
    /// Integer reply
    Int(i64),
    /// Boolean produced by a boolean-style command transform
    Bool(bool),
    /// Array reply
    Array(Vec<RedisValue>),
    /// Mapping produced by the hash or server-info transforms
    Map(HashMap<String, String>),
}

impl RedisValue {
    /// Convert a raw RESP reply without any command-specific transform.
    pub(crate) fn from_resp(value: RespValue) -> Self {
        match value {
            RespValue::SimpleString(s) => Self::String(s),
            RespValue::Integer(i) => Self::Int(i),
            RespValue::BulkString(b) => Self::Bytes(b),
            RespValue::Null => Self::Nil,
            RespValue::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_resp).collect())
            }
            // Error replies are routed through the error path before
            // conversion; this arm is unreachable in practice.
            RespValue::Error(e) => Self::String(e),
        }
    }

    /// Convert to a string if possible
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be converted to a string.
    pub fn as_string(&self) -> RedisResult<String> {
        match self {
            Self::String(s) => Ok(s.clone()),
            Self::Bytes(b) => String::from_utf8(b.to_vec())
                .map_err(|e| RedisError::Type(format!("invalid UTF-8: {e}"))),
            Self::Int(i) => Ok(i.to_string()),
            _ => Err(RedisError::Type(format!(
                "cannot convert {self:?} to string"
            ))),
        }
    }

    /// Convert to an integer if possible
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be converted to an integer.
    pub fn as_int(&self) -> RedisResult<i64> {
        match self {
            Self::Int(i) => Ok(*i),
            Self::Bytes(b) => {
                let s = String::from_utf8(b.to_vec())
                    .map_err(|e| RedisError::Type(format!("invalid UTF-8: {e}")))?;
                s.parse::<i64>()
                    .map_err(|e| RedisError::Type(format!("cannot parse integer: {e}")))
            }
            _ => Err(RedisError::Type(format!(
                "cannot convert {self:?} to integer"
            ))),
        }
    }

    /// Convert to a boolean if possible
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be converted to a boolean.
    pub fn as_bool(&self) -> RedisResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Int(i) => Ok(*i != 0),
            _ => Err(RedisError::Type(format!("cannot convert {self:?} to bool"))),
        }
    }

    /// Convert to a string-keyed mapping if possible
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a mapping.
    pub fn as_map(&self) -> RedisResult<HashMap<String, String>> {
        match self {
            Self::Map(m) => Ok(m.clone()),
            _ => Err(RedisError::Type(format!("cannot convert {self:?} to map"))),
        }
    }

    /// Check if this is a nil value
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }
}

/// Binary-safe command argument. Arguments are encoded with their byte
/// length, so any byte sequence is a valid argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArg(pub Bytes);

impl CommandArg {
    /// The argument bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for CommandArg {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for CommandArg {
    fn from(s: String) -> Self {
        Self(Bytes::from(s.into_bytes()))
    }
}

impl From<&String> for CommandArg {
    fn from(s: &String) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<i64> for CommandArg {
    fn from(i: i64) -> Self {
        Self(Bytes::from(i.to_string().into_bytes()))
    }
}

impl From<u32> for CommandArg {
    fn from(i: u32) -> Self {
        Self(Bytes::from(i.to_string().into_bytes()))
    }
}

impl From<Vec<u8>> for CommandArg {
    fn from(b: Vec<u8>) -> Self {
        Self(Bytes::from(b))
    }
}

impl From<Bytes> for CommandArg {
    fn from(b: Bytes) -> Self {
        Self(b)
    }
}
