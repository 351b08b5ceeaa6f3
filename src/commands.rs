//! Supported command table and response transforms
//!
//! Command methods are generated from a static table on top of the generic
//! [`Client::execute`]; each entry maps a method to its command name and
//! argument shape. Response transforms are likewise selected from a static
//! per-command table at send time: boolean-style commands coerce `"1"`/`"OK"`
//! to `true`, hash retrieval coerces a flat key/value array to a mapping, and
//! the server-info command parses `key:value` lines into a mapping.

use crate::client::Client;
use crate::core::{
    error::{RedisError, RedisResult},
    value::{CommandArg, RedisValue, RespValue},
};
use crate::queue::Transform;
use std::collections::HashMap;

/// Commands whose reply coerces to a boolean
const BOOLEAN_COMMANDS: &[&str] = &[
    "exists", "hexists", "sismember", "sadd", "srem", "setnx", "del", "expire", "select", "hset",
    "hdel", "hsetnx",
];

/// Select the response transform for a command, if the table defines one
#[must_use]
pub fn response_transform(command: &str) -> Option<Transform> {
    if BOOLEAN_COMMANDS.contains(&command) {
        Some(boolean_transform)
    } else {
        match command {
            "hgetall" => Some(hash_transform),
            "info" => Some(info_transform),
            _ => None,
        }
    }
}

/// `"1"` and `"OK"` are truthy; every other reply is false.
fn boolean_transform(value: RespValue) -> RedisResult<RedisValue> {
    let truthy = match &value {
        RespValue::Integer(i) => *i == 1,
        RespValue::SimpleString(s) => s == "1" || s == "OK",
        RespValue::BulkString(b) => &b[..] == b"1" || &b[..] == b"OK",
        _ => false,
    };
    Ok(RedisValue::Bool(truthy))
}

/// Coerce a flat `[field, value, field, value, ...]` array into a mapping.
fn hash_transform(value: RespValue) -> RedisResult<RedisValue> {
    let items = match value {
        RespValue::Array(items) => items,
        other => {
            return Err(RedisError::Type(format!(
                "expected array reply for hash, got {other:?}"
            )))
        }
    };

    let mut map = HashMap::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let Some(field) = iter.next() {
        let Some(item) = iter.next() else { break };
        map.insert(field.as_string()?, item.as_string()?);
    }
    Ok(RedisValue::Map(map))
}

/// Parse the newline-delimited `key:value` text of an INFO reply into a
/// mapping, skipping blank lines and `#` section headers.
fn info_transform(value: RespValue) -> RedisResult<RedisValue> {
    let text = value.as_string()?;
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, item)) = line.split_once(':') {
            map.insert(key.to_string(), item.to_string());
        }
    }
    Ok(RedisValue::Map(map))
}

/// Generate one thin command method per table entry. Each method forwards
/// its positional arguments to [`Client::execute`], which applies the
/// send-time response transform.
macro_rules! command_methods {
    ($($(#[$meta:meta])* $name:ident => $cmd:literal ($($arg:ident),*);)*) => {
        impl Client {
            $(
                $(#[$meta])*
                pub async fn $name(&self $(, $arg: impl Into<CommandArg>)*) -> RedisResult<RedisValue> {
                    self.execute($cmd, vec![$($arg.into()),*]).await
                }
            )*
        }
    };
}

command_methods! {
    /// Set a key to a value
    set => "set" (key, value);
    /// Set a key to a value only if the key does not exist
    setnx => "setnx" (key, value);
    /// Get the value of a key
    get => "get" (key);
    /// Set a key to a value and return its previous value
    getset => "getset" (key, value);
    /// Delete a key
    del => "del" (key);
    /// Fetch server information as a mapping
    info => "info" ();
    /// Add a member to a set
    sadd => "sadd" (key, member);
    /// Fetch all members of a set
    smembers => "smembers" (key);
    /// Check set membership
    sismember => "sismember" (key, member);
    /// Remove a member from a set
    srem => "srem" (key, member);
    /// Fetch the cardinality of a set
    scard => "scard" (key);
    /// Set a hash field to a value
    hset => "hset" (key, field, value);
    /// Set a hash field only if it does not exist
    hsetnx => "hsetnx" (key, field, value);
    /// Get the value of a hash field
    hget => "hget" (key, field);
    /// Fetch a whole hash as a mapping
    hgetall => "hgetall" (key);
    /// Delete a hash field
    hdel => "hdel" (key, field);
    /// Increment a hash field by an integer
    hincrby => "hincrby" (key, field, increment);
    /// Append a value to a list
    rpush => "rpush" (key, value);
    /// Prepend a value to a list
    lpush => "lpush" (key, value);
    /// Trim a list to a range
    ltrim => "ltrim" (key, start, stop);
    /// Fetch a range of list elements
    lrange => "lrange" (key, start, stop);
    /// Fetch the length of a list
    llen => "llen" (key);
    /// Check whether a key exists
    exists => "exists" (key);
    /// Check whether a hash field exists
    hexists => "hexists" (key, field);
    /// Fetch the remaining time to live of a key
    ttl => "ttl" (key);
    /// Set a key's time to live in seconds
    expire => "expire" (key, seconds);
    /// Remove all keys from the current database
    flushdb => "flushdb" ();
    /// Increment the integer value of a key
    incr => "incr" (key);
}
