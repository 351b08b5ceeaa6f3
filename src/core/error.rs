//! Error types for Redis operations

use std::io;
use thiserror::Error;

/// Result type for Redis operations
pub type RedisResult<T> = Result<T, RedisError>;

/// Comprehensive error type for Redis operations
#[derive(Error, Debug)]
pub enum RedisError {
    /// IO error during network operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Connection error: transport failure, authentication failure, version
    /// gate failure, or unexpected close
    #[error("connection error: {0}")]
    Connection(String),

    /// Protocol parsing error, always fatal to the connection it occurred on
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server returned an error reply, scoped to a single command
    #[error("redis returned error code: {0}")]
    Command(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Type conversion error
    #[error("type conversion error: {0}")]
    Type(String),
}

impl RedisError {
    /// Check whether this error is scoped to a single command. Command errors
    /// drop only their own pending command; every other kind is a connection
    /// level failure.
    #[must_use]
    pub const fn is_command_error(&self) -> bool {
        matches!(self, Self::Command(_))
    }
}

impl Clone for RedisError {
    fn clone(&self) -> Self {
        match self {
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::Connection(s) => Self::Connection(s.clone()),
            Self::Protocol(s) => Self::Protocol(s.clone()),
            Self::Command(s) => Self::Command(s.clone()),
            Self::Config(s) => Self::Config(s.clone()),
            Self::Type(s) => Self::Type(s.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_message() {
        let err = RedisError::Command("ERR unknown command".to_string());
        assert_eq!(
            err.to_string(),
            "redis returned error code: ERR unknown command"
        );
        assert!(err.is_command_error());
    }

    #[test]
    fn test_connection_error_message() {
        let err = RedisError::Connection("connection closed".to_string());
        assert_eq!(err.to_string(), "connection error: connection closed");
        assert!(!err.is_command_error());
    }
}
