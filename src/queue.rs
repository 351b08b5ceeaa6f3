//! FIFO correlation of sent commands to pending completions
//!
//! Replies carry no identifiers; RESP pairs the Nth reply with the Nth
//! command sent on the connection. Every command occupies a queue slot at
//! send time, whether or not a caller is waiting on its result.

use crate::core::{
    error::{RedisError, RedisResult},
    value::{RedisValue, RespValue},
};
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Response transform applied before completing a command, selected at send
/// time from the command table.
pub type Transform = fn(RespValue) -> RedisResult<RedisValue>;

/// A command awaiting its reply
pub struct PendingCommand {
    /// Optional value transform from the command table
    pub transform: Option<Transform>,
    /// Completion for the caller; `None` still consumes a FIFO slot
    pub completion: Option<oneshot::Sender<RedisResult<RedisValue>>>,
}

/// FIFO queue of pending commands for one connection
#[derive(Default)]
pub struct ResponseQueue {
    pending: VecDeque<PendingCommand>,
}

impl ResponseQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command at send time
    pub fn push(&mut self, command: PendingCommand) {
        self.pending.push_back(command);
    }

    /// Number of commands awaiting replies
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no commands are awaiting replies
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Complete the oldest pending command with a successful reply, applying
    /// its transform. A transform failure is delivered to the caller as an
    /// error; a missing caller discards the value.
    pub fn complete(&mut self, value: RespValue) {
        if let Some(command) = self.pending.pop_front() {
            if let Some(completion) = command.completion {
                let result = match command.transform {
                    Some(transform) => transform(value),
                    None => Ok(RedisValue::from_resp(value)),
                };
                // The caller may have abandoned the command; a dropped
                // receiver is not an error.
                let _ = completion.send(result);
            }
        }
    }

    /// Fail the oldest pending command with a server error, consuming its
    /// slot. The command's success path never fires.
    pub fn fail_front(&mut self, error: RedisError) {
        if let Some(command) = self.pending.pop_front() {
            if let Some(completion) = command.completion {
                let _ = completion.send(Err(error));
            }
        }
    }

    /// Fail every pending command, used when the connection drops
    pub fn fail_all(&mut self, error: &RedisError) {
        for command in self.pending.drain(..) {
            if let Some(completion) = command.completion {
                let _ = completion.send(Err(error.clone()));
            }
        }
    }
}
