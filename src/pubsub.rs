//! PubSub routing for subscribed channels
//!
//! Decoded array replies tagged `"message"` or `"unsubscribe"` are routed to
//! per-channel subscriber callbacks instead of the response queue, but only
//! while subscriber registrations exist. Subscribe confirmations are not
//! intercepted; they flow through the normal response queue like any other
//! reply.

use crate::core::value::RespValue;
use bytes::Bytes;
use std::collections::HashMap;
use tracing::debug;

/// An event delivered to a channel subscriber
#[derive(Debug, Clone)]
pub enum PubSubEvent {
    /// A published message on a subscribed channel
    Message {
        /// Channel the message was published to
        channel: String,
        /// Message payload (binary-safe)
        payload: Bytes,
    },
    /// Confirmation that a channel subscription ended
    Unsubscribed {
        /// Channel that was unsubscribed
        channel: String,
        /// Number of remaining subscriptions on the connection
        remaining: i64,
    },
}

/// Callback registered for a channel
pub type SubscriberCallback = Box<dyn FnMut(PubSubEvent) + Send>;

/// Per-channel subscriber registrations for one connection.
///
/// A channel being unsubscribed keeps an empty entry until its
/// `"unsubscribe"` event arrives, so the event is still intercepted and the
/// response queue's FIFO pairing stays intact.
#[derive(Default)]
pub struct SubscriberRegistry {
    channels: HashMap<String, Vec<SubscriberCallback>>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for a channel, appended after any existing ones
    pub fn register(&mut self, channel: impl Into<String>, callback: SubscriberCallback) {
        self.channels.entry(channel.into()).or_default().push(callback);
    }

    /// Drop callbacks for one channel, or for all channels when `None`.
    /// Entries stay present (empty) until the unsubscribe event arrives.
    pub fn clear(&mut self, channel: Option<&str>) {
        match channel {
            Some(channel) => {
                if let Some(callbacks) = self.channels.get_mut(channel) {
                    callbacks.clear();
                }
            }
            None => {
                for callbacks in self.channels.values_mut() {
                    callbacks.clear();
                }
            }
        }
    }

    /// Whether any channel has a registration entry
    #[must_use]
    pub fn has_registrations(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Whether a channel currently has a registration entry
    #[must_use]
    pub fn is_registered(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Route a decoded reply. Returns `None` when the reply was consumed by
    /// a subscriber registration; otherwise hands the reply back for the
    /// response queue.
    pub fn route(&mut self, value: RespValue) -> Option<RespValue> {
        if self.channels.is_empty() {
            return Some(value);
        }
        let items = match &value {
            RespValue::Array(items) if items.len() >= 3 => items,
            _ => return Some(value),
        };
        let kind = match items[0].as_string() {
            Ok(kind) => kind,
            Err(_) => return Some(value),
        };

        match kind.as_str() {
            "message" => {
                let (Ok(channel), RespValue::BulkString(payload)) =
                    (items[1].as_string(), &items[2])
                else {
                    return Some(value);
                };
                let payload = payload.clone();
                if let Some(callbacks) = self.channels.get_mut(&channel) {
                    for callback in callbacks.iter_mut() {
                        callback(PubSubEvent::Message {
                            channel: channel.clone(),
                            payload: payload.clone(),
                        });
                    }
                } else {
                    debug!(channel, "dropping message for unregistered channel");
                }
                None
            }
            "unsubscribe" => {
                let (Ok(channel), RespValue::Integer(remaining)) =
                    (items[1].as_string(), &items[2])
                else {
                    return Some(value);
                };
                let remaining = *remaining;
                // The unsubscribe event ends the channel's registration.
                if let Some(mut callbacks) = self.channels.remove(&channel) {
                    for callback in callbacks.iter_mut() {
                        callback(PubSubEvent::Unsubscribed {
                            channel: channel.clone(),
                            remaining,
                        });
                    }
                }
                None
            }
            _ => Some(value),
        }
    }
}
