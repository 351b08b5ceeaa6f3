//! Async Redis client for monitoring control planes
//!
//! `redis-vigil` is the Redis layer of a monitoring system's control plane:
//! it keeps event state, check results, and transport channels in Redis and
//! must stay usable across Redis restarts and Sentinel-managed failovers.
//! The client pipelines commands over a single connection, pairs replies to
//! commands strictly in FIFO order, routes published messages to channel
//! subscribers, and reconnects on its own with a fixed delay.
//!
//! # Features
//!
//! - RESP codec with incremental decoding of partial replies
//! - FIFO command/reply pairing with per-command response transforms
//! - Channel subscriptions routed to callbacks on the same connection
//! - Handshake validation: AUTH, SELECT, and a server version gate
//! - Automatic reconnection, optionally also on command errors
//! - Master discovery through Redis Sentinel
//!
//! # Quick Start
//!
//! ```no_run
//! use redis_vigil::{Client, ConnectionOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConnectionOptions::new("127.0.0.1", 6379);
//!     let client = Client::connect(options).await?;
//!
//!     client.set("events", "{}").await?;
//!     let value = client.get("events").await?;
//!     println!("value: {value:?}");
//!
//!     Ok(())
//! }
//! ```

#![deny(warnings)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod commands;
pub mod connection;
pub mod core;
pub mod protocol;
pub mod pubsub;
pub mod queue;
pub mod sentinel;

pub use client::Client;
pub use connection::{Connection, ConnectionState, EventHandlers};
pub use pubsub::PubSubEvent;
pub use sentinel::SentinelResolver;

pub use crate::core::{
    config::{ConnectionOptions, SentinelEndpoint},
    error::{RedisError, RedisResult},
    value::{CommandArg, RedisValue, RespValue},
};
