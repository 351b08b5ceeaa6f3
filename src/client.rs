//! High-level Redis client
//!
//! `Client` is the public entry point: it orchestrates the initial connect
//! (direct or via Sentinel discovery) and exposes the command surface. The
//! generated command methods live in `commands.rs`; everything funnels
//! through [`Client::execute`].

use crate::connection::{AddressSource, Connection, ConnectionState, EventHandlers};
use crate::core::{
    config::ConnectionOptions,
    error::RedisResult,
    value::{CommandArg, RedisValue},
};
use crate::pubsub::PubSubEvent;
use crate::sentinel::SentinelResolver;
use tracing::info;

/// A Redis client backed by a single automatically managed connection.
///
/// Cloning the client shares the connection. Commands issued before the
/// connection is ready are queued and flushed once the handshake completes,
/// so callers may start issuing commands immediately after `connect`.
#[derive(Clone)]
pub struct Client {
    connection: Connection,
}

impl Client {
    /// Connect with no lifecycle callbacks
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid. Transport failures
    /// are not errors here; they surface through the error callback and the
    /// reconnect machinery.
    pub async fn connect(options: ConnectionOptions) -> RedisResult<Self> {
        Self::connect_with(options, EventHandlers::new()).await
    }

    /// Connect with lifecycle callbacks. When sentinels are configured the
    /// master address is discovered before the first connect, and
    /// rediscovered on every reconnect cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub async fn connect_with(
        mut options: ConnectionOptions,
        handlers: EventHandlers,
    ) -> RedisResult<Self> {
        let source = if options.uses_sentinel() {
            let resolver = SentinelResolver::new(&options);
            let (host, port) = resolver.resolve().await;
            info!(%host, port, master_group = %options.master_group, "connecting to sentinel-resolved master");
            options.host = host;
            options.port = port;
            AddressSource::Sentinel(resolver)
        } else {
            AddressSource::Static
        };

        let connection = Connection::establish(options, handlers, source);
        Ok(Self { connection })
    }

    /// Send a command and await its reply
    ///
    /// # Errors
    ///
    /// Returns an error when the server rejects the command, the reply
    /// cannot be transformed, or the connection closes before the reply
    /// arrives.
    pub async fn execute(&self, command: &str, args: Vec<CommandArg>) -> RedisResult<RedisValue> {
        self.connection.call(command, args).await
    }

    /// Send a command without waiting for its reply. The reply still
    /// consumes its FIFO slot when it arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection has shut down.
    pub fn send(&self, command: &str, args: Vec<CommandArg>) -> RedisResult<()> {
        self.connection.send(command, args)
    }

    /// Subscribe to a channel, delivering its events to the callback. The
    /// subscribe confirmation is processed like any other reply; published
    /// messages are routed to the callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection has shut down.
    pub fn subscribe(
        &self,
        channel: impl Into<String>,
        callback: impl FnMut(PubSubEvent) + Send + 'static,
    ) -> RedisResult<()> {
        self.connection.subscribe(channel, Box::new(callback))
    }

    /// Unsubscribe from one channel, or from all channels when `None`.
    /// Registered callbacks stop receiving messages immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection has shut down.
    pub fn unsubscribe(&self, channel: Option<String>) -> RedisResult<()> {
        self.connection.unsubscribe(channel)
    }

    /// Flush pending writes and close the connection. Terminal; no
    /// reconnect follows.
    pub async fn close(&self) {
        self.connection.close().await;
    }

    /// Whether the connection is ready for commands
    #[must_use]
    pub fn connected(&self) -> bool {
        self.connection.connected()
    }

    /// Current connection lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }
}
