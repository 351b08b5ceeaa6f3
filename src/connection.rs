//! Connection lifecycle and the per-connection actor
//!
//! Each logical connection is driven by one spawned task that owns the
//! transport, the read buffer, the response queue, and the subscriber
//! registry. The public [`Connection`] handle talks to the task over a
//! channel, so reply dispatch order is exactly network-arrival order and
//! command-to-reply pairing stays FIFO without any shared mutable state.
//!
//! The handshake validates a freshly connected transport before commands
//! flow: authenticate when a password is configured, select the configured
//! database, then verify the server version against the minimum baseline.
//! Unexpected closes recycle the connection with a fixed backoff delay;
//! an explicit close is terminal.

use crate::commands::response_transform;
use crate::core::{
    config::ConnectionOptions,
    error::{RedisError, RedisResult},
    value::{CommandArg, RedisValue, RespValue},
};
use crate::protocol::{RespDecoder, RespEncoder};
use crate::pubsub::{SubscriberCallback, SubscriberRegistry};
use crate::queue::{PendingCommand, ResponseQueue, Transform};
use crate::sentinel::SentinelResolver;
use bytes::BytesMut;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Minimum supported server version (2.0 RC 1 reports itself as 1.3.14)
const MIN_SERVER_VERSION: [u32; 3] = [1, 3, 14];

/// Connection lifecycle state; exactly one is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No transport
    Disconnected = 0,
    /// Transport connect in flight
    Connecting = 1,
    /// AUTH issued, awaiting confirmation
    Authenticating = 2,
    /// SELECT issued, awaiting confirmation
    SelectingDb = 3,
    /// INFO issued, awaiting the version gate
    VerifyingVersion = 4,
    /// Handshake complete, commands flow
    Ready = 5,
    /// Explicit close in progress
    Closing = 6,
    /// Awaiting the backoff delay before the next connect attempt
    Reconnecting = 7,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Authenticating,
            3 => Self::SelectingDb,
            4 => Self::VerifyingVersion,
            5 => Self::Ready,
            6 => Self::Closing,
            7 => Self::Reconnecting,
            _ => Self::Disconnected,
        }
    }
}

/// Lifecycle callback slots, fixed at construction
#[derive(Default)]
pub struct EventHandlers {
    pub(crate) on_error: Option<Box<dyn FnMut(RedisError) + Send>>,
    pub(crate) before_reconnect: Option<Box<dyn FnMut() + Send>>,
    pub(crate) after_reconnect: Option<Box<dyn FnMut() + Send>>,
}

impl EventHandlers {
    /// Create an empty set of handlers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every connection, protocol, and command error
    #[must_use]
    pub fn on_error(mut self, callback: impl FnMut(RedisError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Called once per reconnect cycle, after the connection closes but
    /// before a reconnect is attempted
    #[must_use]
    pub fn before_reconnect(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.before_reconnect = Some(Box::new(callback));
        self
    }

    /// Called once after a successful reconnect, once the handshake has
    /// validated the new transport
    #[must_use]
    pub fn after_reconnect(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.after_reconnect = Some(Box::new(callback));
        self
    }
}

/// Where reconnects obtain the address to dial
pub(crate) enum AddressSource {
    /// Always the originally configured host and port
    Static,
    /// Ask Sentinel for the current master before every connect cycle
    Sentinel(SentinelResolver),
}

enum Request {
    Command {
        command: String,
        args: Vec<CommandArg>,
        transform: Option<Transform>,
        completion: Option<oneshot::Sender<RedisResult<RedisValue>>>,
    },
    Subscribe {
        channel: String,
        callback: SubscriberCallback,
    },
    Unsubscribe {
        channel: Option<String>,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

/// Handle to one logical Redis connection.
///
/// Cloning the handle shares the same underlying connection.
#[derive(Clone)]
pub struct Connection {
    tx: mpsc::UnboundedSender<Request>,
    state: Arc<AtomicU8>,
}

impl Connection {
    /// Spawn the connection actor and begin connecting immediately.
    pub(crate) fn establish(
        options: ConnectionOptions,
        handlers: EventHandlers,
        source: AddressSource,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting as u8));

        let actor = ConnectionActor {
            host: options.host.clone(),
            port: options.port,
            options,
            source,
            handlers,
            rx,
            state: Arc::clone(&state),
            queue: ResponseQueue::new(),
            registry: SubscriberRegistry::new(),
            buffer: BytesMut::with_capacity(8192),
            deferred: VecDeque::new(),
            reconnecting: false,
            closing: false,
        };
        tokio::spawn(actor.run());

        Self { tx, state }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the connection is ready for commands
    #[must_use]
    pub fn connected(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Send a command and await its reply. The response transform is
    /// selected from the command table at send time. Commands issued before
    /// the connection is ready are flushed on the ready transition.
    pub async fn call(&self, command: &str, args: Vec<CommandArg>) -> RedisResult<RedisValue> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Request::Command {
                command: command.to_string(),
                args,
                transform: response_transform(command),
                completion: Some(tx),
            })
            .map_err(|_| RedisError::Connection("connection closed".to_string()))?;
        rx.await
            .map_err(|_| RedisError::Connection("connection closed".to_string()))?
    }

    /// Send a command without waiting for its reply. The command still
    /// consumes its FIFO reply slot.
    pub fn send(&self, command: &str, args: Vec<CommandArg>) -> RedisResult<()> {
        self.tx
            .send(Request::Command {
                command: command.to_string(),
                args,
                transform: response_transform(command),
                completion: None,
            })
            .map_err(|_| RedisError::Connection("connection closed".to_string()))
    }

    /// Register a subscriber callback and issue SUBSCRIBE for the channel
    pub fn subscribe(&self, channel: impl Into<String>, callback: SubscriberCallback) -> RedisResult<()> {
        self.tx
            .send(Request::Subscribe {
                channel: channel.into(),
                callback,
            })
            .map_err(|_| RedisError::Connection("connection closed".to_string()))
    }

    /// Unsubscribe from one channel, or from all channels when `None`
    pub fn unsubscribe(&self, channel: Option<String>) -> RedisResult<()> {
        self.tx
            .send(Request::Unsubscribe { channel })
            .map_err(|_| RedisError::Connection("connection closed".to_string()))
    }

    /// Flush pending writes and close the connection. Closing suppresses
    /// auto-reconnect and is terminal.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Request::Close { done: tx }).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Outcome of one connect-to-disconnect cycle
enum Cycle {
    Reconnect,
    Shutdown,
}

enum HandshakeError {
    /// The dial or the transport failed mid-handshake
    Transport(RedisError),
    /// The server rejected the handshake (auth, select, version gate)
    Fatal(RedisError),
}

fn transport_error(message: String) -> HandshakeError {
    HandshakeError::Transport(RedisError::Connection(message))
}

/// How the dial-and-handshake phase ended
enum SetupOutcome {
    Connected(TcpStream),
    Failed(HandshakeError),
    /// Close requested (or every handle dropped) while setting up
    Closed(Option<oneshot::Sender<()>>),
}

struct ConnectionActor {
    options: ConnectionOptions,
    source: AddressSource,
    handlers: EventHandlers,
    rx: mpsc::UnboundedReceiver<Request>,
    state: Arc<AtomicU8>,
    queue: ResponseQueue,
    registry: SubscriberRegistry,
    buffer: BytesMut,
    /// Requests stashed while not ready, drained on the ready transition
    deferred: VecDeque<Request>,
    reconnecting: bool,
    closing: bool,
    /// Current target address; sentinel reconnects may replace it
    host: String,
    port: u16,
}

impl ConnectionActor {
    async fn run(mut self) {
        loop {
            match self.run_cycle().await {
                Cycle::Reconnect => {}
                Cycle::Shutdown => break,
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn run_cycle(&mut self) -> Cycle {
        if self.reconnecting {
            self.set_state(ConnectionState::Reconnecting);
            if !self.backoff().await {
                return Cycle::Shutdown;
            }
            let (host, port) = match &self.source {
                AddressSource::Static => (self.host.clone(), self.port),
                AddressSource::Sentinel(resolver) => resolver.resolve().await,
            };
            self.host = host;
            self.port = port;
        }

        self.set_state(ConnectionState::Connecting);
        self.queue = ResponseQueue::new();
        self.buffer.clear();

        // Dial and handshake while still servicing the request channel:
        // close() must interrupt a peer that accepts the connection but
        // stalls the handshake. Other requests defer until ready.
        let outcome = {
            let setup = Self::establish(
                &self.options,
                &self.state,
                &mut self.buffer,
                &self.host,
                self.port,
            );
            tokio::pin!(setup);
            loop {
                tokio::select! {
                    result = &mut setup => break match result {
                        Ok(stream) => SetupOutcome::Connected(stream),
                        Err(err) => SetupOutcome::Failed(err),
                    },
                    request = self.rx.recv() => match request {
                        Some(Request::Close { done }) => break SetupOutcome::Closed(Some(done)),
                        Some(request) => self.deferred.push_back(request),
                        None => break SetupOutcome::Closed(None),
                    }
                }
            }
        };

        let mut stream = match outcome {
            SetupOutcome::Connected(stream) => stream,
            SetupOutcome::Closed(done) => {
                self.closing = true;
                self.set_state(ConnectionState::Closing);
                if let Some(done) = done {
                    let _ = done.send(());
                }
                return Cycle::Shutdown;
            }
            SetupOutcome::Failed(HandshakeError::Transport(err)) => {
                warn!(host = %self.host, port = self.port, error = %err, "redis connect failed");
                return self.on_disconnect(false, false);
            }
            SetupOutcome::Failed(HandshakeError::Fatal(err)) => {
                self.report_error(err);
                return if self.options.reconnect_on_error {
                    self.begin_reconnect()
                } else {
                    Cycle::Shutdown
                };
            }
        };

        let was_reconnecting = self.reconnecting;
        self.reconnecting = false;
        self.set_state(ConnectionState::Ready);
        info!(host = %self.host, port = self.port, "redis connection ready");
        if was_reconnecting {
            if let Some(callback) = &mut self.handlers.after_reconnect {
                callback();
            }
        }

        // Flush requests that arrived while the connection was not ready,
        // in their original order, exactly once per cycle.
        while let Some(request) = self.deferred.pop_front() {
            if let Some(cycle) = self.handle_request(request, &mut stream).await {
                return cycle;
            }
        }

        self.ready_loop(&mut stream).await
    }

    async fn ready_loop(&mut self, stream: &mut TcpStream) -> Cycle {
        loop {
            tokio::select! {
                request = self.rx.recv() => {
                    match request {
                        Some(request) => {
                            if let Some(cycle) = self.handle_request(request, stream).await {
                                return cycle;
                            }
                        }
                        None => {
                            // Every handle dropped; nothing can observe this
                            // connection any more.
                            self.closing = true;
                            let _ = stream.shutdown().await;
                            return Cycle::Shutdown;
                        }
                    }
                }
                read = stream.read_buf(&mut self.buffer) => {
                    match read {
                        Ok(0) => {
                            debug!("redis connection closed by peer");
                            return self.on_disconnect(true, false);
                        }
                        Ok(_) => {
                            if let Some(cycle) = self.process_buffer() {
                                let _ = stream.shutdown().await;
                                return cycle;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "redis read failed");
                            return self.on_disconnect(true, false);
                        }
                    }
                }
            }
        }
    }

    /// Handle one request from the channel. Returns the cycle outcome when
    /// the request ends this connection cycle.
    async fn handle_request(&mut self, request: Request, stream: &mut TcpStream) -> Option<Cycle> {
        match request {
            Request::Command {
                command,
                args,
                transform,
                completion,
            } => {
                let frame = RespEncoder::encode_command(&command, &args);
                self.queue.push(PendingCommand {
                    transform,
                    completion,
                });
                if let Err(err) = stream.write_all(&frame).await {
                    warn!(error = %err, "redis write failed");
                    return Some(self.on_disconnect(true, false));
                }
                None
            }
            Request::Subscribe { channel, callback } => {
                self.registry.register(channel.clone(), callback);
                let frame =
                    RespEncoder::encode_command("subscribe", &[CommandArg::from(&channel)]);
                // The subscribe confirmation flows through the normal
                // response queue; only message/unsubscribe replies are
                // intercepted by the registry.
                self.queue.push(PendingCommand {
                    transform: None,
                    completion: None,
                });
                if let Err(err) = stream.write_all(&frame).await {
                    warn!(error = %err, "redis write failed");
                    return Some(self.on_disconnect(true, false));
                }
                None
            }
            Request::Unsubscribe { channel } => {
                // While registrations exist the unsubscribe reply is
                // intercepted by the registry, so it must not occupy a
                // queue slot; otherwise it pairs like a normal reply.
                let intercepted = self.registry.has_registrations();
                self.registry.clear(channel.as_deref());
                let args = match &channel {
                    Some(channel) => vec![CommandArg::from(channel)],
                    None => Vec::new(),
                };
                let frame = RespEncoder::encode_command("unsubscribe", &args);
                if !intercepted {
                    self.queue.push(PendingCommand {
                        transform: None,
                        completion: None,
                    });
                }
                if let Err(err) = stream.write_all(&frame).await {
                    warn!(error = %err, "redis write failed");
                    return Some(self.on_disconnect(true, false));
                }
                None
            }
            Request::Close { done } => {
                self.closing = true;
                self.set_state(ConnectionState::Closing);
                // Per-command writes are already flushed; shut the socket
                // down cleanly.
                let _ = stream.shutdown().await;
                let _ = done.send(());
                Some(Cycle::Shutdown)
            }
        }
    }

    /// Decode and dispatch every complete reply in the buffer. Returns the
    /// cycle outcome when an error requires recycling the connection.
    fn process_buffer(&mut self) -> Option<Cycle> {
        loop {
            match RespDecoder::decode_next(&mut self.buffer) {
                Ok(Some(RespValue::Error(code))) => {
                    // A server error drops only the one pending command
                    // whose turn it was.
                    self.queue.fail_front(RedisError::Command(code.clone()));
                    self.report_error(RedisError::Command(code));
                    if self.options.reconnect_on_error {
                        return Some(self.on_disconnect(true, true));
                    }
                }
                Ok(Some(value)) => {
                    if let Some(value) = self.registry.route(value) {
                        self.queue.complete(value);
                    }
                }
                Ok(None) => return None,
                Err(err) => {
                    // Unrecognized reply bytes; the stream can no longer be
                    // trusted.
                    self.report_error(err);
                    return Some(self.on_disconnect(true, true));
                }
            }
        }
    }

    /// Decide what happens after the transport is gone, mirroring the
    /// lifecycle policy: closing wins, then reconnect per configuration,
    /// otherwise the failure surfaces and the connection is done.
    /// `reported` suppresses the generic error when a more specific one was
    /// already delivered.
    fn on_disconnect(&mut self, was_connected: bool, reported: bool) -> Cycle {
        self.set_state(ConnectionState::Disconnected);
        self.queue
            .fail_all(&RedisError::Connection("connection closed".to_string()));

        if self.closing {
            return Cycle::Shutdown;
        }
        if ((was_connected || self.reconnecting) && self.options.auto_reconnect)
            || self.options.reconnect_on_error
        {
            return self.begin_reconnect();
        }
        if !reported {
            let message = if was_connected {
                "connection closed"
            } else {
                "unable to connect to redis server"
            };
            self.report_error(RedisError::Connection(message.to_string()));
        }
        Cycle::Shutdown
    }

    fn begin_reconnect(&mut self) -> Cycle {
        if !self.reconnecting {
            if let Some(callback) = &mut self.handlers.before_reconnect {
                callback();
            }
            self.reconnecting = true;
        }
        Cycle::Reconnect
    }

    /// Wait out the reconnect delay while still reacting to close requests.
    /// Command requests arriving meanwhile are deferred until ready.
    /// Returns false when the connection was closed during the wait.
    async fn backoff(&mut self) -> bool {
        let sleep = tokio::time::sleep(self.options.reconnect_delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                request = self.rx.recv() => match request {
                    Some(Request::Close { done }) => {
                        self.closing = true;
                        let _ = done.send(());
                        return false;
                    }
                    Some(request) => self.deferred.push_back(request),
                    None => {
                        self.closing = true;
                        return false;
                    }
                }
            }
        }
    }

    /// Dial the transport and validate it with the handshake. Borrows only
    /// the read buffer and the shared state word, so the caller can race it
    /// against the request channel.
    async fn establish(
        options: &ConnectionOptions,
        state: &AtomicU8,
        buffer: &mut BytesMut,
        host: &str,
        port: u16,
    ) -> Result<TcpStream, HandshakeError> {
        // Resolve up front so a hostname that stops resolving surfaces as a
        // connection failure instead of hanging the dial.
        let addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(|err| transport_error(format!("unable to resolve hostname {host}: {err}")))?
            .next()
            .ok_or_else(|| transport_error(format!("unable to resolve hostname {host}")))?;

        debug!(%addr, "connecting to redis");
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|err| transport_error(format!("unable to connect to {addr}: {err}")))?;
        Self::handshake(options, state, buffer, &mut stream).await?;
        Ok(stream)
    }

    /// Validate a fresh transport: authenticate, select the database, and
    /// verify the server version, in that order.
    async fn handshake(
        options: &ConnectionOptions,
        state: &AtomicU8,
        buffer: &mut BytesMut,
        stream: &mut TcpStream,
    ) -> Result<(), HandshakeError> {
        store_state(state, ConnectionState::Authenticating);
        if let Some(password) = &options.password {
            let reply = Self::roundtrip(buffer, stream, "auth", &[CommandArg::from(password)])
                .await?;
            match reply {
                RespValue::SimpleString(ref s) if s == "OK" => {}
                _ => {
                    return Err(HandshakeError::Fatal(RedisError::Connection(
                        "redis authenticate failed".to_string(),
                    )))
                }
            }
        }

        store_state(state, ConnectionState::SelectingDb);
        if let Some(db) = options.db {
            let reply = Self::roundtrip(buffer, stream, "select", &[CommandArg::from(db)])
                .await?;
            if reply.is_error() {
                return Err(HandshakeError::Fatal(RedisError::Connection(format!(
                    "redis select failed for db {db}"
                ))));
            }
        }

        store_state(state, ConnectionState::VerifyingVersion);
        let reply = Self::roundtrip(buffer, stream, "info", &[]).await?;
        // An error reply here is the server's own failure, not a version
        // problem; surface its message untouched.
        if let RespValue::Error(code) = reply {
            return Err(HandshakeError::Fatal(RedisError::Command(code)));
        }
        let version = reply
            .as_string()
            .ok()
            .as_deref()
            .and_then(parse_server_version);
        match version {
            Some(version) if version >= MIN_SERVER_VERSION => Ok(()),
            _ => Err(HandshakeError::Fatal(RedisError::Connection(
                "redis version must be >= 2.0 RC 1".to_string(),
            ))),
        }
    }

    /// Send one handshake command and read its reply. No application
    /// commands are in flight before ready, so replies pair trivially.
    async fn roundtrip(
        buffer: &mut BytesMut,
        stream: &mut TcpStream,
        command: &str,
        args: &[CommandArg],
    ) -> Result<RespValue, HandshakeError> {
        let frame = RespEncoder::encode_command(command, args);
        stream
            .write_all(&frame)
            .await
            .map_err(|err| HandshakeError::Transport(err.into()))?;

        loop {
            match RespDecoder::decode_next(buffer) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) => return Err(HandshakeError::Fatal(err)),
            }
            let read = stream
                .read_buf(buffer)
                .await
                .map_err(|err| HandshakeError::Transport(err.into()))?;
            if read == 0 {
                return Err(HandshakeError::Transport(RedisError::Connection(
                    "connection closed".to_string(),
                )));
            }
        }
    }

    fn report_error(&mut self, error: RedisError) {
        match &mut self.handlers.on_error {
            Some(callback) => callback(error),
            // Never swallow a failure: without a handler it still reaches
            // the log and the affected caller's result.
            None => error!(%error, "redis client error (no error handler registered)"),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        store_state(&self.state, state);
    }
}

fn store_state(state: &AtomicU8, value: ConnectionState) {
    state.store(value as u8, Ordering::Release);
}

/// Extract `redis_version` from an INFO reply and parse it into a
/// major/minor/patch triple. Trailing non-numeric fragments (`-rc1`) are
/// ignored.
fn parse_server_version(info: &str) -> Option<[u32; 3]> {
    let line = info
        .lines()
        .map(str::trim_end)
        .find_map(|line| line.strip_prefix("redis_version:"))?;

    let mut parts = [0u32; 3];
    for (slot, part) in parts.iter_mut().zip(line.split('.')) {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        *slot = digits.parse().ok()?;
    }
    Some(parts)
}
