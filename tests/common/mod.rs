//! In-process mock Redis and Sentinel servers for integration tests
//!
//! The mock accepts successive connections, auto-answers the handshake
//! commands (AUTH, SELECT, INFO) and subscription commands, and serves
//! scripted replies for everything else. Tests can also inject raw bytes
//! into the live connection or drop it to exercise reconnection.

#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use redis_vigil::protocol::RespDecoder;
use redis_vigil::RespValue;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Behavior knobs for a mock server instance
pub struct ServerConfig {
    /// Expected AUTH password; `None` accepts no AUTH (replies with an error)
    pub password: Option<String>,
    /// Version reported in the INFO reply
    pub redis_version: String,
    /// Reply to INFO with this error instead of the version text
    pub info_error: Option<String>,
    /// Accept connections and read commands but never reply
    pub stall_handshake: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            password: None,
            redis_version: "7.2.4".to_string(),
            info_error: None,
            stall_handshake: false,
        }
    }
}

enum ConnAction {
    Send(Bytes),
    Close,
}

struct Inner {
    config: ServerConfig,
    commands: Mutex<Vec<Vec<String>>>,
    /// Scripted replies for non-auto commands; `None` stays silent
    replies: Mutex<VecDeque<Option<Bytes>>>,
    /// Channels subscribed on the live connection
    subscribed: Mutex<Vec<String>>,
    /// Control channel of the most recently accepted connection
    conn: Mutex<Option<mpsc::UnboundedSender<ConnAction>>>,
    connections: AtomicUsize,
}

pub struct MockServer {
    addr: SocketAddr,
    inner: Arc<Inner>,
}

impl MockServer {
    pub async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let inner = Arc::new(Inner {
            config,
            commands: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            subscribed: Mutex::new(Vec::new()),
            conn: Mutex::new(None),
            connections: AtomicUsize::new(0),
        });

        let accept_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                accept_inner.connections.fetch_add(1, Ordering::SeqCst);
                let (tx, rx) = mpsc::unbounded_channel();
                *accept_inner.conn.lock().unwrap() = Some(tx);
                tokio::spawn(handle_connection(
                    socket,
                    Arc::clone(&accept_inner),
                    rx,
                ));
            }
        });

        Self { addr, inner }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Commands received so far, each as its argument strings
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.inner.commands.lock().unwrap().clone()
    }

    pub fn received(&self, command: &str) -> bool {
        self.commands().iter().any(|parts| {
            parts.first().map(String::as_str) == Some(command)
        })
    }

    /// Script the reply for the next non-auto command
    pub fn push_reply(&self, reply: Bytes) {
        self.inner.replies.lock().unwrap().push_back(Some(reply));
    }

    /// Script silence for the next non-auto command; the test sends the
    /// reply bytes later with `send_raw`
    pub fn push_silence(&self) {
        self.inner.replies.lock().unwrap().push_back(None);
    }

    /// Write raw bytes on the live connection
    pub fn send_raw(&self, bytes: impl Into<Bytes>) {
        if let Some(tx) = self.inner.conn.lock().unwrap().as_ref() {
            let _ = tx.send(ConnAction::Send(bytes.into()));
        }
    }

    /// Drop the live connection, as a crashed or restarted server would
    pub fn drop_connection(&self) {
        if let Some(tx) = self.inner.conn.lock().unwrap().as_ref() {
            let _ = tx.send(ConnAction::Close);
        }
    }

    /// Number of connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    inner: Arc<Inner>,
    mut rx: mpsc::UnboundedReceiver<ConnAction>,
) {
    let mut buf = BytesMut::new();
    loop {
        tokio::select! {
            action = rx.recv() => match action {
                Some(ConnAction::Send(bytes)) => {
                    if socket.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
                Some(ConnAction::Close) | None => return,
            },
            read = socket.read_buf(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                loop {
                    match RespDecoder::decode_next(&mut buf) {
                        Ok(Some(value)) => {
                            if let Some(reply) = reply_for(&inner, value) {
                                if socket.write_all(&reply).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(_) => return,
                    }
                }
            }
        }
    }
}

fn reply_for(inner: &Inner, value: RespValue) -> Option<Bytes> {
    let RespValue::Array(items) = value else {
        return Some(error_reply("ERR protocol"));
    };
    let parts: Vec<String> = items
        .iter()
        .map(|item| item.as_string().unwrap_or_default())
        .collect();
    inner.commands.lock().unwrap().push(parts.clone());

    if inner.config.stall_handshake {
        return None;
    }

    let command = parts.first().map(String::as_str).unwrap_or_default();
    match command {
        "auth" => {
            let ok = inner.config.password.as_deref() == parts.get(1).map(String::as_str);
            if ok {
                Some(simple_reply("OK"))
            } else {
                Some(error_reply("ERR invalid password"))
            }
        }
        "select" => Some(simple_reply("OK")),
        "info" => match &inner.config.info_error {
            Some(message) => Some(error_reply(message)),
            None => Some(bulk_reply(&format!(
                "# Server\r\nredis_version:{}\r\n",
                inner.config.redis_version
            ))),
        },
        "subscribe" => {
            let channel = parts.get(1).cloned().unwrap_or_default();
            let mut subscribed = inner.subscribed.lock().unwrap();
            subscribed.push(channel.clone());
            let count = subscribed.len() as i64;
            Some(pubsub_reply("subscribe", &channel, count))
        }
        "unsubscribe" => {
            let mut subscribed = inner.subscribed.lock().unwrap();
            match parts.get(1) {
                Some(channel) => {
                    subscribed.retain(|c| c != channel);
                    Some(pubsub_reply("unsubscribe", channel, subscribed.len() as i64))
                }
                None => {
                    // One confirmation frame per subscribed channel, with a
                    // decreasing remaining count, like the real server.
                    let channels: Vec<String> = subscribed.drain(..).collect();
                    let mut out = BytesMut::new();
                    for (i, channel) in channels.iter().enumerate() {
                        let remaining = (channels.len() - i - 1) as i64;
                        out.extend_from_slice(&pubsub_reply("unsubscribe", channel, remaining));
                    }
                    Some(out.freeze())
                }
            }
        }
        _ => match inner.replies.lock().unwrap().pop_front() {
            Some(scripted) => scripted,
            None => Some(simple_reply("OK")),
        },
    }
}

pub fn simple_reply(s: &str) -> Bytes {
    Bytes::from(format!("+{s}\r\n"))
}

pub fn error_reply(s: &str) -> Bytes {
    Bytes::from(format!("-{s}\r\n"))
}

pub fn bulk_reply(s: &str) -> Bytes {
    Bytes::from(format!("${}\r\n{s}\r\n", s.len()))
}

pub fn integer_reply(i: i64) -> Bytes {
    Bytes::from(format!(":{i}\r\n"))
}

pub fn nil_array_reply() -> Bytes {
    Bytes::from_static(b"*-1\r\n")
}

pub fn array_reply(items: &[&str]) -> Bytes {
    let mut out = format!("*{}\r\n", items.len());
    for item in items {
        out.push_str(&format!("${}\r\n{item}\r\n", item.len()));
    }
    Bytes::from(out)
}

/// A `message` or `unsubscribe` style pubsub frame
pub fn pubsub_reply(kind: &str, channel: &str, count: i64) -> Bytes {
    let mut out = String::from("*3\r\n");
    out.push_str(&format!("${}\r\n{kind}\r\n", kind.len()));
    out.push_str(&format!("${}\r\n{channel}\r\n", channel.len()));
    out.push_str(&format!(":{count}\r\n"));
    Bytes::from(out)
}

/// A published message frame for a channel
pub fn message_frame(channel: &str, payload: &str) -> Bytes {
    let mut out = String::from("*3\r\n");
    out.push_str("$7\r\nmessage\r\n");
    out.push_str(&format!("${}\r\n{channel}\r\n", channel.len()));
    out.push_str(&format!("${}\r\n{payload}\r\n", payload.len()));
    Bytes::from(out)
}

/// Install the tracing subscriber once for the test binary; `RUST_LOG`
/// controls verbosity when debugging a failing test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll a condition until it holds or a generous deadline passes
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// A port with nothing listening on it
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
