//! Configuration types for Redis connections

use crate::core::error::{RedisError, RedisResult};
use std::time::Duration;

/// Default Redis server port
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Default Redis Sentinel port
pub const DEFAULT_SENTINEL_PORT: u16 = 26379;

/// Default Sentinel master group name
pub const DEFAULT_MASTER_GROUP: &str = "mymaster";

/// A configured Sentinel peer address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelEndpoint {
    /// Sentinel host
    pub host: String,
    /// Sentinel port
    pub port: u16,
    /// Optional password for the sentinel connection
    pub password: Option<String>,
}

impl SentinelEndpoint {
    /// Create a new sentinel endpoint
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
        }
    }

    /// Parse an endpoint from a `redis://[:password@]host[:port]` URL or a
    /// bare `host[:port]` string. The port defaults to 26379.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse(url: &str) -> RedisResult<Self> {
        let (host, port, password) = parse_redis_url(url, DEFAULT_SENTINEL_PORT)?;
        Ok(Self {
            host,
            port,
            password,
        })
    }

    /// The `host:port` address string
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a `redis://[:password@]host[:port]` URL or a bare `host[:port]`
/// string into its parts, defaulting the port when absent.
fn parse_redis_url(
    url: &str,
    default_port: u16,
) -> RedisResult<(String, u16, Option<String>)> {
    let rest = url
        .trim()
        .strip_prefix("redis://")
        .unwrap_or_else(|| url.trim());
    if rest.is_empty() {
        return Err(RedisError::Config(format!("invalid redis url: {url}")));
    }

    let (password, addr) = match rest.rsplit_once('@') {
        Some((userinfo, addr)) => {
            // Userinfo is `[user]:password`; only the password is used.
            let password = userinfo
                .split_once(':')
                .map_or(userinfo, |(_, password)| password);
            (Some(password.to_string()), addr)
        }
        None => (None, rest),
    };

    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str
                .parse::<u16>()
                .map_err(|_| RedisError::Config(format!("invalid port in redis url: {url}")))?;
            (host, port)
        }
        None => (addr, default_port),
    };
    if host.is_empty() {
        return Err(RedisError::Config(format!("invalid redis url: {url}")));
    }

    Ok((host.to_string(), port, password))
}

/// Configuration for a Redis connection.
///
/// Options are fixed at construction, except host and port which a
/// sentinel-driven reconnection may replace with a freshly resolved master
/// address.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Redis host
    pub host: String,
    /// Redis port
    pub port: u16,
    /// Database index selected during the handshake, if any
    pub db: Option<u32>,
    /// Password used to authenticate during the handshake, if any
    pub password: Option<String>,
    /// Reconnect automatically after an unexpected close
    pub auto_reconnect: bool,
    /// Recycle the whole connection when a command or protocol error occurs
    pub reconnect_on_error: bool,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// Sentinel peers; non-empty switches connect to sentinel discovery
    pub sentinels: Vec<SentinelEndpoint>,
    /// Sentinel master group name
    pub master_group: String,
    /// Fixed delay between sentinel resolve attempts
    pub resolve_retry_delay: Duration,
    /// Window after which a single sentinel resolve attempt is abandoned
    pub resolve_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_REDIS_PORT,
            db: None,
            password: None,
            auto_reconnect: true,
            reconnect_on_error: true,
            reconnect_delay: Duration::from_secs(1),
            sentinels: Vec::new(),
            master_group: DEFAULT_MASTER_GROUP.to_string(),
            resolve_retry_delay: Duration::from_secs(1),
            resolve_timeout: Duration::from_secs(60),
        }
    }
}

impl ConnectionOptions {
    /// Create options for the given host and port
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Parse options from a `redis://[:password@]host[:port]` URL
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn from_url(url: &str) -> RedisResult<Self> {
        let (host, port, password) = parse_redis_url(url, DEFAULT_REDIS_PORT)?;
        Ok(Self {
            host,
            port,
            password,
            ..Default::default()
        })
    }

    /// Set the database index
    #[must_use]
    pub const fn with_db(mut self, db: u32) -> Self {
        self.db = Some(db);
        self
    }

    /// Set the password
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Enable or disable automatic reconnection
    #[must_use]
    pub const fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Enable or disable reconnection on command and protocol errors
    #[must_use]
    pub const fn with_reconnect_on_error(mut self, enabled: bool) -> Self {
        self.reconnect_on_error = enabled;
        self
    }

    /// Set the fixed reconnect delay
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Add a sentinel peer
    #[must_use]
    pub fn add_sentinel(mut self, endpoint: SentinelEndpoint) -> Self {
        self.sentinels.push(endpoint);
        self
    }

    /// Add sentinel peers from a comma-separated list of
    /// `redis://[:password@]host:port` URLs
    ///
    /// # Errors
    ///
    /// Returns an error if any URL cannot be parsed.
    pub fn with_sentinel_urls(mut self, urls: &str) -> RedisResult<Self> {
        for url in urls.split(',') {
            let url = url.trim();
            if url.is_empty() {
                continue;
            }
            self.sentinels.push(SentinelEndpoint::parse(url)?);
        }
        Ok(self)
    }

    /// Set the sentinel master group name
    #[must_use]
    pub fn with_master_group(mut self, name: impl Into<String>) -> Self {
        self.master_group = name.into();
        self
    }

    /// Set the fixed sentinel resolve retry delay
    #[must_use]
    pub const fn with_resolve_retry_delay(mut self, delay: Duration) -> Self {
        self.resolve_retry_delay = delay;
        self
    }

    /// Set the sentinel resolve attempt timeout
    #[must_use]
    pub const fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Whether sentinel discovery should be used instead of a direct connect
    #[must_use]
    pub fn uses_sentinel(&self) -> bool {
        !self.sentinels.is_empty()
    }
}
