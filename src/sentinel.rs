//! Master address discovery through Redis Sentinel
//!
//! The resolver keeps one always-reconnecting connection per configured
//! sentinel and asks a random connected peer for the current master address.
//! Resolution retries until a sentinel produces a valid address; peer
//! failures and per-query timeouts only delay the next attempt, they never
//! surface to the caller.

use crate::connection::{AddressSource, Connection, EventHandlers};
use crate::core::config::{ConnectionOptions, SentinelEndpoint};
use crate::core::value::{CommandArg, RedisValue};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

struct ResolverInner {
    peers: Vec<Connection>,
    master_group: String,
    retry_delay: Duration,
    resolve_timeout: Duration,
}

/// Resolves the current master address by querying Sentinel peers.
///
/// Cloning shares the same set of peer connections.
#[derive(Clone)]
pub struct SentinelResolver {
    inner: Arc<ResolverInner>,
}

impl SentinelResolver {
    /// Connect to every configured sentinel. Peer connections reconnect
    /// automatically and are shared across resolutions for the lifetime of
    /// the resolver.
    #[must_use]
    pub fn new(options: &ConnectionOptions) -> Self {
        let peers = options
            .sentinels
            .iter()
            .map(|endpoint| Self::connect_peer(endpoint, options))
            .collect();

        Self {
            inner: Arc::new(ResolverInner {
                peers,
                master_group: options.master_group.clone(),
                retry_delay: options.resolve_retry_delay,
                resolve_timeout: options.resolve_timeout,
            }),
        }
    }

    fn connect_peer(endpoint: &SentinelEndpoint, options: &ConnectionOptions) -> Connection {
        let peer_options = ConnectionOptions::new(&endpoint.host, endpoint.port)
            .with_auto_reconnect(true)
            .with_reconnect_on_error(true)
            .with_reconnect_delay(options.reconnect_delay);
        let peer_options = match &endpoint.password {
            Some(password) => peer_options.with_password(password.clone()),
            None => peer_options,
        };
        let host = endpoint.host.clone();
        let port = endpoint.port;
        let handlers = EventHandlers::new().on_error(move |error| {
            warn!(%host, port, %error, "sentinel peer error");
        });
        Connection::establish(peer_options, handlers, AddressSource::Static)
    }

    /// Ask Sentinel for the current master address, retrying until one is
    /// known. Each query is bounded by the resolve timeout; a timed-out
    /// query only delays the next attempt, the peer transport stays up.
    pub async fn resolve(&self) -> (String, u16) {
        loop {
            let Some(peer) = self.pick_peer() else {
                debug!("no connected sentinel peer, retrying");
                tokio::time::sleep(self.inner.retry_delay).await;
                continue;
            };

            let query = peer.call(
                "sentinel",
                vec![
                    CommandArg::from("get-master-addr-by-name"),
                    CommandArg::from(&self.inner.master_group),
                ],
            );

            match timeout(self.inner.resolve_timeout, query).await {
                Ok(Ok(reply)) => match parse_master_address(reply) {
                    Some((host, port)) => {
                        debug!(%host, port, master_group = %self.inner.master_group, "resolved redis master");
                        return (host, port);
                    }
                    None => {
                        warn!(
                            master_group = %self.inner.master_group,
                            "sentinel returned no master address, retrying"
                        );
                    }
                },
                Ok(Err(error)) => {
                    warn!(%error, "sentinel query failed, retrying");
                }
                Err(_) => {
                    warn!("sentinel query timed out, retrying");
                }
            }
            tokio::time::sleep(self.inner.retry_delay).await;
        }
    }

    /// Pick a random peer among those currently connected. The rng must not
    /// be held across an await.
    fn pick_peer(&self) -> Option<Connection> {
        let connected: Vec<&Connection> = self
            .inner
            .peers
            .iter()
            .filter(|peer| peer.connected())
            .collect();
        connected.choose(&mut rand::thread_rng()).map(|peer| (*peer).clone())
    }
}

/// Parse a `[host, port]` reply from `SENTINEL get-master-addr-by-name`.
/// Anything else means the sentinel does not currently know the master.
fn parse_master_address(reply: RedisValue) -> Option<(String, u16)> {
    let RedisValue::Array(items) = reply else {
        return None;
    };
    let [host, port] = items.as_slice() else {
        return None;
    };
    let host = host.as_string().ok()?;
    let port = port.as_string().ok()?.parse().ok()?;
    Some((host, port))
}
