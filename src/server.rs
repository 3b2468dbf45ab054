//! Cache server orchestration.
//!
//! Binds a server's listeners and runs them against one shared resolver.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::CacheConfig;
use crate::endpoint::{Endpoint, Transport};
use crate::error::{Error, Result};
use crate::resolver::Resolver;
use crate::transport::{tcp::TcpTransport, udp::UdpTransport};
use crate::upstream::UpstreamClient;

/// How often statistics are logged and expired entries purged.
pub const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// One cache instance: its listen endpoints, upstreams and record cache.
pub struct CacheServer {
    listen_addrs: Vec<String>,
    resolver: Arc<Resolver>,
}

impl CacheServer {
    /// Create a server from address strings.
    ///
    /// Upstreams that fail to parse are dropped with a warning. Listen
    /// addresses are only checked by [`CacheServer::start`].
    pub fn new<L, U>(listen_addrs: L, upstreams: U) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        U: IntoIterator,
        U::Item: AsRef<str>,
    {
        let upstreams = upstreams
            .into_iter()
            .filter_map(|upstream| {
                let upstream = upstream.as_ref();
                UpstreamClient::parse(upstream)
                    .inspect_err(|e| warn!(upstream, error = %e, "ignoring upstream"))
                    .ok()
            })
            .collect();

        Self::with_upstreams(listen_addrs, upstreams)
    }

    /// Create a server with already built upstream clients.
    pub fn with_upstreams<L>(listen_addrs: L, upstreams: Vec<UpstreamClient>) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Self {
            listen_addrs: listen_addrs.into_iter().map(Into::into).collect(),
            resolver: Arc::new(Resolver::new(upstreams)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.listen_addrs.iter().cloned(), &config.dns_servers)
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Bind every listener, then start serving.
    ///
    /// Nothing is served unless every listen address parses and binds.
    pub async fn start(&self) -> Result<ServerHandle> {
        let endpoints = self
            .listen_addrs
            .iter()
            .map(|addr| {
                Endpoint::parse(addr)
                    .inspect_err(|e| error!(address = %addr, error = %e, "invalid listen address"))
            })
            .collect::<Result<Vec<_>>>()?;

        if self.resolver.upstreams().is_empty() {
            warn!("cache server has no usable upstreams; uncached queries will go unanswered");
        }

        let mut bound = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            bound.push(bind(endpoint).await?);
        }

        let mut local_addrs = Vec::with_capacity(bound.len());
        let mut tasks = Vec::with_capacity(bound.len() + 1);
        for listener in bound {
            let (transport, addr, task) = match listener {
                Listener::Udp(udp) => {
                    let addr = udp.local_addr()?;
                    (Transport::Udp, addr, udp.start(self.resolver.clone()))
                }
                Listener::Tcp(tcp) => {
                    let addr = tcp.local_addr()?;
                    (Transport::Tcp, addr, tcp.start(self.resolver.clone()))
                }
            };
            info!(%transport, address = %addr, "DNS cache server listening");
            local_addrs.push((transport, addr));
            tasks.push(task);
        }

        let upstreams: Vec<_> = self
            .resolver
            .upstreams()
            .iter()
            .map(|u| u.endpoint().to_string())
            .collect();
        info!(upstreams = %upstreams.join(", "), "forwarding cache misses");

        tasks.push(tokio::spawn(report_stats(self.resolver.clone(), STATS_INTERVAL)));

        Ok(ServerHandle { local_addrs, tasks })
    }
}

enum Listener {
    Udp(UdpTransport),
    Tcp(TcpTransport),
}

async fn bind(endpoint: &Endpoint) -> Result<Listener> {
    let address = endpoint.address.as_str();
    let bound = match endpoint.transport {
        Transport::Udp => UdpTransport::bind(address).await.map(Listener::Udp),
        Transport::Tcp => TcpTransport::bind(address).await.map(Listener::Tcp),
    };

    bound.map_err(|source| {
        error!(%endpoint, error = %source, "failed to bind listener");
        Error::Bind {
            transport: endpoint.transport,
            address: endpoint.address.clone(),
            source,
        }
    })
}

/// Log statistics every `period` and purge expired cache entries.
async fn report_stats(resolver: Arc<Resolver>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip first immediate tick
    loop {
        interval.tick().await;
        let purged = resolver.cache().purge_expired();
        let stats = resolver.stats_snapshot_and_reset();
        info!(
            cache = resolver.cache_len(),
            purged,
            requests = stats.requests,
            cached = stats.cached,
            forwarded = stats.forwarded,
            failed = stats.failed,
            avg_response_ms = stats.avg_response_ms,
            "stats"
        );
    }
}

/// Handle to a started cache server.
///
/// Dropping the handle leaves the server running.
pub struct ServerHandle {
    local_addrs: Vec<(Transport, SocketAddr)>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Bound listener addresses, in configuration order.
    pub fn local_addrs(&self) -> &[(Transport, SocketAddr)] {
        &self.local_addrs
    }

    /// First bound address of the given transport.
    pub fn local_addr(&self, transport: Transport) -> Option<SocketAddr> {
        self.local_addrs
            .iter()
            .find(|(t, _)| *t == transport)
            .map(|(_, addr)| *addr)
    }

    /// Stop accepting queries. In-flight queries are abandoned.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}
