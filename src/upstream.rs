//! Upstream resolver client.
//!
//! One client per configured upstream. A client performs a single exchange
//! per call and never retries; failover belongs to the resolver.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket};

use crate::dns::{self, MalformedMessage, Reply};
use crate::endpoint::{Endpoint, Transport};
use crate::error::{Error, Result};
use crate::transport::MAX_DNS_PACKET_SIZE;
use crate::transport::tcp::{read_dns_message, write_dns_message};

/// Deadline of a whole exchange, matching the usual DNS client default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for one upstream resolver.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    endpoint: Endpoint,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build a client from an address string like `tcp:8.8.8.8:53`.
    pub fn parse(upstream: &str) -> Result<Self> {
        Endpoint::parse(upstream).map(Self::new)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send `query` to the upstream and wait for its reply.
    ///
    /// The reply is returned exactly as received once it has been checked to
    /// be a well-formed response to `query`.
    pub async fn exchange(&self, query: &[u8]) -> Result<Vec<u8>> {
        let exchange = async {
            match self.endpoint.transport {
                Transport::Udp => self.exchange_udp(query).await,
                Transport::Tcp => self.exchange_tcp(query).await,
            }
        };

        let reply = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout(self.endpoint.to_string()))?
            .map_err(|source| Error::Upstream {
                upstream: self.endpoint.to_string(),
                source,
            })?;

        self.validate(query, &reply)?;
        Ok(reply)
    }

    fn validate(&self, query: &[u8], reply: &[u8]) -> Result<()> {
        let malformed = |source| Error::MalformedReply {
            upstream: self.endpoint.to_string(),
            source,
        };

        let parsed = Reply::parse(reply).map_err(malformed)?;
        if Some(parsed.id) != dns::message_id(query) {
            return Err(malformed(MalformedMessage::IdMismatch));
        }
        Ok(())
    }

    async fn resolve(&self) -> io::Result<SocketAddr> {
        tokio::net::lookup_host(self.endpoint.address.as_str())
            .await?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "upstream host has no address"))
    }

    async fn exchange_udp(&self, query: &[u8]) -> io::Result<Vec<u8>> {
        let target = self.resolve().await?;
        let local = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;
        socket.send(query).await?;

        let id = dns::message_id(query);
        let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];
        loop {
            let len = socket.recv(&mut buf).await?;
            // Late answers to earlier queries on a reused port are skipped.
            if dns::message_id(&buf[..len]) == id {
                buf.truncate(len);
                return Ok(buf);
            }
        }
    }

    async fn exchange_tcp(&self, query: &[u8]) -> io::Result<Vec<u8>> {
        let target = self.resolve().await?;
        let mut stream = TcpStream::connect(target).await?;

        write_dns_message(&mut stream, query).await?;
        read_dns_message(&mut stream).await?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "upstream closed the connection")
        })
    }
}
