//! UDP transport for DNS queries.
//!
//! A single receive loop reads datagrams and spawns one task per query, so a
//! slow upstream never holds up other requesters. Each task sends its reply
//! back to the datagram's source.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{MAX_DNS_PACKET_SIZE, QueryLogger};
use crate::dns::HEADER_LEN;
use crate::endpoint::Transport;
use crate::resolver::Resolver;

/// UDP listener of a cache server.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the UDP transport.
    ///
    /// Spawns the receive loop and returns its handle.
    pub fn start(self, resolver: Arc<Resolver>) -> JoinHandle<()> {
        tokio::spawn(run(self.socket, resolver))
    }
}

/// Receive loop - spawns a handler task for each datagram.
async fn run(socket: Arc<UdpSocket>, resolver: Arc<Resolver>) {
    let logger = QueryLogger::new(Transport::Udp);
    let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "UDP recv error");
                continue;
            }
        };

        if len < HEADER_LEN {
            debug!(%src, len, "ignoring undersized datagram");
            continue;
        }

        let query = buf[..len].to_vec();
        tokio::spawn(handle_query(
            socket.clone(),
            resolver.clone(),
            logger,
            query,
            src,
        ));
    }
}

async fn handle_query(
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver>,
    logger: QueryLogger,
    query: Vec<u8>,
    src: SocketAddr,
) {
    let start_time = Instant::now();
    let resolution = resolver.resolve(&query).await;
    logger.log(src, &resolution, start_time.elapsed());

    if let Some(reply) = resolution.into_reply() {
        if let Err(e) = socket.send_to(&reply, src).await {
            error!(%src, error = %e, "UDP response error");
        }
    }
}
