//! TCP transport for DNS queries.
//!
//! Each client connection is handled independently. TCP DNS messages are
//! prefixed with a 2-byte length; a connection may carry several queries,
//! which are answered in order until the client closes it or goes idle.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::QueryLogger;
use crate::endpoint::Transport;
use crate::resolver::Resolver;

/// How long a connection may sit without a new query before it is closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(8);

/// TCP listener of a cache server.
///
/// Each accepted connection is handled in a separate task.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind a TCP listener for the transport.
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start the TCP transport.
    ///
    /// Spawns an accept loop that handles each connection in a separate task.
    pub fn start(self, resolver: Arc<Resolver>) -> JoinHandle<()> {
        tokio::spawn(run_accept_loop(self.listener, resolver))
    }
}

/// Accept loop - spawns a handler task for each incoming connection.
async fn run_accept_loop(listener: TcpListener, resolver: Arc<Resolver>) {
    loop {
        match listener.accept().await {
            Ok((client, peer)) => {
                tokio::spawn(handle_connection(client, peer, resolver.clone()));
            }
            Err(e) => {
                error!(error = %e, "TCP accept error");
            }
        }
    }
}

/// Serve queries on one connection until it closes, errors or idles out.
async fn handle_connection(mut client: TcpStream, peer: SocketAddr, resolver: Arc<Resolver>) {
    let logger = QueryLogger::new(Transport::Tcp);

    loop {
        let query = match tokio::time::timeout(IDLE_TIMEOUT, read_dns_message(&mut client)).await {
            Ok(Ok(Some(query))) => query,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                debug!(%peer, error = %e, "TCP read error");
                return;
            }
            Err(_) => {
                debug!(%peer, "closing idle TCP connection");
                return;
            }
        };

        let start_time = Instant::now();
        let resolution = resolver.resolve(&query).await;
        logger.log(peer, &resolution, start_time.elapsed());

        if let Some(reply) = resolution.into_reply() {
            if let Err(e) = write_dns_message(&mut client, &reply).await {
                debug!(%peer, error = %e, "TCP write error");
                return;
            }
        }
    }
}

/// Read one length-prefixed DNS message, returning it without the prefix.
///
/// Returns `Ok(None)` when the peer closed the connection between messages.
pub async fn read_dns_message(stream: &mut TcpStream) -> io::Result<Option<Vec<u8>>> {
    let len = match stream.read_u16().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;

    Ok(Some(buf))
}

/// Write one DNS message with its 2-byte length prefix.
pub async fn write_dns_message(stream: &mut TcpStream, message: &[u8]) -> io::Result<()> {
    let len = u16::try_from(message.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "DNS message too large for TCP"))?;

    let mut framed = Vec::with_capacity(message.len() + 2);
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(message);
    stream.write_all(&framed).await
}
