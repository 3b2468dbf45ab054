//! Transport layer implementations for the cache server.
//!
//! Provides UDP and TCP listeners that receive DNS queries from clients,
//! hand them to the [`Resolver`](crate::resolver::Resolver) and write back
//! whatever it decides to answer.

pub mod tcp;
pub mod udp;

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, info};

use crate::endpoint::Transport;
use crate::resolver::Resolution;

/// Largest DNS message either transport can carry.
pub const MAX_DNS_PACKET_SIZE: usize = 65535;

/// Logger for per-query outcomes on one transport.
#[derive(Debug, Clone, Copy)]
pub struct QueryLogger {
    transport: Transport,
}

impl QueryLogger {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn log(&self, peer: SocketAddr, resolution: &Resolution, elapsed: Duration) {
        let total_ms = elapsed.as_secs_f64() * 1000.0;
        match resolution {
            Resolution::Cached(_) => {
                debug!(transport = %self.transport, %peer, total_ms, "CACHED");
            }
            Resolution::Forwarded { upstream, .. } => {
                info!(transport = %self.transport, %peer, %upstream, total_ms, "FORWARDED");
            }
            Resolution::Failed => {
                debug!(transport = %self.transport, %peer, total_ms, "FAILED, no reply sent");
            }
            Resolution::Malformed => {
                debug!(transport = %self.transport, %peer, "MALFORMED, dropped");
            }
        }
    }
}
