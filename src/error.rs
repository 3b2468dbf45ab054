//! Error types for the DNS cache.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::dns::MalformedMessage;
use crate::endpoint::Transport;

/// Result type alias for DNS cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running a cache server.
#[derive(Debug, Error)]
pub enum Error {
    /// An address string is not a usable `host:port` pair.
    #[error("invalid address `{0}`: expected host:port")]
    InvalidAddress(String),

    /// An address string names a transport other than `udp` or `tcp`.
    #[error("unsupported transport `{0}`")]
    UnsupportedTransport(String),

    /// A listener could not be bound.
    #[error("failed to bind {transport} listener on {address}: {source}")]
    Bind {
        transport: Transport,
        address: String,
        #[source]
        source: io::Error,
    },

    /// An upstream exchange failed at the socket level.
    #[error("upstream {upstream} failed: {source}")]
    Upstream {
        upstream: String,
        #[source]
        source: io::Error,
    },

    /// An upstream did not answer in time.
    #[error("upstream {0} timed out")]
    Timeout(String),

    /// An upstream answered with something that is not a usable reply.
    #[error("malformed reply from {upstream}: {source}")]
    MalformedReply {
        upstream: String,
        #[source]
        source: MalformedMessage,
    },

    /// I/O error outside of an upstream exchange.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid YAML for this schema.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}
