//! Listen and upstream address strings.
//!
//! Both kinds of address share one syntax: an optional `udp:` or `tcp:`
//! prefix followed by `host:port`. Without a prefix the transport is UDP.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Transport protocol of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        match token {
            "udp" => Ok(Transport::Udp),
            "tcp" => Ok(Transport::Tcp),
            other => Err(Error::UnsupportedTransport(other.to_string())),
        }
    }
}

/// A transport paired with a `host:port` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub transport: Transport,
    /// `host:port`; host names are resolved when the address is used.
    pub address: String,
}

impl Endpoint {
    /// Parse an address string such as `8.8.8.8:53`, `tcp:1.1.1.1:53` or
    /// `udp:[::1]:5353`.
    pub fn parse(s: &str) -> Result<Self> {
        let (transport, address) = split_transport(s)?;
        validate_host_port(address)
            .then(|| Self {
                transport,
                address: address.to_string(),
            })
            .ok_or_else(|| Error::InvalidAddress(s.to_string()))
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transport, self.address)
    }
}

fn split_transport(s: &str) -> Result<(Transport, &str)> {
    if let Some(rest) = s.strip_prefix("udp:") {
        return Ok((Transport::Udp, rest));
    }
    if let Some(rest) = s.strip_prefix("tcp:") {
        return Ok((Transport::Tcp, rest));
    }

    // `token:host:port` with some other alphabetic token names a transport
    // we do not speak. A bare `host:port` never matches because the
    // remainder would lack a port.
    if let Some((token, rest)) = s.split_once(':') {
        let is_token = !token.is_empty() && token.bytes().all(|b| b.is_ascii_alphabetic());
        if is_token && validate_host_port(rest) {
            return Err(Error::UnsupportedTransport(token.to_string()));
        }
    }

    Ok((Transport::Udp, s))
}

fn validate_host_port(address: &str) -> bool {
    let Some((host, port)) = address.rsplit_once(':') else {
        return false;
    };
    if host.is_empty() || port.parse::<u16>().is_err() {
        return false;
    }

    match host.strip_prefix('[') {
        Some(inner) => inner.strip_suffix(']').is_some_and(|ip| !ip.is_empty()),
        // An unbracketed host with a colon is an IPv6 literal missing its brackets.
        None => !host.contains([':', '[', ']']),
    }
}
