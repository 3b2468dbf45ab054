//! YAML configuration.
//!
//! ```yaml
//! caches:
//!   - listenAddrs: ["udp:127.0.0.1:53", "tcp:127.0.0.1:53"]
//!     dnsServers: ["8.8.8.8:53", "tcp:1.1.1.1:53"]
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration: one entry per independent cache instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub caches: Vec<CacheConfig>,
}

/// One cache instance: where it listens and whom it asks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default)]
    pub listen_addrs: Vec<String>,
    /// Upstream resolvers in priority order.
    #[serde(default)]
    pub dns_servers: Vec<String>,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_yaml::from_reader(reader)?)
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }
}
