//! Runs every configured cache instance.

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::server::{CacheServer, ServerHandle};

/// Owns one [`CacheServer`] per configured cache instance.
pub struct InstanceManager {
    servers: Vec<CacheServer>,
}

impl InstanceManager {
    pub fn new(config: &Config) -> Self {
        Self {
            servers: config.caches.iter().map(CacheServer::from_config).collect(),
        }
    }

    pub fn servers(&self) -> &[CacheServer] {
        &self.servers
    }

    /// Start every instance in configuration order.
    ///
    /// Stops at the first instance that fails to start. Instances started
    /// before it keep serving.
    pub async fn start(&self) -> Result<Vec<ServerHandle>> {
        if self.servers.is_empty() {
            warn!("no cache instances configured");
        }

        let mut handles = Vec::with_capacity(self.servers.len());
        for (instance, server) in self.servers.iter().enumerate() {
            let handle = server
                .start()
                .await
                .inspect_err(|e| error!(instance, error = %e, "failed to start cache instance"))?;
            handles.push(handle);
        }

        info!(instances = handles.len(), "all cache instances started");
        Ok(handles)
    }
}
