//! dnscache - a caching DNS forwarding proxy.
//!
//! Each configured cache instance listens on its own UDP/TCP endpoints,
//! answers address queries from an in-memory TTL cache, and forwards
//! everything else to its upstream resolvers in priority order.

pub mod cache;
pub mod config;
pub mod dns;
pub mod endpoint;
pub mod error;
pub mod manager;
pub mod resolver;
pub mod server;
pub mod stats;
pub mod transport;
pub mod upstream;

pub use cache::{CacheKey, RecordCache};
pub use config::{CacheConfig, Config};
pub use endpoint::{Endpoint, Transport};
pub use error::{Error, Result};
pub use manager::InstanceManager;
pub use resolver::{Resolution, Resolver};
pub use server::{CacheServer, ServerHandle};
pub use upstream::UpstreamClient;
