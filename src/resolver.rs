//! DNS query resolution logic.
//!
//! Handles the per-query pipeline:
//! 1. Cache lookup
//! 2. Forward to upstreams in priority order until one answers
//! 3. Cache the answer
//!
//! Transports handle the actual I/O, the resolver decides what to send back.

use std::time::Instant;

use tracing::{debug, error, warn};

use crate::cache::RecordCache;
use crate::dns::{self, Query};
use crate::endpoint::Endpoint;
use crate::stats::{Stats, StatsSnapshot};
use crate::upstream::UpstreamClient;

/// Outcome of resolving one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Answered from the cache, with the transaction id rewritten.
    Cached(Vec<u8>),
    /// Answered by `upstream`, exactly as it replied.
    Forwarded { reply: Vec<u8>, upstream: Endpoint },
    /// Every upstream failed. The requester gets no reply.
    Failed,
    /// Too short to be a DNS message; dropped without forwarding.
    Malformed,
}

impl Resolution {
    /// The bytes to write back to the requester, if any.
    pub fn into_reply(self) -> Option<Vec<u8>> {
        match self {
            Resolution::Cached(reply) | Resolution::Forwarded { reply, .. } => Some(reply),
            Resolution::Failed | Resolution::Malformed => None,
        }
    }
}

/// Resolver shared by every listener of one cache server.
pub struct Resolver {
    upstreams: Vec<UpstreamClient>,
    cache: RecordCache,
    stats: Stats,
}

impl Resolver {
    /// Create a resolver that fails over through `upstreams` in order.
    pub fn new(upstreams: Vec<UpstreamClient>) -> Self {
        Self {
            upstreams,
            cache: RecordCache::new(),
            stats: Stats::new(),
        }
    }

    /// Resolve a raw DNS query (without TCP length prefix).
    pub async fn resolve(&self, query: &[u8]) -> Resolution {
        let start = Instant::now();
        let Some(parsed) = Query::parse(query) else {
            debug!(len = query.len(), "dropping undersized message");
            return Resolution::Malformed;
        };

        if let Some(cached) = self.cache.find(&parsed) {
            let mut reply = cached.to_vec();
            dns::set_id(&mut reply, parsed.id);
            self.stats.record_cached(start.elapsed());
            return Resolution::Cached(reply);
        }

        for upstream in &self.upstreams {
            debug!(upstream = %upstream.endpoint(), id = parsed.id, "forwarding query");
            match upstream.exchange(query).await {
                Ok(reply) => {
                    self.cache.store(&parsed, &reply);
                    self.stats.record_forwarded(start.elapsed());
                    return Resolution::Forwarded {
                        reply,
                        upstream: upstream.endpoint().clone(),
                    };
                }
                Err(e) => {
                    warn!(upstream = %upstream.endpoint(), error = %e, "upstream exchange failed");
                }
            }
        }

        error!(
            id = parsed.id,
            name = parsed.question.as_ref().map(|q| q.name.as_str()).unwrap_or("<none>"),
            upstreams = self.upstreams.len(),
            "all upstreams failed, dropping query"
        );
        self.stats.record_failed(start.elapsed());
        Resolution::Failed
    }

    pub fn upstreams(&self) -> &[UpstreamClient] {
        &self.upstreams
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn stats_snapshot_and_reset(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::TYPE_A;
    use crate::dns::fixtures::{build_query, build_reply, with_id};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::{TcpListener, UdpSocket};

    /// UDP upstream answering every query with `respond(query)`, counting hits.
    async fn mock_upstream<F>(respond: F) -> (SocketAddr, Arc<AtomicUsize>)
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                let Ok((len, src)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = socket.send_to(&respond(&buf[..len]), src).await;
            }
        });
        (addr, hits)
    }

    async fn refused_tcp_upstream() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("tcp:{addr}")
    }

    fn client(addr: &str) -> UpstreamClient {
        UpstreamClient::parse(addr).unwrap()
    }

    #[tokio::test]
    async fn forwards_on_miss_and_caches() {
        let (addr, hits) = mock_upstream(|q| build_reply(q, &[60])).await;
        let resolver = Resolver::new(vec![client(&addr.to_string())]);
        let query = build_query(0x0001, "example.com", TYPE_A);

        let first = resolver.resolve(&query).await;
        assert_eq!(
            first,
            Resolution::Forwarded {
                reply: build_reply(&query, &[60]),
                upstream: Endpoint::parse(&addr.to_string()).unwrap(),
            }
        );
        assert_eq!(resolver.cache_len(), 1);

        let second_query = with_id(query.clone(), 0x0002);
        let second = resolver.resolve(&second_query).await;
        assert_eq!(
            second,
            Resolution::Cached(with_id(build_reply(&query, &[60]), 0x0002))
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_until_ttl_then_forwarded_again() {
        let (addr, hits) = mock_upstream(|q| build_reply(q, &[60])).await;
        let resolver = Resolver::new(vec![client(&addr.to_string())]);
        let query = build_query(0x0001, "example.com", TYPE_A);

        assert!(matches!(
            resolver.resolve(&query).await,
            Resolution::Forwarded { .. }
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        tokio::time::pause();
        tokio::time::advance(Duration::from_secs(30)).await;
        let later = with_id(query.clone(), 0x0002);
        assert_eq!(
            resolver.resolve(&later).await,
            Resolution::Cached(with_id(build_reply(&query, &[60]), 0x0002))
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        // A paused clock would fire the exchange deadline before loopback I/O.
        tokio::time::resume();
        let refreshed = with_id(query.clone(), 0x0003);
        assert_eq!(
            resolver.resolve(&refreshed).await,
            Resolution::Forwarded {
                reply: build_reply(&refreshed, &[60]),
                upstream: Endpoint::parse(&addr.to_string()).unwrap(),
            }
        );
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn falls_back_in_priority_order() {
        let (bad_addr, bad_hits) = mock_upstream(|q| q[..6].to_vec()).await;
        let refused = refused_tcp_upstream().await;
        let (good_addr, good_hits) = mock_upstream(|q| build_reply(q, &[300])).await;
        let (unused_addr, unused_hits) = mock_upstream(|q| build_reply(q, &[1])).await;

        let resolver = Resolver::new(vec![
            client(&bad_addr.to_string()),
            client(&refused),
            client(&good_addr.to_string()),
            client(&unused_addr.to_string()),
        ]);
        let query = build_query(0x0A0A, "example.com", TYPE_A);

        let reply = resolver.resolve(&query).await.into_reply().unwrap();

        assert_eq!(reply, build_reply(&query, &[300]));
        assert_eq!(bad_hits.load(Ordering::SeqCst), 1);
        assert_eq!(good_hits.load(Ordering::SeqCst), 1);
        assert_eq!(unused_hits.load(Ordering::SeqCst), 0);

        let cached = resolver
            .cache()
            .find(&Query::parse(&query).unwrap())
            .unwrap();
        assert_eq!(&*cached, reply.as_slice());
    }

    #[tokio::test]
    async fn all_upstreams_failing_yields_no_reply() {
        let refused = refused_tcp_upstream().await;
        let (bad_addr, _) = mock_upstream(|q| q[..2].to_vec()).await;
        let resolver = Resolver::new(vec![client(&refused), client(&bad_addr.to_string())]);
        let query = build_query(7, "example.com", TYPE_A);

        assert_eq!(resolver.resolve(&query).await, Resolution::Failed);
        assert!(resolver.cache().is_empty());
        assert_eq!(resolver.stats_snapshot_and_reset().failed, 1);
    }

    #[tokio::test]
    async fn no_upstreams_is_a_failure() {
        let resolver = Resolver::new(Vec::new());
        let query = build_query(7, "example.com", TYPE_A);

        assert_eq!(resolver.resolve(&query).await, Resolution::Failed);
    }

    #[tokio::test]
    async fn uncacheable_queries_are_always_forwarded() {
        let (addr, hits) = mock_upstream(|q| build_reply(q, &[60])).await;
        let resolver = Resolver::new(vec![client(&addr.to_string())]);
        let query = build_query(3, "example.com", 15);

        resolver.resolve(&query).await;
        resolver.resolve(&query).await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn answerless_replies_are_forwarded_but_not_cached() {
        let (addr, hits) = mock_upstream(|q| build_reply(q, &[])).await;
        let resolver = Resolver::new(vec![client(&addr.to_string())]);
        let query = build_query(3, "nxdomain.example", TYPE_A);

        let first = resolver.resolve(&query).await.into_reply();
        resolver.resolve(&query).await;

        assert_eq!(first, Some(build_reply(&query, &[])));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_forwarded_again() {
        let (addr, hits) = mock_upstream(|q| build_reply(q, &[0])).await;
        let resolver = Resolver::new(vec![client(&addr.to_string())]);
        let query = build_query(3, "example.com", TYPE_A);

        resolver.resolve(&query).await;
        let second = resolver.resolve(&query).await;

        assert!(matches!(second, Resolution::Forwarded { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn undersized_messages_are_dropped() {
        let (addr, hits) = mock_upstream(|q| build_reply(q, &[60])).await;
        let resolver = Resolver::new(vec![client(&addr.to_string())]);

        assert_eq!(resolver.resolve(&[0x00, 0x01]).await, Resolution::Malformed);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
