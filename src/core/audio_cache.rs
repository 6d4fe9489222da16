//! Short-lived cache for synthesized speech.
//!
//! The pipeline stores TTS output here and hands the provider a URL to
//! fetch it from. Entries are read-only after creation and are NOT removed
//! on first read, because the provider may re-fetch the same URL on its
//! own retries. Moka's time-to-live acts as the background sweep; `get`
//! additionally refuses an expired-but-not-yet-swept entry.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use moka::future::{Cache as MokaCache, CacheBuilder as MokaCacheBuilder};
use tokio::time::Instant;

struct CachedAudioBlob {
    data: Bytes,
    expires_at: Instant,
}

/// In-memory audio blob cache with a fixed TTL from creation.
pub struct AudioCache {
    cache: MokaCache<String, Arc<CachedAudioBlob>>,
    ttl: Duration,
}

impl AudioCache {
    pub fn new(ttl: Duration) -> Self {
        let cache = MokaCacheBuilder::new(10_000)
            .weigher(|_key, blob: &Arc<CachedAudioBlob>| blob.data.len() as u32)
            .max_capacity(256 * 1024 * 1024)
            .time_to_live(ttl)
            .build();
        Self { cache, ttl }
    }

    /// Store synthesized audio under a fresh id.
    pub async fn put(&self, id: &str, data: Bytes) {
        let blob = Arc::new(CachedAudioBlob {
            data,
            expires_at: Instant::now() + self.ttl,
        });
        self.cache.insert(id.to_string(), blob).await;
    }

    /// Retrieve audio bytes. Never returns an expired entry, even when the
    /// sweep has not caught up yet.
    pub async fn get(&self, id: &str) -> Option<Bytes> {
        let blob = self.cache.get(id).await?;
        if Instant::now() >= blob.expires_at {
            self.cache.invalidate(id).await;
            return None;
        }
        Some(blob.data.clone())
    }
}
