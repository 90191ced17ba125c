//! `InfoMeshDht`: InfoMesh-specific key namespaces, rate limiting, and
//! crawl-lock semantics layered over a raw [`DhtStore`] (§4.9, §4.11).

use std::collections::HashMap;
use std::sync::Arc;

use infomesh_primitives::time::now_unix;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::client::DhtStore;
use crate::error::DhtResult;
use crate::pointer::{keyword_to_dht_key, url_to_dht_key, KeywordEntry, PeerPointer};
use crate::stats::DhtStats;

fn url_hash(url: &str) -> String {
    url_to_dht_key(url)
        .trim_start_matches("/infomesh/url/")
        .to_owned()
}

const PREFIX_ATTESTATION: &str = "/infomesh/att/";
const PREFIX_CRAWL_LOCK: &str = "/infomesh/lock/";

const DEFAULT_LOCK_TTL_SECONDS: f64 = 300.0;
const MAX_POINTERS_PER_KEYWORD: usize = 100;
const MAX_PUBLISHES_PER_KEYWORD_HR: usize = 10;
const PUBLISH_RATE_WINDOW_SECONDS: f64 = 3600.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct LockRecord {
    peer_id: String,
    url: String,
    timestamp: f64,
    ttl: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attestation {
    pub url: String,
    pub raw_hash: String,
    pub text_hash: String,
    pub peer_id: String,
    pub timestamp: f64,
    pub signature: Vec<u8>,
}

/// High-level DHT operations for InfoMesh: namespaced keyword publish/query,
/// crawl locks, and content attestations, on top of an opaque [`DhtStore`].
pub struct InfoMeshDht {
    store: Arc<dyn DhtStore>,
    peer_id: String,
    stats: Mutex<DhtStats>,
    publish_times: Mutex<HashMap<String, Vec<f64>>>,
}

impl InfoMeshDht {
    #[must_use]
    pub fn new(store: Arc<dyn DhtStore>, peer_id: impl Into<String>) -> Self {
        Self {
            store,
            peer_id: peer_id.into(),
            stats: Mutex::new(DhtStats::default()),
            publish_times: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn stats(&self) -> DhtStats {
        *self.stats.lock()
    }

    // ── Inverted-index operations ──────────────────────────────────

    /// Publish `keyword -> pointers` to the DHT, subject to a per-keyword
    /// hourly publish rate limit. Returns `false` (without error) if the
    /// publish was rate limited or the underlying store rejected it.
    pub async fn publish_keyword(
        &self,
        keyword: &str,
        pointers: &[PeerPointer],
        signature: Vec<u8>,
    ) -> DhtResult<bool> {
        if !self.check_publish_rate(keyword) {
            tracing::warn!(keyword, peer_id = %self.peer_id, "dht_publish_rate_limited");
            return Ok(false);
        }

        let mut truncated = pointers.to_vec();
        truncated.truncate(MAX_POINTERS_PER_KEYWORD);

        let entry = KeywordEntry {
            keyword: keyword.to_owned(),
            pointers: truncated,
            peer_id: self.peer_id.clone(),
            timestamp: now_unix(),
            signature,
        };
        let value = rmp_serde::to_vec_named(&entry)?;

        let key = keyword_to_dht_key(keyword);
        self.store.put(&key, value).await?;

        let mut stats = self.stats.lock();
        stats.puts_performed += 1;
        stats.keys_published += 1;
        drop(stats);
        self.record_publish(keyword);
        Ok(true)
    }

    /// Query the DHT for the pointer list published under `keyword`.
    pub async fn query_keyword(&self, keyword: &str) -> DhtResult<Vec<PeerPointer>> {
        let key = keyword_to_dht_key(keyword);
        let raw = self.store.get(&key).await?;
        self.stats.lock().gets_performed += 1;

        let Some(bytes) = raw else {
            return Ok(Vec::new());
        };
        let entry: KeywordEntry = rmp_serde::from_slice(&bytes)?;
        Ok(entry.pointers)
    }

    fn check_publish_rate(&self, keyword: &str) -> bool {
        let now = now_unix();
        let mut times = self.publish_times.lock();
        let entry = times.entry(keyword.to_owned()).or_default();
        entry.retain(|t| now - t < PUBLISH_RATE_WINDOW_SECONDS);
        entry.len() < MAX_PUBLISHES_PER_KEYWORD_HR
    }

    fn record_publish(&self, keyword: &str) {
        self.publish_times
            .lock()
            .entry(keyword.to_owned())
            .or_default()
            .push(now_unix());
    }

    // ── Crawl-lock operations ──────────────────────────────────────

    /// Attempt to acquire the crawl lock for `url`. Fails (returns `false`)
    /// if another peer holds an unexpired lock.
    pub async fn acquire_crawl_lock(&self, url: &str, ttl_seconds: f64) -> DhtResult<bool> {
        let lock_key = format!("{PREFIX_CRAWL_LOCK}{}", url_hash(url));

        if let Ok(Some(existing)) = self.store.get(&lock_key).await {
            if let Ok(record) = rmp_serde::from_slice::<LockRecord>(&existing) {
                if now_unix() - record.timestamp < ttl_seconds {
                    tracing::debug!(url, holder = %record.peer_id, "crawl_lock_held");
                    return Ok(false);
                }
            }
        }

        let record = LockRecord {
            peer_id: self.peer_id.clone(),
            url: url.to_owned(),
            timestamp: now_unix(),
            ttl: ttl_seconds,
        };
        let value = rmp_serde::to_vec_named(&record)?;
        self.store.put(&lock_key, value).await?;
        self.stats.lock().locks_acquired += 1;
        Ok(true)
    }

    /// Release the crawl lock for `url` by writing a record with
    /// `timestamp=0, ttl=0` — the store never deletes lock keys, it only
    /// overwrites them with an already-expired record.
    pub async fn release_crawl_lock(&self, url: &str) -> DhtResult<bool> {
        let lock_key = format!("{PREFIX_CRAWL_LOCK}{}", url_hash(url));
        let record = LockRecord {
            peer_id: self.peer_id.clone(),
            url: url.to_owned(),
            timestamp: 0.0,
            ttl: 0.0,
        };
        let value = rmp_serde::to_vec_named(&record)?;
        self.store.put(&lock_key, value).await?;
        self.stats.lock().locks_released += 1;
        Ok(true)
    }

    // ── Content attestation ──────────────────────────────────────────

    pub async fn publish_attestation(
        &self,
        url: &str,
        raw_hash: &str,
        text_hash: &str,
        signature: Vec<u8>,
    ) -> DhtResult<bool> {
        let att_key = format!("{PREFIX_ATTESTATION}{}", url_hash(url));
        let attestation = Attestation {
            url: url.to_owned(),
            raw_hash: raw_hash.to_owned(),
            text_hash: text_hash.to_owned(),
            peer_id: self.peer_id.clone(),
            timestamp: now_unix(),
            signature,
        };
        let value =
            rmp_serde::to_vec_named(&attestation)?;
        self.store.put(&att_key, value).await?;
        self.stats.lock().puts_performed += 1;
        Ok(true)
    }

    pub async fn get_attestation(&self, url: &str) -> DhtResult<Option<Attestation>> {
        let att_key = format!("{PREFIX_ATTESTATION}{}", url_hash(url));
        let raw = self.store.get(&att_key).await?;
        self.stats.lock().gets_performed += 1;
        let Some(bytes) = raw else {
            return Ok(None);
        };
        let attestation =
            rmp_serde::from_slice(&bytes)?;
        Ok(Some(attestation))
    }

    // ── Generic operations ────────────────────────────────────────────

    pub async fn put(&self, key: &str, value: Vec<u8>) -> DhtResult<()> {
        self.store.put(key, value).await?;
        self.stats.lock().puts_performed += 1;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> DhtResult<Option<Vec<u8>>> {
        let result = self.store.get(key).await?;
        self.stats.lock().gets_performed += 1;
        Ok(result)
    }
}

pub const fn default_lock_ttl_seconds() -> f64 {
    DEFAULT_LOCK_TTL_SECONDS
}
