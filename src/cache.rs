//! Semantic cache — a hash-keyed KV store of prior optimized responses,
//! not a nearest-neighbor vector search. The key is derived by hashing a
//! canonical serialization of its inputs and hex-encoding a prefix.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use spectyra_core::{hash_prefix, CACHE_TTL_SECS};

use crate::units::UnitizerPath;

/// Inputs to the semantic cache key. A pure function of these
/// fields — equal inputs always produce equal keys.
pub struct CacheKeyInputs<'a> {
    pub stable_unit_ids: &'a [String],
    pub embeddings: &'a [&'a [f32]],
    pub model: &'a str,
    pub path: UnitizerPath,
}

/// `semantic_` + 16 hex chars, derived from sorted stable unit IDs, rounded
/// embedding fingerprints, model, path, stability and λ₂.
pub fn cache_key(inputs: &CacheKeyInputs<'_>, stability_index: f64, lambda2: f64) -> String {
    let mut ids: Vec<&str> = inputs
        .stable_unit_ids
        .iter()
        .take(10)
        .map(|s| s.as_str())
        .collect();
    ids.sort_unstable();

    let mut fingerprint = String::new();
    for emb in inputs.embeddings.iter().take(20) {
        for dim in emb.iter().take(8) {
            fingerprint.push_str(&format!("{:.3},", dim));
        }
        fingerprint.push(';');
    }

    let path_str = match inputs.path {
        UnitizerPath::Talk => "talk",
        UnitizerPath::Code => "code",
    };

    let canonical = format!(
        "{}|{}|{}|{}|{:.3}|{:.3}",
        ids.join(","),
        fingerprint,
        inputs.model,
        path_str,
        stability_index,
        lambda2
    );
    format!("semantic_{}", hash_prefix(&canonical))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response_text: String,
    expires_at_secs: u64,
}

/// Injectable cache collaborator so a real deployment can swap in an
/// external KV store without touching the pipeline.
#[async_trait]
pub trait SemanticCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, response_text: String, ttl_secs: i64);
}

/// In-memory fallback: a `Mutex<HashMap>` with a background sweep removing
/// expired entries via a detached `tokio::spawn` task.
pub struct InMemorySemanticCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl InMemorySemanticCache {
    pub fn new() -> Self {
        let entries = Arc::new(Mutex::new(HashMap::new()));
        spawn_sweep(entries.clone());
        Self { entries }
    }
}

impl Default for InMemorySemanticCache {
    fn default() -> Self {
        Self::new()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn spawn_sweep(entries: Arc<Mutex<HashMap<String, CacheEntry>>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let now = now_secs();
            let mut guard = entries.lock().await;
            let before = guard.len();
            guard.retain(|_, v| v.expires_at_secs > now);
            if guard.len() < before {
                debug!(removed = before - guard.len(), "swept expired cache entries");
            }
        }
    });
}

#[async_trait]
impl SemanticCache for InMemorySemanticCache {
    async fn get(&self, key: &str) -> Option<String> {
        let guard = self.entries.lock().await;
        let entry = guard.get(key)?;
        if entry.expires_at_secs <= now_secs() {
            return None;
        }
        Some(entry.response_text.clone())
    }

    async fn set(&self, key: &str, response_text: String, ttl_secs: i64) {
        let ttl = if ttl_secs > 0 { ttl_secs as u64 } else { CACHE_TTL_SECS as u64 };
        let mut guard = self.entries.lock().await;
        guard.insert(
            key.to_string(),
            CacheEntry {
                response_text,
                expires_at_secs: now_secs() + ttl,
            },
        );
    }
}

/// Looks up `key`, logging and swallowing any failure as a cache miss —
/// cache failures must never fail the request.
pub async fn lookup(cache: &dyn SemanticCache, key: &str) -> Option<String> {
    let result = cache.get(key).await;
    if result.is_none() {
        debug!(key, "semantic cache miss");
    }
    result
}

/// Stores `response_text` under `key`, logging on failure but never
/// propagating it.
pub async fn store(cache: &dyn SemanticCache, key: &str, response_text: String, ttl_secs: i64) {
    cache.set(key, response_text, ttl_secs).await;
    debug!(key, "semantic cache store");
}

/// No-op cache for tests and dry runs.
pub struct NoopSemanticCache;

#[async_trait]
impl SemanticCache for NoopSemanticCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _response_text: String, _ttl_secs: i64) {
        warn!("noop semantic cache: write discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_pure_function_of_inputs() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let e1 = [1.0_f32, 2.0];
        let embeds: Vec<&[f32]> = vec![&e1];
        let inputs = CacheKeyInputs {
            stable_unit_ids: &ids,
            embeddings: &embeds,
            model: "gpt-4",
            path: UnitizerPath::Talk,
        };
        let k1 = cache_key(&inputs, 0.5, 0.2);
        let k2 = cache_key(&inputs, 0.5, 0.2);
        assert_eq!(k1, k2);
        assert!(k1.starts_with("semantic_"));
        assert_eq!(k1.len(), "semantic_".len() + 16);
    }

    #[test]
    fn cache_key_changes_with_stability() {
        let ids = vec!["a".to_string()];
        let e1 = [1.0_f32];
        let embeds: Vec<&[f32]> = vec![&e1];
        let inputs = CacheKeyInputs {
            stable_unit_ids: &ids,
            embeddings: &embeds,
            model: "gpt-4",
            path: UnitizerPath::Talk,
        };
        let k1 = cache_key(&inputs, 0.5, 0.2);
        let k2 = cache_key(&inputs, 0.9, 0.2);
        assert_ne!(k1, k2);
    }

    #[tokio::test]
    async fn in_memory_cache_round_trips() {
        let cache = InMemorySemanticCache::new();
        cache.set("semantic_abc", "hello".to_string(), 60).await;
        assert_eq!(lookup(&cache, "semantic_abc").await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn in_memory_cache_misses_unknown_key() {
        let cache = InMemorySemanticCache::new();
        assert_eq!(lookup(&cache, "semantic_missing").await, None);
    }

    #[tokio::test]
    async fn noop_cache_never_stores() {
        let cache = NoopSemanticCache;
        store(&cache, "semantic_x", "y".to_string(), 10).await;
        assert_eq!(lookup(&cache, "semantic_x").await, None);
    }
}
