//! Shared limits and thresholds
//!
//! Centralized constants to prevent drift between the pipeline stages and
//! the HTTP gateway layer.

/// Semantic unit text length bounds (§3 Data Model).
pub const UNIT_MIN_CHARS: usize = 40;
pub const UNIT_MAX_CHARS: usize = 900;

/// Default cap on units kept per request (most-recent-first truncation).
pub const DEFAULT_MAX_UNITS: usize = 50;

/// Default cap on graph nodes (§3 Signed Graph).
pub const DEFAULT_MAX_NODES: usize = 50;

/// Hard cap on `max_state_chars`, never exceeded regardless of budget planner output.
pub const MAX_STATE_CHARS_HARD_CAP: usize = 4000;

/// HTTP timeout for external API calls (embedder, provider).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Retry attempts for the embedder call.
pub const EMBED_RETRY_ATTEMPTS: u32 = 2;

/// Delay between embedder retries (ms).
pub const RETRY_DELAY_MS: u64 = 500;

/// Default TTL for semantic cache entries (24h).
pub const CACHE_TTL_SECS: i64 = 24 * 60 * 60;

/// Default TTL for conversation state entries (24h).
pub const STATE_TTL_SECS: i64 = 24 * 60 * 60;

/// Number of hex chars kept from a content hash for IDs/cache keys.
pub const HASH_PREFIX_LEN: usize = 16;
