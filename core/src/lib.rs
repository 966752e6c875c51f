//! Spectyra Core - shared utilities for the optimizer pipeline
//!
//! - **limits**: shared constants and thresholds
//! - **excerpts** (feature): UTF-8 safe slicing/truncation helpers
//! - **hashing** (feature): deterministic content hashing for unit IDs and cache keys
//!
//! # Feature Flags
//!
//! - `excerpts` - text truncation helpers (lightweight)
//! - `hashing` - SHA-256 content hashing (requires sha2)
//! - `full` - all features

pub mod limits;

#[cfg(feature = "excerpts")]
pub mod excerpts;

#[cfg(feature = "hashing")]
pub mod hashing;

pub use limits::*;

#[cfg(feature = "excerpts")]
pub use excerpts::{char_windows, safe_utf8_slice, truncate_with_ellipsis};

#[cfg(feature = "hashing")]
pub use hashing::hash_prefix;
