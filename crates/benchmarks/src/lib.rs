//! # Pulse Benchmarks
//!
//! The Benchmark Cache: pre-computed distribution statistics per
//! `(metric, segment)` pair, gated by a TTL stored as an absolute `expires_at`.
//!
//! ## Public API
//!
//! - `BenchmarkCache`: `refresh`, `lookup`, `peek` and the `get_or_refresh`
//!   read path used by the percentile calculator and the HTTP layer.
//! - `CachePolicy`: TTL, refresh timeout, metric whitelist, performer count.
//! - `BenchmarkRead`: whether a read was a hit, a fresh refresh or a stale fallback.

pub mod cache;
pub mod error;
pub mod policy;

pub use cache::{BenchmarkCache, BenchmarkRead};
pub use error::BenchmarkError;
pub use policy::CachePolicy;
