//! # Pulse Analytics
//!
//! The pure math behind the portfolio core: movement classification,
//! retention ratios, portfolio aggregation and benchmark distributions.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** No I/O. It depends only on `core-types`, so both the
//!   PostgreSQL repository and the in-memory store run the exact same
//!   classification inside their write transactions.
//! - **Stateless Calculation:** Every entry point is a function of its inputs.
//!
//! ## Public API
//!
//! - `classify_movement`, `ArrTransition`: turn an ARR write into a ledger row.
//! - `MovementTotals`, `RetentionMetrics`: period totals and GRR/NRR.
//! - `PortfolioTotals`: live totals and the segment breakdown.
//! - `compute_benchmark`, `percentile_rank`, `quantile`: distribution math.

// Declare the modules that constitute this crate.
pub mod distribution;
pub mod error;
pub mod movement;
pub mod portfolio;
pub mod retention;

// Re-export the key components to create a clean, public-facing API.
pub use distribution::{BenchmarkComputation, PercentileRank, compute_benchmark, percentile_rank, quantile, summarize};
pub use error::AnalyticsError;
pub use movement::{ArrTransition, classify_movement, stage_after};
pub use portfolio::PortfolioTotals;
pub use retention::{MovementTotals, RetentionMetrics};
