pub mod enums;
pub mod error;
pub mod period;
pub mod segment;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{ComparisonScope, LifecycleStage, Metric, MovementSource, MovementType, SegmentTier};
pub use error::CoreError;
pub use segment::classify;
pub use structs::{
    ArrChangeEvent, BenchmarkEntry, BenchmarkKey, BenchmarkSample, Customer, CustomerPercentile,
    DistributionStats, PercentileResult, Performer, PortfolioSnapshot, RevenueMovement, SegmentStats,
};
