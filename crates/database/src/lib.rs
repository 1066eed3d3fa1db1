//! # Pulse Database Crate
//!
//! The persistence adapter for the analytics core. It owns the PostgreSQL
//! schema (customers, the revenue ledger, snapshots, benchmarks and
//! percentile history) and hides every SQL statement behind the store traits
//! in [`store`].
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: build the pool and bring the schema up to date.
//! - `DbRepository`: the PostgreSQL implementation of every store trait.
//! - `InMemoryStore`: a lock-guarded implementation with the same contract.
//! - `DbError`: the errors returned by either backend.

pub mod connection;
pub mod error;
pub mod memory;
pub mod repository;
pub mod store;

pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use memory::InMemoryStore;
pub use repository::DbRepository;
pub use store::{
    ArrWrite, ArrWriteOutcome, BenchmarkStore, CustomerStore, LedgerStore, PercentileStore, PortfolioStore,
    PriorState, SnapshotStore,
};
