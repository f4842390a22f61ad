//! Address transaction sync engine
//!
//! This module provides the core logic for backfilling an address's transaction history into
//! durable storage, resumably and without duplicates. It is composed of several submodules:
//!
//! - `orchestrator`: Computes what is owed, drives paced concurrent page workers and closes the run.
//! - `worker`: Fetches one page and persists it in a single transaction, with bounded retries.
//! - `fetcher`: The `PageFetcher` seam, with live and synthetic implementations.
//! - `ledger`: Sync runs, sync errors and persisted transactions in PostgreSQL or SQLite.
//! - `rate_limiter`: Paces page launches to a fixed rate.
//! - `pagination`: Page arithmetic and the sync plan.
//! - `progress_tracker`: Counts page outcomes and logs progress.

/// Page fetching seam and implementations
pub mod fetcher;
/// Durable sync state
pub mod ledger;
/// Main coordinator for a sync run
pub mod orchestrator;
/// Page arithmetic
pub mod pagination;
/// Tracks page outcomes and statistics
pub mod progress_tracker;
/// Launch pacing
pub mod rate_limiter;
/// Error types
pub mod types;
/// Single-page fetch and persist
pub mod worker;

pub use orchestrator::*;
pub use types::*;
