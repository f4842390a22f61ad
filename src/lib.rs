//! Incremental, resumable backfill of a blockchain address's transaction history.

pub mod config;
pub mod txsync;
pub mod upstream;
