//! Upstream transaction-history API integration.
//!
//! This module provides the HTTP client and the envelope types for the paginated
//! address transaction listing. The sync engine only sees this through the
//! `PageFetcher` seam in `txsync::fetcher`.

/// HTTP client for the transaction-history endpoint
mod client;
/// Envelope and transaction item types mirroring the upstream JSON
mod types;

pub use client::CryptoApisClient;
pub use types::*;
