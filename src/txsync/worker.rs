//! Page worker: fetch one page and persist it atomically.
//!
//! A page is retried with exponential backoff up to `RetryPolicy::max_attempts` times.
//! When the last attempt fails the worker records a `sync_errors` row and reports the
//! page as failed; it never aborts sibling pages.

use crate::txsync::fetcher::{PageFetcher, PageRequest};
use crate::txsync::ledger::{PendingTx, SyncLedger, SyncRunId};
use crate::txsync::types::PersistError;
use crate::upstream::{FetchError, ListedTransaction};

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder, future::retry_notify};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

/// How a failing page is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	/// Total attempts per page, including the first
	pub max_attempts: u32,
	pub initial_interval: Duration,
	pub max_interval: Duration,
	pub multiplier: f64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			initial_interval: Duration::from_millis(500),
			max_interval: Duration::from_secs(10),
			multiplier: 2.0,
		}
	}
}

impl RetryPolicy {
	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(self.initial_interval)
			.with_max_interval(self.max_interval)
			.with_multiplier(self.multiplier)
			// Attempts are bounded by count, not by elapsed time.
			.with_max_elapsed_time(None)
			.build()
	}
}

/// A page failure, naming the page and the phase that failed
#[derive(Debug, thiserror::Error)]
pub enum PageError {
	#[error("page {page}: fetch failed: {source}")]
	Fetch {
		page: u64,
		#[source]
		source: FetchError,
	},

	#[error("page {page}: persist failed: {source}")]
	Persist {
		page: u64,
		#[source]
		source: PersistError,
	},
}

impl PageError {
	pub fn page(&self) -> u64 {
		match self {
			PageError::Fetch { page, .. } | PageError::Persist { page, .. } => *page,
		}
	}
}

/// Final result of processing one page
#[derive(Debug)]
pub enum PageOutcome {
	Persisted {
		page: u64,
		fetched: u64,
		inserted: u64,
		attempts: u32,
	},
	Failed {
		page: u64,
		attempts: u32,
		error: PageError,
	},
}

/// Fetches and persists pages for one sync run
pub struct PageWorker {
	fetcher: Arc<dyn PageFetcher>,
	ledger: Arc<dyn SyncLedger>,
	address: String,
	page_size: u64,
	/// Transactions the run owes; bounds synthetic page sizes
	window_txs: u64,
	retry: RetryPolicy,
}

impl PageWorker {
	pub fn new(
		fetcher: Arc<dyn PageFetcher>,
		ledger: Arc<dyn SyncLedger>,
		address: impl Into<String>,
		page_size: u64,
		window_txs: u64,
		retry: RetryPolicy,
	) -> Self {
		Self {
			fetcher,
			ledger,
			address: address.into(),
			page_size,
			window_txs,
			retry,
		}
	}

	/// Process a page, retrying as configured; a permanent failure is written to
	/// `sync_errors` before returning.
	pub async fn process(&self, page: u64, sync_id: SyncRunId) -> PageOutcome {
		let attempts = AtomicU32::new(0);
		let attempts_ref = &attempts;
		let max_attempts = self.retry.max_attempts.max(1);

		let result = retry_notify(
			self.retry.backoff(),
			move || async move {
				let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst) + 1;
				self.attempt(page, sync_id).await.map_err(|e| {
					if attempt >= max_attempts {
						backoff::Error::permanent(e)
					} else {
						backoff::Error::transient(e)
					}
				})
			},
			|e: PageError, wait: Duration| {
				warn!("{}; retrying in {:?}", e, wait);
			},
		)
		.await;

		let attempts = attempts.load(Ordering::SeqCst);
		match result {
			Ok((fetched, inserted)) => PageOutcome::Persisted {
				page,
				fetched,
				inserted,
				attempts,
			},
			Err(error) => {
				let failed_page = error.page();
				error!(
					"Giving up on page {} after {} attempts: {}",
					failed_page, attempts, error
				);
				if let Err(e) = self
					.ledger
					.record_error(sync_id, failed_page, &error.to_string())
					.await
				{
					error!("Failed to record error for page {}: {}", failed_page, e);
				}
				PageOutcome::Failed {
					page,
					attempts,
					error,
				}
			}
		}
	}

	/// One fetch-and-persist attempt; returns (fetched, inserted).
	async fn attempt(&self, page: u64, sync_id: SyncRunId) -> Result<(u64, u64), PageError> {
		let items = self
			.fetcher
			.fetch(PageRequest {
				address: &self.address,
				page,
				page_size: self.page_size,
				window_txs: self.window_txs,
			})
			.await
			.map_err(|source| PageError::Fetch { page, source })?;

		let pending = to_pending(items);
		let fetched = pending.len() as u64;

		let inserted = self
			.ledger
			.persist_page(sync_id, &self.address, page, &pending)
			.await
			.map_err(|source| PageError::Persist { page, source })?;

		debug!("Page {}: {} fetched, {} new", page, fetched, inserted);
		Ok((fetched, inserted))
	}
}

/// Each item's payload is stored exactly as listed.
fn to_pending(items: Vec<ListedTransaction>) -> Vec<PendingTx> {
	items
		.into_iter()
		.map(|item| PendingTx {
			tx_id: item.transaction_id().to_string(),
			raw: item.into_payload(),
		})
		.collect()
}
