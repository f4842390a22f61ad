//! Progress tracking for a sync run.
//!
//! This module provides the `SyncProgressTracker`, which records page outcomes as workers
//! finish, counts fetched and newly inserted transactions, and logs progress at regular
//! intervals. Completion order is arbitrary, so the tracker keeps the failed pages sorted
//! for reporting.

use crate::txsync::worker::PageOutcome;

use std::collections::BTreeSet;
use tracing::info;

/// Log every this many completed pages
const LOG_EVERY_PAGES: u64 = 100;

/// Tracks page outcomes for one run
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
	/// Pages the run intends to dispatch
	planned_pages: u64,
	/// Pages handed to a worker so far
	dispatched_pages: u64,
	/// Pages persisted successfully
	succeeded_pages: u64,
	/// Pages that exhausted their retries
	failed_pages: BTreeSet<u64>,
	/// Transactions fetched across all persisted pages
	txs_fetched: u64,
	/// Transactions that were new to the store
	txs_inserted: u64,
	/// Pages that needed more than one attempt
	retried_pages: u64,
	/// Completed count at the last progress log
	last_logged: u64,
}

impl SyncProgressTracker {
	pub fn new(planned_pages: u64) -> Self {
		Self {
			planned_pages,
			dispatched_pages: 0,
			succeeded_pages: 0,
			failed_pages: BTreeSet::new(),
			txs_fetched: 0,
			txs_inserted: 0,
			retried_pages: 0,
			last_logged: 0,
		}
	}

	pub fn record_dispatched(&mut self) {
		self.dispatched_pages += 1;
	}

	/// Record a finished page
	pub fn record_outcome(&mut self, outcome: &PageOutcome) {
		match outcome {
			PageOutcome::Persisted {
				fetched,
				inserted,
				attempts,
				..
			} => {
				self.succeeded_pages += 1;
				self.txs_fetched += fetched;
				self.txs_inserted += inserted;
				if *attempts > 1 {
					self.retried_pages += 1;
				}
			}
			PageOutcome::Failed { page, .. } => {
				self.record_failed(*page);
			}
		}
	}

	/// Record a page that failed without producing an outcome (e.g. its task panicked)
	pub fn record_failed(&mut self, page: u64) {
		self.failed_pages.insert(page);
	}

	pub fn completed_pages(&self) -> u64 {
		self.succeeded_pages + self.failed_pages.len() as u64
	}

	pub fn in_flight(&self) -> u64 {
		self.dispatched_pages.saturating_sub(self.completed_pages())
	}

	/// Log progress every `LOG_EVERY_PAGES` completed pages, or when forced
	pub fn log_progress(&mut self, force: bool) {
		let completed = self.completed_pages();
		if force || completed.saturating_sub(self.last_logged) >= LOG_EVERY_PAGES {
			info!(
				"Sync progress: {}/{} pages done ({} failed, {} in flight), {} new transactions",
				completed,
				self.planned_pages,
				self.failed_pages.len(),
				self.in_flight(),
				self.txs_inserted
			);
			self.last_logged = completed;
		}
	}

	pub fn get_stats(&self) -> SyncStats {
		SyncStats {
			planned_pages: self.planned_pages,
			dispatched_pages: self.dispatched_pages,
			succeeded_pages: self.succeeded_pages,
			failed_pages: self.failed_pages.iter().copied().collect(),
			retried_pages: self.retried_pages,
			txs_fetched: self.txs_fetched,
			txs_inserted: self.txs_inserted,
		}
	}
}

/// Statistics about a finished (or in-progress) run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
	pub planned_pages: u64,
	pub dispatched_pages: u64,
	pub succeeded_pages: u64,
	/// Failed page indices, ascending
	pub failed_pages: Vec<u64>,
	pub retried_pages: u64,
	pub txs_fetched: u64,
	pub txs_inserted: u64,
}

impl SyncStats {
	/// Get a human-readable summary of the sync statistics
	pub fn summary(&self) -> String {
		format!(
			"{} of {} pages persisted, {} transactions fetched, {} new{}{}",
			self.succeeded_pages,
			self.planned_pages,
			self.txs_fetched,
			self.txs_inserted,
			if self.retried_pages == 0 {
				String::new()
			} else {
				format!(", {} pages retried", self.retried_pages)
			},
			if self.failed_pages.is_empty() {
				String::new()
			} else {
				format!(" ({} failed: {:?})", self.failed_pages.len(), self.failed_pages)
			}
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::txsync::worker::PageError;
	use crate::upstream::FetchError;

	fn failed(page: u64) -> PageOutcome {
		PageOutcome::Failed {
			page,
			attempts: 3,
			error: PageError::Fetch {
				page,
				source: FetchError::Status {
					status: 503,
					body: "down".to_string(),
				},
			},
		}
	}

	fn persisted(page: u64, inserted: u64, attempts: u32) -> PageOutcome {
		PageOutcome::Persisted {
			page,
			fetched: 5,
			inserted,
			attempts,
		}
	}

	#[test]
	fn test_outcomes_accumulate() {
		let mut tracker = SyncProgressTracker::new(4);
		for _ in 0..4 {
			tracker.record_dispatched();
		}
		tracker.record_outcome(&persisted(1, 5, 1));
		tracker.record_outcome(&failed(3));
		tracker.record_outcome(&persisted(0, 2, 2));
		assert_eq!(tracker.in_flight(), 1);
		tracker.record_failed(2);

		let stats = tracker.get_stats();
		assert_eq!(stats.succeeded_pages, 2);
		assert_eq!(stats.failed_pages, vec![2, 3]);
		assert_eq!(stats.txs_fetched, 10);
		assert_eq!(stats.txs_inserted, 7);
		assert_eq!(stats.retried_pages, 1);
		assert_eq!(tracker.in_flight(), 0);
	}

	#[test]
	fn test_summary_mentions_failures_only_when_present() {
		let mut tracker = SyncProgressTracker::new(2);
		tracker.record_outcome(&persisted(0, 5, 1));
		assert!(!tracker.get_stats().summary().contains("failed"));

		tracker.record_outcome(&failed(1));
		let summary = tracker.get_stats().summary();
		assert!(summary.contains("1 of 2 pages persisted"));
		assert!(summary.contains("1 failed: [1]"));
	}
}
