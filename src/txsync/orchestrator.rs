//! Sync orchestrator and integration point for the page pipeline.
//!
//! This module defines the `SyncOrchestrator`, which coordinates one backfill of an address's
//! transaction history. It is responsible for:
//! - Computing how many pages are still owed from the upstream total and the ledger
//! - Opening the sync run record
//! - Dispatching one `PageWorker` per page, paced by the `RateLimiter` and capped by an
//!   in-flight ceiling
//! - Waiting for every worker, then reconciling the persisted count and closing the run
//!
//! Workers complete in any order. That is safe because transactions are keyed by their own
//! id, not by page, and nothing downstream depends on page completion order.

use crate::txsync::fetcher::PageFetcher;
use crate::txsync::ledger::{NewSyncRun, SyncLedger, SyncRunId, SyncedScope};
use crate::txsync::pagination::SyncPlan;
use crate::txsync::progress_tracker::{SyncProgressTracker, SyncStats};
use crate::txsync::rate_limiter::RateLimiter;
use crate::txsync::types::{ConfigError, TxSyncError};
use crate::txsync::worker::{PageOutcome, PageWorker, RetryPolicy};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Tunables for a sync
#[derive(Debug, Clone)]
pub struct SyncSettings {
	pub page_size: u64,
	/// Concurrency ceiling: pages fetched or persisted at the same time
	pub max_in_flight: usize,
	pub retry: RetryPolicy,
	/// Replaces the upstream total when set ("limit num results" mode)
	pub limit_num_results: Option<u64>,
	pub synced_scope: SyncedScope,
}

impl Default for SyncSettings {
	fn default() -> Self {
		Self {
			page_size: 50,
			max_in_flight: 16,
			retry: RetryPolicy::default(),
			limit_num_results: None,
			synced_scope: SyncedScope::Address,
		}
	}
}

impl SyncSettings {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.page_size == 0 {
			return Err(ConfigError::InvalidSetting(
				"page size must be greater than zero".to_string(),
			));
		}
		if self.max_in_flight == 0 {
			return Err(ConfigError::InvalidSetting(
				"max in flight must be greater than zero".to_string(),
			));
		}
		if self.retry.max_attempts == 0 {
			return Err(ConfigError::InvalidSetting(
				"max attempts must be greater than zero".to_string(),
			));
		}
		Ok(())
	}
}

/// Outcome of `SyncOrchestrator::run`
#[derive(Debug, Clone)]
pub struct SyncReport {
	pub run_id: SyncRunId,
	pub planned_pages: u64,
	pub total_sync_txs: u64,
	/// Rows in the store whose provenance is this run
	pub txs_synced: u64,
	pub failed_pages: Vec<u64>,
	pub stats: SyncStats,
}

impl SyncReport {
	pub fn is_complete(&self) -> bool {
		self.failed_pages.is_empty()
	}
}

/// Main coordinator for one address backfill.
///
/// Built with `prepare`, which computes the plan; `run` then executes it. The rate limiter
/// is owned by the orchestrator, so separate orchestrators never share pacing.
pub struct SyncOrchestrator {
	ledger: Arc<dyn SyncLedger>,
	fetcher: Arc<dyn PageFetcher>,
	rate_limiter: RateLimiter,
	address: String,
	settings: SyncSettings,
	plan: SyncPlan,
}

impl SyncOrchestrator {
	/// Compute what the address still owes and record the address.
	pub async fn prepare(
		ledger: Arc<dyn SyncLedger>,
		fetcher: Arc<dyn PageFetcher>,
		rate_limiter: RateLimiter,
		address: impl Into<String>,
		settings: SyncSettings,
	) -> Result<Self, TxSyncError> {
		settings.validate()?;
		let address = address.into();

		let total_num_txs = match settings.limit_num_results {
			Some(limit) => {
				info!(
					"Limiting sync to {} transactions (upstream total not queried)",
					limit
				);
				limit
			}
			None => fetcher.total_count(&address).await?,
		};

		ledger.upsert_address(&address).await?;
		let total_txs_synced = ledger
			.synced_tx_count(&address, settings.synced_scope)
			.await?;

		let plan = SyncPlan::compute(total_num_txs, total_txs_synced, settings.page_size);

		info!("Total number of address's txs: {}", plan.total_num_txs);
		info!("Total number of txs already synced: {}", plan.total_txs_synced);
		info!("Total number of address's pages: {}", plan.total_num_pages);
		info!("Total number of pages to sync: {}", plan.total_sync_pages);

		Ok(Self {
			ledger,
			fetcher,
			rate_limiter,
			address,
			settings,
			plan,
		})
	}

	pub fn plan(&self) -> &SyncPlan {
		&self.plan
	}

	pub fn address(&self) -> &str {
		&self.address
	}

	/// Run the sync to completion.
	///
	/// Does not return until every dispatched worker has finished. Page failures are recorded
	/// in the ledger and reported in the result; only ledger failures on the run record itself
	/// make this return an error.
	pub async fn run(&self) -> Result<SyncReport, TxSyncError> {
		info!(
			"Syncing txs for address {} using {}",
			self.address,
			self.fetcher.name()
		);

		let run_id = self
			.ledger
			.open_run(NewSyncRun {
				address: &self.address,
				total_sync_txs: self.plan.total_sync_txs,
				total_txs: self.plan.total_num_txs,
			})
			.await?;

		let worker = Arc::new(PageWorker::new(
			self.fetcher.clone(),
			self.ledger.clone(),
			self.address.clone(),
			self.plan.page_size,
			self.plan.total_sync_txs,
			self.settings.retry.clone(),
		));
		let permits = Arc::new(Semaphore::new(self.settings.max_in_flight));
		let mut workers = PageTasks::new();
		let mut tracker = SyncProgressTracker::new(self.plan.total_sync_pages);

		for page in 0..self.plan.total_sync_pages {
			let permit = permits
				.clone()
				.acquire_owned()
				.await
				.map_err(|_| TxSyncError::WorkerPoolClosed)?;
			let admitted_at = self.rate_limiter.admit().await;
			debug!(
				"Dispatching page {} at {:?} ({} workers running)",
				page,
				admitted_at,
				workers.len()
			);

			let worker = worker.clone();
			workers.spawn(page, async move {
				let outcome = worker.process(page, run_id).await;
				drop(permit);
				outcome
			});
			tracker.record_dispatched();

			while let Some(joined) = workers.try_join_next() {
				self.record_joined(joined, run_id, &mut tracker).await;
			}
		}

		while let Some(joined) = workers.join_next().await {
			self.record_joined(joined, run_id, &mut tracker).await;
		}

		let txs_synced = self.ledger.count_run_txs(run_id).await?;
		let stats = tracker.get_stats();
		self.ledger
			.close_run(run_id, txs_synced, stats.failed_pages.len() as u64)
			.await?;

		tracker.log_progress(true);
		info!("Sync run {} completed: {}", run_id, stats.summary());
		if !stats.failed_pages.is_empty() {
			warn!(
				"Sync run {} persisted {} of {} planned transactions",
				run_id, txs_synced, self.plan.total_sync_txs
			);
		}

		Ok(SyncReport {
			run_id,
			planned_pages: self.plan.total_sync_pages,
			total_sync_txs: self.plan.total_sync_txs,
			txs_synced,
			failed_pages: stats.failed_pages.clone(),
			stats,
		})
	}

	async fn record_joined(
		&self,
		joined: Result<PageOutcome, (Option<u64>, JoinError)>,
		run_id: SyncRunId,
		tracker: &mut SyncProgressTracker,
	) {
		match joined {
			Ok(outcome) => tracker.record_outcome(&outcome),
			Err((page, e)) => {
				// The worker never reached its own error recording.
				let Some(page) = page else {
					error!("Unknown page worker failed: {}", e);
					return;
				};
				error!("Worker for page {} did not finish: {}", page, e);
				tracker.record_failed(page);
				if let Err(record_err) = self
					.ledger
					.record_error(run_id, page, &format!("worker aborted: {}", e))
					.await
				{
					error!("Failed to record error for page {}: {}", page, record_err);
				}
			}
		}
		tracker.log_progress(false);
	}
}

/// Running page workers, each mapped back to its page until it is joined
struct PageTasks {
	tasks: JoinSet<PageOutcome>,
	pages: HashMap<Id, u64>,
}

impl PageTasks {
	fn new() -> Self {
		Self {
			tasks: JoinSet::new(),
			pages: HashMap::new(),
		}
	}

	fn spawn<F>(&mut self, page: u64, task: F)
	where
		F: Future<Output = PageOutcome> + Send + 'static,
	{
		let handle = self.tasks.spawn(task);
		self.pages.insert(handle.id(), page);
	}

	/// Workers spawned and not yet joined
	fn len(&self) -> usize {
		self.pages.len()
	}

	fn try_join_next(&mut self) -> Option<Result<PageOutcome, (Option<u64>, JoinError)>> {
		let joined = self.tasks.try_join_next_with_id()?;
		Some(self.settle(joined))
	}

	async fn join_next(&mut self) -> Option<Result<PageOutcome, (Option<u64>, JoinError)>> {
		let joined = self.tasks.join_next_with_id().await?;
		Some(self.settle(joined))
	}

	/// Drop the joined task's entry; a failed join keeps its page for attribution.
	fn settle(
		&mut self,
		joined: Result<(Id, PageOutcome), JoinError>,
	) -> Result<PageOutcome, (Option<u64>, JoinError)> {
		match joined {
			Ok((id, outcome)) => {
				self.pages.remove(&id);
				Ok(outcome)
			}
			Err(e) => Err((self.pages.remove(&e.id()), e)),
		}
	}
}
