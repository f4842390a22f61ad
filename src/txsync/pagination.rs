//! Page arithmetic for a sync run.
//!
//! Pages are zero-based. Page `p` covers transactions `[p * page_size, (p + 1) * page_size)`,
//! so the last page may be partial and pages past the end are empty.

/// Number of pages needed to cover `txs` transactions.
pub fn pages_for(txs: u64, page_size: u64) -> u64 {
	if page_size == 0 {
		return 0;
	}
	txs.div_ceil(page_size)
}

/// Number of items expected on page `page` out of `total_txs`, clamped to `[0, page_size]`.
pub fn items_on_page(page: u64, page_size: u64, total_txs: u64) -> u64 {
	let start = page.saturating_mul(page_size);
	let end = start.saturating_add(page_size).min(total_txs);
	end.saturating_sub(start)
}

/// What a sync run owes, computed once before the run opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPlan {
	pub page_size: u64,
	/// The address's total transaction count as known at start
	pub total_num_txs: u64,
	pub total_num_pages: u64,
	/// Sum of `txs_synced` across prior runs
	pub total_txs_synced: u64,
	/// Transactions still owed
	pub total_sync_txs: u64,
	/// Pages still owed
	pub total_sync_pages: u64,
}

impl SyncPlan {
	/// Derive the plan from the known total and what prior runs already persisted.
	///
	/// If prior runs report more than the current total (e.g. the total was lowered
	/// by an override), nothing is owed.
	pub fn compute(total_num_txs: u64, total_txs_synced: u64, page_size: u64) -> Self {
		let total_sync_txs = total_num_txs.saturating_sub(total_txs_synced);
		Self {
			page_size,
			total_num_txs,
			total_num_pages: pages_for(total_num_txs, page_size),
			total_txs_synced,
			total_sync_txs,
			total_sync_pages: pages_for(total_sync_txs, page_size),
		}
	}

	pub fn is_up_to_date(&self) -> bool {
		self.total_sync_pages == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_pages_for_rounds_up() {
		assert_eq!(pages_for(20, 1), 20);
		assert_eq!(pages_for(20, 7), 3);
		assert_eq!(pages_for(21, 7), 3);
		assert_eq!(pages_for(22, 7), 4);
		assert_eq!(pages_for(0, 7), 0);
		assert_eq!(pages_for(5, 0), 0);
	}

	#[test]
	fn test_last_page_is_partial_and_past_end_is_empty() {
		assert_eq!(items_on_page(0, 7, 20), 7);
		assert_eq!(items_on_page(1, 7, 20), 7);
		assert_eq!(items_on_page(2, 7, 20), 6);
		assert_eq!(items_on_page(3, 7, 20), 0);
		assert_eq!(items_on_page(u64::MAX, 7, 20), 0);
	}

	#[test]
	fn test_fresh_plan() {
		let plan = SyncPlan::compute(20, 0, 1);
		assert_eq!(plan.total_num_pages, 20);
		assert_eq!(plan.total_sync_pages, 20);
		assert_eq!(plan.total_sync_txs, 20);
		assert!(!plan.is_up_to_date());
	}

	#[test]
	fn test_partial_resume_plan() {
		let plan = SyncPlan::compute(20, 12, 1);
		assert_eq!(plan.total_num_pages, 20);
		assert_eq!(plan.total_sync_pages, 8);
		assert_eq!(plan.total_sync_txs, 8);
	}

	#[test]
	fn test_oversynced_plan_owes_nothing() {
		let plan = SyncPlan::compute(10, 20, 3);
		assert_eq!(plan.total_sync_txs, 0);
		assert_eq!(plan.total_sync_pages, 0);
		assert!(plan.is_up_to_date());
	}
}
