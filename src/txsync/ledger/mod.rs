//! Durable sync state.
//!
//! The ledger owns the four tables the engine reads and writes: `addresses`, `syncs`,
//! `sync_errors` and `txs`. Both backends give the same guarantees: every page is written
//! in its own transaction, and a `tx_id` that already exists is skipped rather than
//! rejected.

mod postgres;
mod sqlite;

pub use postgres::PostgresLedger;
pub use sqlite::SqliteLedger;

use crate::txsync::types::{ConfigError, PersistError};

use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;

/// Store-generated identifier of a sync run
pub type SyncRunId = i64;

/// Lifecycle of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
	Started,
	Completed,
}

impl SyncStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			SyncStatus::Started => "STARTED",
			SyncStatus::Completed => "COMPLETED",
		}
	}
}

impl FromStr for SyncStatus {
	type Err = PersistError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"STARTED" => Ok(SyncStatus::Started),
			"COMPLETED" => Ok(SyncStatus::Completed),
			other => Err(PersistError::CorruptRow(format!(
				"unknown sync status {:?}",
				other
			))),
		}
	}
}

/// One attempt to advance an address's sync
#[derive(Debug, Clone)]
pub struct SyncRun {
	pub id: SyncRunId,
	pub address: String,
	pub status: SyncStatus,
	/// Transactions this run actually persisted
	pub txs_synced: u64,
	/// Transactions the run planned to persist
	pub total_sync_txs: u64,
	/// Address total as known when the run opened
	pub total_txs: u64,
	pub failed_pages: u64,
	pub started_at: DateTime<Utc>,
	pub finished_at: Option<DateTime<Utc>>,
}

/// Values recorded when a run opens
#[derive(Debug, Clone)]
pub struct NewSyncRun<'a> {
	pub address: &'a str,
	pub total_sync_txs: u64,
	pub total_txs: u64,
}

/// A page-level failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncErrorRecord {
	pub sync_id: SyncRunId,
	pub page: u64,
	pub error: String,
}

/// A fetched transaction, serialized and ready to insert
#[derive(Debug, Clone)]
pub struct PendingTx {
	pub tx_id: String,
	pub raw: serde_json::Value,
}

/// Which prior runs count towards the already-synced total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SyncedScope {
	/// Only runs for the address under sync
	#[default]
	Address,
	/// Every run in the store, regardless of address
	Global,
}

/// Repository for sync runs, sync errors and persisted transactions
#[async_trait::async_trait]
pub trait SyncLedger: Send + Sync {
	/// Create the tables if they do not exist
	async fn migrate(&self) -> Result<(), ConfigError>;

	/// Insert the address if absent
	async fn upsert_address(&self, address: &str) -> Result<(), PersistError>;

	/// Sum of `txs_synced` over prior runs in the given scope
	async fn synced_tx_count(&self, address: &str, scope: SyncedScope)
	-> Result<u64, PersistError>;

	/// Open a run with status STARTED and zero synced transactions
	async fn open_run(&self, run: NewSyncRun<'_>) -> Result<SyncRunId, PersistError>;

	/// Persist one page in a single transaction, skipping ids that already exist.
	///
	/// Returns how many rows were actually inserted. On error nothing from the page
	/// is kept.
	async fn persist_page(
		&self,
		sync_id: SyncRunId,
		address: &str,
		page: u64,
		txs: &[PendingTx],
	) -> Result<u64, PersistError>;

	/// Append a page failure
	async fn record_error(
		&self,
		sync_id: SyncRunId,
		page: u64,
		error: &str,
	) -> Result<(), PersistError>;

	/// Number of transactions whose provenance is the given run
	async fn count_run_txs(&self, sync_id: SyncRunId) -> Result<u64, PersistError>;

	/// Mark the run COMPLETED with its final counts
	async fn close_run(
		&self,
		sync_id: SyncRunId,
		txs_synced: u64,
		failed_pages: u64,
	) -> Result<(), PersistError>;

	async fn get_run(&self, sync_id: SyncRunId) -> Result<Option<SyncRun>, PersistError>;

	async fn run_errors(&self, sync_id: SyncRunId) -> Result<Vec<SyncErrorRecord>, PersistError>;
}

/// Open the ledger named by `database_url` and make sure the schema exists.
///
/// `postgres://` and `postgresql://` select PostgreSQL; `sqlite:` selects SQLite.
pub async fn connect(
	database_url: &str,
	max_connections: u32,
) -> Result<Arc<dyn SyncLedger>, ConfigError> {
	let ledger: Arc<dyn SyncLedger> =
		if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
			Arc::new(PostgresLedger::connect(database_url, max_connections).await?)
		} else if database_url.starts_with("sqlite:") {
			Arc::new(SqliteLedger::connect(database_url).await?)
		} else {
			return Err(ConfigError::UnsupportedDatabaseUrl(database_url.to_string()));
		};

	ledger.migrate().await?;
	Ok(ledger)
}

/// Counts are stored as BIGINT; anything negative means the row was written by
/// something other than this crate.
fn to_count(value: i64, column: &str) -> Result<u64, PersistError> {
	u64::try_from(value)
		.map_err(|_| PersistError::CorruptRow(format!("negative {}: {}", column, value)))
}

fn to_db(value: u64) -> i64 {
	i64::try_from(value).unwrap_or(i64::MAX)
}

/// Row shape shared by both backends
#[derive(sqlx::FromRow)]
struct SyncRunRow {
	id: i64,
	address: String,
	status: String,
	txs_synced: i64,
	total_sync_txs: i64,
	total_txs: i64,
	failed_pages: i64,
	created_at: DateTime<Utc>,
	finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<SyncRunRow> for SyncRun {
	type Error = PersistError;

	fn try_from(row: SyncRunRow) -> Result<Self, Self::Error> {
		Ok(SyncRun {
			id: row.id,
			address: row.address,
			status: row.status.parse()?,
			txs_synced: to_count(row.txs_synced, "txs_synced")?,
			total_sync_txs: to_count(row.total_sync_txs, "total_sync_txs")?,
			total_txs: to_count(row.total_txs, "total_txs")?,
			failed_pages: to_count(row.failed_pages, "failed_pages")?,
			started_at: row.created_at,
			finished_at: row.finished_at,
		})
	}
}

#[derive(sqlx::FromRow)]
struct SyncErrorRow {
	sync_id: i64,
	page: i64,
	error: String,
}

impl TryFrom<SyncErrorRow> for SyncErrorRecord {
	type Error = PersistError;

	fn try_from(row: SyncErrorRow) -> Result<Self, Self::Error> {
		Ok(SyncErrorRecord {
			sync_id: row.sync_id,
			page: to_count(row.page, "page")?,
			error: row.error,
		})
	}
}
