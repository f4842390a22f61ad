use super::*;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS addresses (
	id INTEGER PRIMARY KEY AUTOINCREMENT,
	address TEXT UNIQUE NOT NULL,
	created_at DATETIME
);

CREATE TABLE IF NOT EXISTS syncs (
	id INTEGER PRIMARY KEY AUTOINCREMENT,
	address TEXT NOT NULL,
	status TEXT NOT NULL,
	txs_synced INTEGER NOT NULL DEFAULT 0,
	total_sync_txs INTEGER NOT NULL,
	total_txs INTEGER NOT NULL,
	failed_pages INTEGER NOT NULL DEFAULT 0,
	created_at DATETIME NOT NULL,
	finished_at DATETIME
);

CREATE TABLE IF NOT EXISTS sync_errors (
	id INTEGER PRIMARY KEY AUTOINCREMENT,
	sync_id INTEGER NOT NULL,
	page INTEGER NOT NULL,
	error TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS txs (
	id INTEGER PRIMARY KEY AUTOINCREMENT,
	address TEXT NOT NULL,
	tx_id TEXT UNIQUE NOT NULL,
	raw TEXT NOT NULL,
	page INTEGER NOT NULL,
	created_at DATETIME NOT NULL,
	sync_id INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_syncs_address ON syncs (address);
CREATE INDEX IF NOT EXISTS idx_txs_sync_id ON txs (sync_id);
"#;

/// SQLite-backed ledger for local runs and tests; raw payloads are stored as JSON text
pub struct SqliteLedger {
	pool: SqlitePool,
}

impl SqliteLedger {
	/// Open (or create) the database at `database_url`, e.g. `sqlite:txs.db` or `sqlite::memory:`.
	pub async fn connect(database_url: &str) -> Result<Self, ConfigError> {
		let opts = SqliteConnectOptions::from_str(database_url)
			.map_err(ConfigError::Connect)?
			.create_if_missing(true)
			.journal_mode(SqliteJournalMode::Wal)
			.busy_timeout(Duration::from_secs(5));

		// SQLite has a single writer; one connection keeps page transactions queued
		// instead of failing with "database is locked". It also keeps an in-memory
		// database alive for the life of the pool.
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.idle_timeout(None)
			.max_lifetime(None)
			.connect_with(opts)
			.await
			.map_err(ConfigError::Connect)?;

		info!("Opened SQLite ledger at {}", database_url);
		Ok(Self { pool })
	}

	/// Open an in-memory ledger with the schema already applied
	pub async fn in_memory() -> Result<Self, ConfigError> {
		let ledger = Self::connect("sqlite::memory:").await?;
		ledger.migrate().await?;
		Ok(ledger)
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}

#[async_trait::async_trait]
impl SyncLedger for SqliteLedger {
	async fn migrate(&self) -> Result<(), ConfigError> {
		sqlx::raw_sql(SCHEMA_SQL)
			.execute(&self.pool)
			.await
			.map_err(ConfigError::Migrate)?;
		Ok(())
	}

	async fn upsert_address(&self, address: &str) -> Result<(), PersistError> {
		sqlx::query(
			"INSERT INTO addresses (address, created_at) VALUES (?, ?) ON CONFLICT (address) DO NOTHING",
		)
		.bind(address)
		.bind(Utc::now())
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	async fn synced_tx_count(
		&self,
		address: &str,
		scope: SyncedScope,
	) -> Result<u64, PersistError> {
		let total: i64 = match scope {
			SyncedScope::Address => {
				sqlx::query_scalar("SELECT COALESCE(SUM(txs_synced), 0) FROM syncs WHERE address = ?")
					.bind(address)
					.fetch_one(&self.pool)
					.await?
			}
			SyncedScope::Global => {
				sqlx::query_scalar("SELECT COALESCE(SUM(txs_synced), 0) FROM syncs")
					.fetch_one(&self.pool)
					.await?
			}
		};
		to_count(total, "txs_synced")
	}

	async fn open_run(&self, run: NewSyncRun<'_>) -> Result<SyncRunId, PersistError> {
		let id: i64 = sqlx::query_scalar(
			"INSERT INTO syncs (address, status, txs_synced, total_sync_txs, total_txs, created_at) VALUES (?, ?, 0, ?, ?, ?) RETURNING id",
		)
		.bind(run.address)
		.bind(SyncStatus::Started.as_str())
		.bind(to_db(run.total_sync_txs))
		.bind(to_db(run.total_txs))
		.bind(Utc::now())
		.fetch_one(&self.pool)
		.await?;
		Ok(id)
	}

	async fn persist_page(
		&self,
		sync_id: SyncRunId,
		address: &str,
		page: u64,
		txs: &[PendingTx],
	) -> Result<u64, PersistError> {
		let now = Utc::now();
		let mut tx = self.pool.begin().await?;
		let mut inserted = 0u64;

		for pending in txs {
			let result = sqlx::query(
				"INSERT INTO txs (address, tx_id, sync_id, raw, page, created_at) VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT (tx_id) DO NOTHING",
			)
			.bind(address)
			.bind(&pending.tx_id)
			.bind(sync_id)
			.bind(pending.raw.to_string())
			.bind(to_db(page))
			.bind(now)
			.execute(&mut *tx)
			.await?;
			inserted += result.rows_affected();
		}

		tx.commit().await?;
		debug!(
			"Committed page {}: {} of {} transactions inserted",
			page,
			inserted,
			txs.len()
		);
		Ok(inserted)
	}

	async fn record_error(
		&self,
		sync_id: SyncRunId,
		page: u64,
		error: &str,
	) -> Result<(), PersistError> {
		sqlx::query("INSERT INTO sync_errors (sync_id, page, error) VALUES (?, ?, ?)")
			.bind(sync_id)
			.bind(to_db(page))
			.bind(error)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn count_run_txs(&self, sync_id: SyncRunId) -> Result<u64, PersistError> {
		let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM txs WHERE sync_id = ?")
			.bind(sync_id)
			.fetch_one(&self.pool)
			.await?;
		to_count(count, "count")
	}

	async fn close_run(
		&self,
		sync_id: SyncRunId,
		txs_synced: u64,
		failed_pages: u64,
	) -> Result<(), PersistError> {
		let result = sqlx::query(
			"UPDATE syncs SET status = ?, finished_at = ?, txs_synced = ?, failed_pages = ? WHERE id = ?",
		)
		.bind(SyncStatus::Completed.as_str())
		.bind(Utc::now())
		.bind(to_db(txs_synced))
		.bind(to_db(failed_pages))
		.bind(sync_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(PersistError::CorruptRow(format!(
				"sync run {} not found",
				sync_id
			)));
		}
		Ok(())
	}

	async fn get_run(&self, sync_id: SyncRunId) -> Result<Option<SyncRun>, PersistError> {
		let row = sqlx::query_as::<_, SyncRunRow>(
			"SELECT id, address, status, txs_synced, total_sync_txs, total_txs, failed_pages, created_at, finished_at FROM syncs WHERE id = ?",
		)
		.bind(sync_id)
		.fetch_optional(&self.pool)
		.await?;
		row.map(SyncRun::try_from).transpose()
	}

	async fn run_errors(&self, sync_id: SyncRunId) -> Result<Vec<SyncErrorRecord>, PersistError> {
		let rows = sqlx::query_as::<_, SyncErrorRow>(
			"SELECT sync_id, page, error FROM sync_errors WHERE sync_id = ? ORDER BY page, id",
		)
		.bind(sync_id)
		.fetch_all(&self.pool)
		.await?;
		rows.into_iter().map(SyncErrorRecord::try_from).collect()
	}
}
