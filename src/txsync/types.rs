use crate::upstream::FetchError;

/// Errors raised while reading or writing sync state in the store
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("Corrupt row: {0}")]
	CorruptRow(String),
}

/// Startup errors; none of these are recoverable
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Invalid setting: {0}")]
	InvalidSetting(String),

	#[error("Unsupported database URL: {0}")]
	UnsupportedDatabaseUrl(String),

	#[error("Failed to connect to storage: {0}")]
	Connect(sqlx::Error),

	#[error("Failed to create schema: {0}")]
	Migrate(sqlx::Error),

	#[error("Failed to build HTTP client: {0}")]
	HttpClient(FetchError),
}

/// Top-level error type for a sync
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum TxSyncError {
	#[error("Config error: {0}")]
	ConfigError(#[from] ConfigError),

	#[error("Fetch error: {0}")]
	FetchError(#[from] FetchError),

	#[error("Persist error: {0}")]
	PersistError(#[from] PersistError),

	#[error("Worker pool closed before all pages were dispatched")]
	WorkerPoolClosed,
}
