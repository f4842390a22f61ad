//! Command-line and environment configuration.

use crate::txsync::fetcher::FakeConfig;
use crate::txsync::ledger::SyncedScope;
use crate::txsync::worker::RetryPolicy;
use crate::txsync::{ConfigError, SyncSettings};

use clap::Parser;
use std::time::Duration;

/// Backfill an address's transaction history into a SQL store
#[derive(Debug, Clone, Parser)]
#[command(name = "address-tx-sync", version, about)]
pub struct Config {
	/// Address to backfill
	#[arg(long, env = "TXSYNC_ADDRESS")]
	pub address: String,

	/// `postgres://...` or `sqlite:...`
	#[arg(long, env = "DATABASE_URL")]
	pub database_url: String,

	#[arg(long, env = "TXSYNC_DB_MAX_CONNECTIONS", default_value_t = 10)]
	pub db_max_connections: u32,

	#[arg(
		long,
		env = "TXSYNC_API_BASE_URL",
		default_value = "https://rest.cryptoapis.io/blockchain-data/bitcoin/mainnet"
	)]
	pub api_base_url: String,

	/// Sent as `X-API-Key`; required unless `--fake` is set
	#[arg(long, env = "TXSYNC_API_KEY", hide_env_values = true)]
	pub api_key: Option<String>,

	#[arg(long, env = "TXSYNC_API_CONTEXT", default_value = "address-tx-sync")]
	pub api_context: String,

	/// Per-request deadline for upstream calls
	#[arg(long, env = "TXSYNC_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
	pub request_timeout_secs: u64,

	#[arg(long, env = "TXSYNC_PAGE_SIZE", default_value_t = 50)]
	pub page_size: u64,

	#[arg(long, env = "TXSYNC_MAX_RPS", default_value_t = 10)]
	pub max_requests_per_second: u32,

	/// Pages fetched or persisted at the same time
	#[arg(long, env = "TXSYNC_MAX_IN_FLIGHT", default_value_t = 16)]
	pub max_in_flight: usize,

	/// Attempts per page before it is recorded as failed
	#[arg(long, env = "TXSYNC_MAX_ATTEMPTS", default_value_t = 3)]
	pub max_attempts: u32,

	#[arg(long, env = "TXSYNC_RETRY_INITIAL_MS", default_value_t = 500)]
	pub retry_initial_ms: u64,

	#[arg(long, env = "TXSYNC_RETRY_MAX_MS", default_value_t = 10_000)]
	pub retry_max_ms: u64,

	/// Use this total instead of asking the upstream
	#[arg(long, env = "TXSYNC_LIMIT_NUM_RESULTS")]
	pub limit_num_results: Option<u64>,

	/// Which prior runs count as already synced
	#[arg(long, env = "TXSYNC_SYNCED_SCOPE", value_enum, default_value_t = SyncedScope::Address)]
	pub synced_scope: SyncedScope,

	/// Generate synthetic transactions instead of calling the upstream
	#[arg(long, env = "TXSYNC_FAKE")]
	pub fake: bool,

	#[arg(long, env = "TXSYNC_FAKE_TOTAL_TXS", default_value_t = 20)]
	pub fake_total_txs: u64,

	#[arg(long, env = "TXSYNC_FAKE_LATENCY_MIN_MS", default_value_t = 500)]
	pub fake_latency_min_ms: u64,

	#[arg(long, env = "TXSYNC_FAKE_LATENCY_MAX_MS", default_value_t = 2000)]
	pub fake_latency_max_ms: u64,
}

impl Config {
	/// Check cross-field constraints clap cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.sync_settings().validate()?;

		if self.max_requests_per_second == 0 {
			return Err(ConfigError::InvalidSetting(
				"max requests per second must be greater than zero".to_string(),
			));
		}
		if self.fake_latency_min_ms > self.fake_latency_max_ms {
			return Err(ConfigError::InvalidSetting(format!(
				"fake latency range is inverted: {}ms > {}ms",
				self.fake_latency_min_ms, self.fake_latency_max_ms
			)));
		}
		if !self.fake && self.api_key.as_deref().is_none_or(str::is_empty) {
			return Err(ConfigError::InvalidSetting(
				"an API key is required unless --fake is set".to_string(),
			));
		}
		Ok(())
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn sync_settings(&self) -> SyncSettings {
		SyncSettings {
			page_size: self.page_size,
			max_in_flight: self.max_in_flight,
			retry: RetryPolicy {
				max_attempts: self.max_attempts,
				initial_interval: Duration::from_millis(self.retry_initial_ms),
				max_interval: Duration::from_millis(self.retry_max_ms),
				..RetryPolicy::default()
			},
			limit_num_results: self.limit_num_results,
			synced_scope: self.synced_scope,
		}
	}

	pub fn fake_config(&self) -> FakeConfig {
		FakeConfig {
			total_txs: self.fake_total_txs,
			latency: Duration::from_millis(self.fake_latency_min_ms)
				..=Duration::from_millis(self.fake_latency_max_ms),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(args: &[&str]) -> Config {
		let mut argv = vec![
			"address-tx-sync",
			"--address",
			"bc1qm34lsc65zpw79lxes69zkqmk6ee3ewf0j77s3h",
			"--database-url",
			"sqlite::memory:",
		];
		argv.extend_from_slice(args);
		Config::try_parse_from(argv).unwrap()
	}

	#[test]
	fn test_defaults() {
		let config = parse(&["--fake"]);
		assert_eq!(config.page_size, 50);
		assert_eq!(config.max_requests_per_second, 10);
		assert_eq!(config.synced_scope, SyncedScope::Address);
		assert!(config.limit_num_results.is_none());
		config.validate().unwrap();

		let settings = config.sync_settings();
		assert_eq!(settings.retry.max_attempts, 3);
		assert_eq!(settings.retry.initial_interval, Duration::from_millis(500));
	}

	#[test]
	fn test_live_mode_requires_api_key() {
		let config = parse(&["--api-key", ""]);
		assert!(matches!(
			config.validate(),
			Err(ConfigError::InvalidSetting(_))
		));
		parse(&["--api-key", "secret"]).validate().unwrap();
	}

	#[test]
	fn test_rejects_zero_page_size_and_inverted_latency() {
		assert!(parse(&["--fake", "--page-size", "0"]).validate().is_err());
		assert!(parse(&["--fake", "--max-requests-per-second", "0"])
			.validate()
			.is_err());
		assert!(
			parse(&[
				"--fake",
				"--fake-latency-min-ms",
				"900",
				"--fake-latency-max-ms",
				"100"
			])
			.validate()
			.is_err()
		);
	}

	#[test]
	fn test_global_scope_and_limit() {
		let config = parse(&["--fake", "--synced-scope", "global", "--limit-num-results", "10"]);
		let settings = config.sync_settings();
		assert_eq!(settings.synced_scope, SyncedScope::Global);
		assert_eq!(settings.limit_num_results, Some(10));
	}
}
