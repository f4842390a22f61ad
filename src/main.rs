use address_tx_sync::config::Config;
use address_tx_sync::txsync::fetcher::{FakeFetcher, LiveFetcher, PageFetcher};
use address_tx_sync::txsync::ledger;
use address_tx_sync::txsync::rate_limiter::RateLimiter;
use address_tx_sync::txsync::{ConfigError, SyncOrchestrator, TxSyncError};
use address_tx_sync::upstream::CryptoApisClient;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
	// A missing .env is fine; the environment and flags still apply.
	let _ = dotenvy::dotenv();

	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::builder()
				.with_default_directive(tracing::Level::INFO.into())
				.from_env_lossy(),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let config = Config::parse();

	// Page failures are recorded in the store and do not fail the process.
	match run(config).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("Sync failed: {}", e);
			ExitCode::FAILURE
		}
	}
}

async fn run(config: Config) -> Result<(), TxSyncError> {
	config.validate()?;

	info!("Starting address transaction sync");

	let ledger = ledger::connect(&config.database_url, config.db_max_connections).await?;
	info!("Connected to ledger");

	let fetcher: Arc<dyn PageFetcher> = if config.fake {
		info!(
			"Fake mode: synthesizing {} transactions",
			config.fake_total_txs
		);
		Arc::new(FakeFetcher::new(config.fake_config()))
	} else {
		let api_key = config.api_key.clone().unwrap_or_default();
		let client = CryptoApisClient::new(
			config.api_base_url.clone(),
			api_key,
			config.api_context.clone(),
			config.request_timeout(),
		)
		.map_err(ConfigError::HttpClient)?;
		Arc::new(LiveFetcher::new(client))
	};

	let rate_limiter = RateLimiter::per_second(config.max_requests_per_second)?;

	let orchestrator = SyncOrchestrator::prepare(
		ledger,
		fetcher,
		rate_limiter,
		config.address.clone(),
		config.sync_settings(),
	)
	.await?;

	let report = orchestrator.run().await?;
	info!(
		"Run {} for {}: {} of {} planned transactions synced",
		report.run_id,
		orchestrator.address(),
		report.txs_synced,
		report.total_sync_txs
	);
	if !report.is_complete() {
		warn!(
			"{} pages failed after retries: {:?}",
			report.failed_pages.len(),
			report.failed_pages
		);
	}

	Ok(())
}
