use crate::txsync::pagination::items_on_page;
use crate::upstream::{
	BlockchainSpecific, CryptoApisClient, Fee, FetchError, ListedTransaction, Participant,
	ScriptPubKey, ScriptSig, TransactionItem, Vin, Vout,
};

use rand::Rng;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::debug;

/// Which slice of an address's history to fetch.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
	pub address: &'a str,
	/// Zero-based page index
	pub page: u64,
	pub page_size: u64,
	/// Transactions the current run owes across its whole page window.
	pub window_txs: u64,
}

impl PageRequest<'_> {
	pub fn offset(&self) -> u64 {
		self.page.saturating_mul(self.page_size)
	}
}

/// Source of transaction pages
///
/// The total count and the page reads are independent calls; callers must not assume
/// they agree with each other.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
	/// The address's total transaction count as the source reports it
	async fn total_count(&self, address: &str) -> Result<u64, FetchError>;

	/// Fetch one page of transaction items
	async fn fetch(&self, request: PageRequest<'_>) -> Result<Vec<ListedTransaction>, FetchError>;

	/// Get the name of this fetcher
	fn name(&self) -> &'static str;
}

/// Fetcher backed by the live upstream API
pub struct LiveFetcher {
	client: CryptoApisClient,
}

impl LiveFetcher {
	pub fn new(client: CryptoApisClient) -> Self {
		Self { client }
	}
}

#[async_trait::async_trait]
impl PageFetcher for LiveFetcher {
	async fn total_count(&self, address: &str) -> Result<u64, FetchError> {
		self.client.total_transactions(address).await
	}

	async fn fetch(&self, request: PageRequest<'_>) -> Result<Vec<ListedTransaction>, FetchError> {
		let envelope = self
			.client
			.list_transactions(request.address, request.page_size, request.offset())
			.await?;

		debug!(
			"Page {} returned {} items (upstream total {})",
			request.page,
			envelope.data.items.len(),
			envelope.data.total
		);
		Ok(envelope.data.items)
	}

	fn name(&self) -> &'static str {
		"LiveFetcher"
	}
}

/// Configuration for the synthetic fetcher
#[derive(Debug, Clone)]
pub struct FakeConfig {
	/// Fixed total reported by `total_count`
	pub total_txs: u64,
	/// Simulated request time, sampled uniformly per page
	pub latency: RangeInclusive<Duration>,
}

impl Default for FakeConfig {
	fn default() -> Self {
		Self {
			total_txs: 20,
			latency: Duration::from_millis(500)..=Duration::from_millis(2000),
		}
	}
}

/// Fetcher that generates synthetic pages locally.
///
/// Each page holds as many items as the run's page window predicts for it, and every
/// item gets a freshly generated transaction id.
pub struct FakeFetcher {
	config: FakeConfig,
}

impl FakeFetcher {
	pub fn new(config: FakeConfig) -> Self {
		Self { config }
	}

	/// Synthetic fetcher with no simulated latency
	pub fn instant(total_txs: u64) -> Self {
		Self::new(FakeConfig {
			total_txs,
			latency: Duration::ZERO..=Duration::ZERO,
		})
	}

	async fn simulate_latency(&self) {
		let (min, max) = (*self.config.latency.start(), *self.config.latency.end());
		let delay = if max > min {
			rand::rng().random_range(min..=max)
		} else {
			min
		};
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
	}
}

#[async_trait::async_trait]
impl PageFetcher for FakeFetcher {
	async fn total_count(&self, _address: &str) -> Result<u64, FetchError> {
		Ok(self.config.total_txs)
	}

	async fn fetch(&self, request: PageRequest<'_>) -> Result<Vec<ListedTransaction>, FetchError> {
		self.simulate_latency().await;

		let window = request.window_txs.min(self.config.total_txs);
		let count = items_on_page(request.page, request.page_size, window);
		debug!("Generating {} synthetic items for page {}", count, request.page);

		let items = (0..count)
			.map(|i| {
				let item = synthetic_item(request.address, request.offset() + i);
				ListedTransaction::try_from(&item)
			})
			.collect::<Result<Vec<_>, _>>()?;
		Ok(items)
	}

	fn name(&self) -> &'static str {
		"FakeFetcher"
	}
}

/// A plausibly shaped transaction with a fresh id.
fn synthetic_item(address: &str, index: u64) -> TransactionItem {
	let transaction_id = uuid::Uuid::new_v4().to_string();
	let counterparty = "bc1q33rx2yy9hamzur4ach8ecl7c7kq75lms75arq2".to_string();

	TransactionItem {
		transaction_hash: transaction_id.clone(),
		transaction_id,
		index,
		mined_in_block_hash: "0000000000000000000199dcfdf7852c9425a671fffa01e379dc133f5edb6fa5"
			.to_string(),
		mined_in_block_height: 831087,
		recipients: vec![Participant {
			address: counterparty.clone(),
			amount: "1.99984000".to_string(),
		}],
		senders: vec![Participant {
			address: address.to_string(),
			amount: "1.99994000".to_string(),
		}],
		timestamp: chrono::Utc::now().timestamp(),
		blockchain_specific: BlockchainSpecific {
			locktime: 0,
			size: 222,
			vsize: 141,
			version: 2,
			vin: vec![Vin {
				addresses: vec![address.to_string()],
				script_sig: ScriptSig {
					asm: String::new(),
					hex: String::new(),
					kind: String::new(),
				},
				sequence: "4294967293".to_string(),
				txid: "6c1a1d2f6e5e0d7a4c3b2a19080706050403020100ffeeddccbbaa9988776655"
					.to_string(),
				txinwitness: vec![],
				value: "1.99994000".to_string(),
				vout: 0,
			}],
			vout: vec![Vout {
				is_spent: false,
				script_pub_key: ScriptPubKey {
					addresses: vec![counterparty],
					asm: "0 8c466510c5bf762e0ebdc5cf9c7fd8f581ea7f70".to_string(),
					hex: "00148c466510c5bf762e0ebdc5cf9c7fd8f581ea7f70".to_string(),
					kind: "witness_v0_keyhash".to_string(),
				},
				value: "1.99984000".to_string(),
			}],
		},
		fee: Fee {
			amount: "0.0001".to_string(),
			unit: "BTC".to_string(),
		},
	}
}
