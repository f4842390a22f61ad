//!
//! HTTP client for the paginated address transaction listing.
//!
//! Issues `GET {base}/addresses/{address}/transactions?context=..&limit=..&offset=..`
//! with the API key header and decodes the response envelope.

use super::types::*;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Client for the transaction-history API
#[derive(Clone)]
pub struct CryptoApisClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL, e.g. `https://rest.cryptoapis.io/blockchain-data/bitcoin/mainnet`.
	base_url: String,
	/// Value sent in the `X-API-Key` header.
	api_key: String,
	/// Opaque `context` query value echoed back by the upstream.
	context: String,
}

impl CryptoApisClient {
	/// Create a new client.
	///
	/// # Arguments
	/// * `base_url` - The blockchain-data base URL (no trailing slash required).
	/// * `api_key` - The API key sent with every request.
	/// * `context` - Opaque context string.
	/// * `timeout` - Per-request deadline; bounds how long a stalled page can hold a worker.
	pub fn new(
		base_url: impl Into<String>,
		api_key: impl Into<String>,
		context: impl Into<String>,
		timeout: Duration,
	) -> Result<Self, FetchError> {
		let http_client = Client::builder().timeout(timeout).build()?;

		Ok(Self {
			http_client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			api_key: api_key.into(),
			context: context.into(),
		})
	}

	fn transactions_url(&self, address: &str) -> String {
		format!("{}/addresses/{}/transactions", self.base_url, address)
	}

	/// Fetch one page of an address's transactions.
	///
	/// # Returns
	/// The decoded envelope, or a `FetchError` on transport failure, non-2xx status,
	/// or an undecodable body.
	pub async fn list_transactions(
		&self,
		address: &str,
		limit: u64,
		offset: u64,
	) -> Result<ApiResponse, FetchError> {
		let url = self.transactions_url(address);
		debug!("GET {} limit={} offset={}", url, limit, offset);

		let response = self
			.http_client
			.get(&url)
			.header("Content-Type", "application/json")
			.header("X-API-Key", &self.api_key)
			.query(&[
				("context", self.context.clone()),
				("limit", limit.to_string()),
				("offset", offset.to_string()),
			])
			.send()
			.await?;

		let status = response.status();
		let body = response.text().await?;

		if !status.is_success() {
			return Err(FetchError::Status {
				status: status.as_u16(),
				body,
			});
		}

		let envelope: ApiResponse = serde_json::from_str(&body)?;
		Ok(envelope)
	}

	/// Ask the upstream for the address's total transaction count.
	///
	/// Uses a one-item page; only `data.total` is read.
	pub async fn total_transactions(&self, address: &str) -> Result<u64, FetchError> {
		let envelope = self.list_transactions(address, 1, 0).await?;
		Ok(envelope.data.total)
	}
}
