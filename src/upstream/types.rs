//! Types for the upstream transaction-history envelope

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Response envelope returned by the transaction listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
	pub api_version: String,
	pub request_id: String,
	#[serde(default)]
	pub context: String,
	pub data: PageData,
}

/// One page of results together with the address's total transaction count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageData {
	pub limit: u64,
	pub offset: u64,
	/// Total number of transactions the upstream knows for the address.
	pub total: u64,
	#[serde(default, deserialize_with = "null_as_empty")]
	pub items: Vec<ListedTransaction>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
	D: Deserializer<'de>,
	T: Deserialize<'de>,
{
	Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A listed transaction, kept exactly as the upstream sent it.
///
/// Only `transactionId` is interpreted. The payload is stored verbatim, so fields this
/// crate does not model survive and loosely typed ones (nulls, missing arrays) never
/// fail a page.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedTransaction {
	transaction_id: String,
	payload: Value,
}

impl ListedTransaction {
	pub fn transaction_id(&self) -> &str {
		&self.transaction_id
	}

	/// Position in the address's history, when the upstream reports one
	pub fn index(&self) -> Option<u64> {
		self.payload.get("index").and_then(Value::as_u64)
	}

	pub fn payload(&self) -> &Value {
		&self.payload
	}

	pub fn into_payload(self) -> Value {
		self.payload
	}

	/// Replace the id in both the key and the payload.
	pub fn set_transaction_id(&mut self, transaction_id: impl Into<String>) {
		let transaction_id = transaction_id.into();
		if let Some(fields) = self.payload.as_object_mut() {
			fields.insert(
				"transactionId".to_string(),
				Value::String(transaction_id.clone()),
			);
		}
		self.transaction_id = transaction_id;
	}
}

impl TryFrom<Value> for ListedTransaction {
	type Error = String;

	fn try_from(payload: Value) -> Result<Self, Self::Error> {
		let transaction_id = payload
			.get("transactionId")
			.and_then(Value::as_str)
			.filter(|id| !id.is_empty())
			.ok_or_else(|| "listed transaction has no transactionId".to_string())?
			.to_string();
		Ok(Self {
			transaction_id,
			payload,
		})
	}
}

impl TryFrom<&TransactionItem> for ListedTransaction {
	type Error = serde_json::Error;

	fn try_from(item: &TransactionItem) -> Result<Self, Self::Error> {
		let payload = serde_json::to_value(item)?;
		Self::try_from(payload).map_err(<serde_json::Error as serde::de::Error>::custom)
	}
}

impl<'de> Deserialize<'de> for ListedTransaction {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let payload = Value::deserialize(deserializer)?;
		Self::try_from(payload).map_err(serde::de::Error::custom)
	}
}

impl Serialize for ListedTransaction {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		self.payload.serialize(serializer)
	}
}

/// Typed view of a listed Bitcoin transaction, used to generate synthetic items
/// with the upstream's field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
	/// Business key; unique across the whole store.
	pub transaction_id: String,
	pub index: u64,
	pub mined_in_block_hash: String,
	pub mined_in_block_height: u64,
	pub recipients: Vec<Participant>,
	pub senders: Vec<Participant>,
	/// Unix seconds.
	pub timestamp: i64,
	pub transaction_hash: String,
	pub blockchain_specific: BlockchainSpecific,
	pub fee: Fee,
}

/// An address and the decimal-string amount it sent or received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
	pub address: String,
	pub amount: String,
}

/// Bitcoin-specific transaction details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockchainSpecific {
	pub locktime: u64,
	pub size: u64,
	#[serde(rename = "vSize")]
	pub vsize: u64,
	pub version: u32,
	pub vin: Vec<Vin>,
	pub vout: Vec<Vout>,
}

/// Transaction input with its previous-output reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vin {
	pub addresses: Vec<String>,
	#[serde(rename = "scriptSig")]
	pub script_sig: ScriptSig,
	pub sequence: String,
	pub txid: String,
	#[serde(default)]
	pub txinwitness: Vec<String>,
	pub value: String,
	pub vout: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSig {
	pub asm: String,
	pub hex: String,
	#[serde(rename = "type")]
	pub kind: String,
}

/// Transaction output and whether it has been spent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vout {
	#[serde(rename = "isSpent")]
	pub is_spent: bool,
	#[serde(rename = "scriptPubKey")]
	pub script_pub_key: ScriptPubKey,
	pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptPubKey {
	pub addresses: Vec<String>,
	pub asm: String,
	pub hex: String,
	#[serde(rename = "type")]
	pub kind: String,
}

/// Fee paid, as a decimal string plus unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
	pub amount: String,
	pub unit: String,
}

/// Error types for upstream fetches
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
	#[error("HTTP transport error: {0}")]
	Transport(#[from] reqwest::Error),

	#[error("Upstream returned status {status}: {body}")]
	Status { status: u16, body: String },

	#[error("Envelope decode error: {0}")]
	Decode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
	use super::*;

	const ENVELOPE: &str = r#"{
		"apiVersion": "2023-04-25",
		"requestId": "65d2fb451c6fef68c2c4081b",
		"context": "ctx",
		"data": {
			"limit": 1,
			"offset": 2,
			"total": 1305156,
			"items": [{
				"transactionId": "793b769c67e022961dfc72acff0aeb275d9ea54f6f71450d283e852a79f296a6",
				"index": 30,
				"minedInBlockHash": "0000000000000000000199dcfdf7852c9425a671fffa01e379dc133f5edb6fa5",
				"minedInBlockHeight": 831087,
				"recipients": [{"address": "bc1q33rx2yy9hamzur4ach8ecl7c7kq75lms75arq2", "amount": "1.99984000"}],
				"senders": [{"address": "bc1qm34lsc65zpw79lxes69zkqmk6ee3ewf0j77s3h", "amount": "5.52071285"}],
				"timestamp": 1708325609,
				"transactionHash": "793b769c67e022961dfc72acff0aeb275d9ea54f6f71450d283e852a79f296a6",
				"blockchainSpecific": {
					"locktime": 0,
					"size": 380,
					"vSize": 299,
					"version": 2,
					"vin": [{
						"addresses": ["bc1qm34lsc65zpw79lxes69zkqmk6ee3ewf0j77s3h"],
						"scriptSig": {"asm": "", "hex": "", "type": ""},
						"sequence": "4294967293",
						"txid": "6c1a1d2f6e5e0d7a4c3b2a19080706050403020100ffeeddccbbaa9988776655",
						"txinwitness": ["3044", "02ab"],
						"value": "5.52081285",
						"vout": 1
					}],
					"vout": [{
						"isSpent": false,
						"scriptPubKey": {
							"addresses": ["bc1q33rx2yy9hamzur4ach8ecl7c7kq75lms75arq2"],
							"asm": "0 8c466510c5bf762e0ebdc5cf9c7fd8f581ea7f70",
							"hex": "00148c466510c5bf762e0ebdc5cf9c7fd8f581ea7f70",
							"type": "witness_v0_keyhash"
						},
						"value": "1.99984000"
					}]
				},
				"fee": {"amount": "0.0001", "unit": "BTC"}
			}]
		}
	}"#;

	#[test]
	fn test_decode_envelope() {
		let response: ApiResponse = serde_json::from_str(ENVELOPE).unwrap();
		assert_eq!(response.data.total, 1305156);
		assert_eq!(response.data.items.len(), 1);

		let listed = &response.data.items[0];
		assert_eq!(
			listed.transaction_id(),
			"793b769c67e022961dfc72acff0aeb275d9ea54f6f71450d283e852a79f296a6"
		);
		assert_eq!(listed.index(), Some(30));

		let item: TransactionItem = serde_json::from_value(listed.payload().clone()).unwrap();
		assert_eq!(item.mined_in_block_height, 831087);
		assert_eq!(item.blockchain_specific.vsize, 299);
		assert_eq!(item.blockchain_specific.vin[0].txinwitness.len(), 2);
		assert_eq!(
			item.blockchain_specific.vout[0].script_pub_key.kind,
			"witness_v0_keyhash"
		);
		assert_eq!(item.fee.unit, "BTC");
	}

	#[test]
	fn test_item_serializes_with_upstream_field_names() {
		let response: ApiResponse = serde_json::from_str(ENVELOPE).unwrap();
		let item: TransactionItem =
			serde_json::from_value(response.data.items[0].payload().clone()).unwrap();
		let raw = ListedTransaction::try_from(&item).unwrap().into_payload();

		assert!(raw.get("transactionId").is_some());
		assert!(raw["blockchainSpecific"].get("vSize").is_some());
		assert!(raw["blockchainSpecific"]["vout"][0].get("isSpent").is_some());
		assert_eq!(raw["blockchainSpecific"]["vin"][0]["scriptSig"]["type"], "");
	}

	#[test]
	fn test_missing_items_defaults_to_empty() {
		let body = r#"{"apiVersion":"v","requestId":"r","data":{"limit":5,"offset":50,"total":20}}"#;
		let response: ApiResponse = serde_json::from_str(body).unwrap();
		assert!(response.data.items.is_empty());
		assert_eq!(response.context, "");

		let body = r#"{"apiVersion":"v","requestId":"r","data":{"limit":5,"offset":50,"total":20,"items":null}}"#;
		let response: ApiResponse = serde_json::from_str(body).unwrap();
		assert!(response.data.items.is_empty());
	}

	#[test]
	fn test_listed_payload_is_kept_verbatim() {
		let body = r#"{"apiVersion":"v","requestId":"r","data":{"limit":1,"offset":0,"total":1,"items":[{
			"transactionId": "abc",
			"index": 0,
			"coinbaseData": "03a0ae0c",
			"blockchainSpecific": {"vin": [{"addresses": null, "txinwitness": null}], "vout": []},
			"fee": null
		}]}}"#;
		let response: ApiResponse = serde_json::from_str(body).unwrap();
		let listed = &response.data.items[0];
		assert_eq!(listed.transaction_id(), "abc");

		let raw = serde_json::to_value(listed).unwrap();
		assert_eq!(raw["coinbaseData"], "03a0ae0c");
		assert!(raw["blockchainSpecific"]["vin"][0]["addresses"].is_null());
		assert!(raw["fee"].is_null());
		assert_eq!(&raw, listed.payload());
	}

	#[test]
	fn test_item_without_transaction_id_is_a_decode_error() {
		for item in [r#"{"index": 3}"#, r#"{"transactionId": ""}"#, r#"{"transactionId": 7}"#] {
			let body = format!(
				r#"{{"apiVersion":"v","requestId":"r","data":{{"limit":1,"offset":0,"total":1,"items":[{}]}}}}"#,
				item
			);
			let err = serde_json::from_str::<ApiResponse>(&body).unwrap_err();
			assert!(err.to_string().contains("transactionId"), "{}", err);
		}
	}

	#[test]
	fn test_set_transaction_id_updates_payload() {
		let mut listed = ListedTransaction::try_from(serde_json::json!({
			"transactionId": "old",
			"index": 4
		}))
		.unwrap();
		listed.set_transaction_id("tx-4");
		assert_eq!(listed.transaction_id(), "tx-4");
		assert_eq!(listed.payload()["transactionId"], "tx-4");
		assert_eq!(listed.index(), Some(4));
	}
}
