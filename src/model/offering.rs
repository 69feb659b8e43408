use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An offering as fetched from its `descriptionUri`. `id` is the ledger-level
/// routing key (see the data model notes on routing-key stability); `payload`
/// is the raw JSON-LD body, stored and forwarded byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offering {
	pub id: String,
	pub payload: Value,
}
