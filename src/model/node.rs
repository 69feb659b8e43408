use serde::{Deserialize, Serialize};

/// A catalogue node's health as tracked by the Health Supervisor. Ring
/// membership is a separate concept: a node can be `Unhealthy` and still
/// hold ring slots during its grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
	Healthy,
	Unhealthy,
}

impl Default for NodeStatus {
	fn default() -> Self {
		NodeStatus::Healthy
	}
}

/// A catalogue node. `owner` is the stable ledger identity and the only
/// field used as a map key anywhere in the system; `address` and `node_url`
/// are derived from it at discovery time and never recomputed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
	pub owner: String,
	pub address: String,
	pub node_url: String,
	pub name: String,
	#[serde(default)]
	pub status: NodeStatus,
	#[serde(default)]
	pub last_failure_reason: Option<String>,
}

impl Node {
	/// Builds a node record from an owner identity and a `descriptionUri`
	/// host, applying the `{scheme}://{host}:3030/catalogue` convention.
	pub fn from_description_uri(owner: &str, name: &str, description_uri: &str) -> Option<Node> {
		let url = url::Url::parse(description_uri).ok()?;
		let scheme = url.scheme();
		let host = url.host_str()?;
		let address = format!("{}://{}", scheme, host);
		let node_url = format!("{}:3030/catalogue", address);
		Some(Node {
			owner: owner.to_string(),
			address,
			node_url,
			name: name.to_string(),
			status: NodeStatus::Healthy,
			last_failure_reason: None,
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn strips_extra_port_and_applies_convention() {
		let n = Node::from_description_uri(
			"did:example:owner-a",
			"catalogue-a",
			"https://node-a.example.com:9999/description.json",
		)
		.unwrap();
		assert_eq!(n.address, "https://node-a.example.com");
		assert_eq!(n.node_url, "https://node-a.example.com:3030/catalogue");
	}
}
