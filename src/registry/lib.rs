//! Discovers catalogue nodes either from the ledger or, in baseline mode,
//! from a static JSON file, and persists them in the key/value store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use coord_kv::KvStore;
use coord_model::{keys, Node};
use coord_util::error::Error;
use serde::Deserialize;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct OfferingsIndex {
	#[serde(default)]
	addresses: Vec<String>,
}

#[derive(Deserialize, Clone)]
pub struct OfferingMeta {
	pub owner: String,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(rename = "descriptionUri")]
	pub description_uri: String,
}

#[derive(Deserialize)]
struct BaselineNode {
	owner: String,
	#[serde(default)]
	name: Option<String>,
	#[serde(alias = "node_url")]
	address: String,
}

pub struct NodeRegistry {
	kv: Arc<dyn KvStore>,
	http: reqwest::Client,
	dlt_base_url: String,
	baseline_infra: bool,
	baseline_infra_file: String,
}

impl NodeRegistry {
	pub fn new(
		kv: Arc<dyn KvStore>,
		dlt_base_url: String,
		baseline_infra: bool,
		baseline_infra_file: String,
	) -> Self {
		let http = reqwest::Client::builder()
			.timeout(DISCOVERY_TIMEOUT)
			.build()
			.expect("failed to build http client");
		NodeRegistry {
			kv,
			http,
			dlt_base_url,
			baseline_infra,
			baseline_infra_file,
		}
	}

	/// Reconciles the cached node list with the ledger (or the baseline
	/// file) and returns the current node list. A ledger-level failure
	/// returns an empty list without clearing existing KV state; a single
	/// offering-metadata fetch failure is logged and skipped.
	pub async fn discover_and_store(&self) -> Result<Vec<Node>, Error> {
		let discovered = if self.baseline_infra {
			self.discover_baseline().await
		} else {
			self.discover_ledger().await
		};

		for node in &discovered {
			self.kv
				.set(&keys::node(&node.owner), &serde_json::to_string(node)?)
				.await?;
			self.kv.sadd(keys::ALL_NODES, &node.owner).await?;
		}

		Ok(discovered)
	}

	/// Returns the cached node list, populating it via `discover_and_store`
	/// when empty.
	pub async fn list(&self) -> Result<Vec<Node>, Error> {
		let owners = self.kv.smembers(keys::ALL_NODES).await?;
		if owners.is_empty() {
			return self.discover_and_store().await;
		}
		let mut nodes = Vec::with_capacity(owners.len());
		for owner in owners {
			if let Some(raw) = self.kv.get(&keys::node(&owner)).await? {
				nodes.push(serde_json::from_str(&raw)?);
			}
		}
		Ok(nodes)
	}

	/// Lists offerings available for placement: the ledger's `/offerings`
	/// index paired with each entry's fetched metadata, keyed by the
	/// ledger-level offering id (the routing key used everywhere else). In
	/// baseline mode, since there is no ledger to ask, this always returns
	/// an empty list.
	pub async fn list_offerings(&self) -> Result<Vec<(String, OfferingMeta)>, Error> {
		if self.baseline_infra {
			return Ok(Vec::new());
		}

		let index_url = format!("{}/offerings", self.dlt_base_url);
		let index: OfferingsIndex = match self.http.get(&index_url).send().await {
			Ok(resp) => match resp.json().await {
				Ok(v) => v,
				Err(e) => {
					tracing::warn!("malformed ledger offerings index: {}", e);
					return Ok(Vec::new());
				}
			},
			Err(e) => {
				tracing::warn!("failed to reach ledger at {}: {}", index_url, e);
				return Ok(Vec::new());
			}
		};

		let mut out = Vec::new();
		for offering_id in index.addresses {
			let meta_url = format!("{}/offerings/{}", self.dlt_base_url, offering_id);
			match self.http.get(&meta_url).send().await {
				Ok(resp) => match resp.json::<OfferingMeta>().await {
					Ok(meta) => out.push((offering_id, meta)),
					Err(e) => tracing::warn!("skipping offering {}: malformed metadata: {}", offering_id, e),
				},
				Err(e) => tracing::warn!("skipping offering {}: {}", offering_id, e),
			}
		}
		Ok(out)
	}

	async fn discover_ledger(&self) -> Vec<Node> {
		let index_url = format!("{}/offerings", self.dlt_base_url);
		let index: OfferingsIndex = match self.http.get(&index_url).send().await {
			Ok(resp) => match resp.json().await {
				Ok(v) => v,
				Err(e) => {
					tracing::warn!("malformed ledger offerings index: {}", e);
					return Vec::new();
				}
			},
			Err(e) => {
				tracing::warn!("failed to reach ledger at {}: {}", index_url, e);
				return Vec::new();
			}
		};

		let mut seen_owners = HashSet::new();
		let mut nodes = Vec::new();
		for offering_id in index.addresses {
			let meta_url = format!("{}/offerings/{}", self.dlt_base_url, offering_id);
			let meta: OfferingMeta = match self.http.get(&meta_url).send().await {
				Ok(resp) => match resp.json().await {
					Ok(v) => v,
					Err(e) => {
						tracing::warn!("skipping offering {}: malformed metadata: {}", offering_id, e);
						continue;
					}
				},
				Err(e) => {
					tracing::warn!("skipping offering {}: {}", offering_id, e);
					continue;
				}
			};

			if !seen_owners.insert(meta.owner.clone()) {
				continue;
			}
			let name = meta.name.clone().unwrap_or_else(|| meta.owner.clone());
			match Node::from_description_uri(&meta.owner, &name, &meta.description_uri) {
				Some(node) => nodes.push(node),
				None => tracing::warn!(
					"skipping offering {}: unparseable descriptionUri {}",
					offering_id,
					meta.description_uri
				),
			}
		}
		nodes
	}

	async fn discover_baseline(&self) -> Vec<Node> {
		let contents = match tokio::fs::read_to_string(&self.baseline_infra_file).await {
			Ok(c) => c,
			Err(e) => {
				tracing::warn!(
					"baseline infra file {} unreadable: {}",
					self.baseline_infra_file,
					e
				);
				return Vec::new();
			}
		};
		let entries: Vec<BaselineNode> = match serde_json::from_str(&contents) {
			Ok(v) => v,
			Err(e) => {
				tracing::warn!("malformed baseline infra file: {}", e);
				return Vec::new();
			}
		};

		let mut seen_owners = HashSet::new();
		entries
			.into_iter()
			.filter(|e| seen_owners.insert(e.owner.clone()))
			.map(|e| Node {
				owner: e.owner.clone(),
				node_url: format!("{}:3030/catalogue", e.address),
				address: e.address,
				name: e.name.unwrap_or(e.owner),
				status: coord_model::NodeStatus::Healthy,
				last_failure_reason: None,
			})
			.collect()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use coord_kv::mem::MemKv;

	#[tokio::test]
	async fn list_populates_from_discovery_when_empty() {
		let kv: Arc<dyn KvStore> = Arc::new(MemKv::new());
		let registry = NodeRegistry::new(
			kv.clone(),
			"http://unreachable.invalid".to_string(),
			true,
			"does-not-exist.json".to_string(),
		);
		let nodes = registry.list().await.unwrap();
		assert!(nodes.is_empty());
		assert!(kv.smembers(keys::ALL_NODES).await.unwrap().is_empty());
	}
}
