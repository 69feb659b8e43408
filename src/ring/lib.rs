//! Consistent-hash ring with virtual nodes, keyed on offering identity.

use std::collections::HashMap;
use std::sync::RwLock;

use coord_kv::KvStore;
use coord_model::keys;
use coord_util::error::Error;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Number of virtual slots synthesised per real node, from
/// `HASH_RING_VIRTUAL_NODES`.
const DEFAULT_VIRTUAL_NODES: usize = 150;

fn hash_key(s: &str) -> u128 {
	let digest = Md5::digest(s.as_bytes());
	u128::from_be_bytes(digest.into())
}

#[derive(Default)]
struct RingInner {
	ring: HashMap<u128, String>,
	sorted_keys: Vec<u128>,
}

impl RingInner {
	fn insert_slot(&mut self, hash: u128, owner: &str) {
		if let std::collections::hash_map::Entry::Vacant(e) = self.ring.entry(hash) {
			e.insert(owner.to_string());
			let idx = self.sorted_keys.partition_point(|k| *k < hash);
			self.sorted_keys.insert(idx, hash);
		}
		// A collision on an existing slot is resolved by first-insertion
		// order: the existing owner is left in place.
	}

	fn remove_owner(&mut self, owner: &str) {
		let doomed: Vec<u128> = self
			.ring
			.iter()
			.filter(|(_, v)| v.as_str() == owner)
			.map(|(k, _)| *k)
			.collect();
		for hash in doomed {
			self.ring.remove(&hash);
			if let Ok(idx) = self.sorted_keys.binary_search(&hash) {
				self.sorted_keys.remove(idx);
			}
		}
	}

	fn slot_at_or_after(&self, hash: u128) -> Option<&str> {
		if self.sorted_keys.is_empty() {
			return None;
		}
		let idx = self.sorted_keys.partition_point(|k| *k < hash);
		let idx = if idx == self.sorted_keys.len() { 0 } else { idx };
		self.ring.get(&self.sorted_keys[idx]).map(|s| s.as_str())
	}
}

#[derive(Serialize, Deserialize)]
struct RingSnapshot {
	ring: HashMap<String, String>,
	sorted_keys: Vec<String>,
}

/// The ring itself. Mutations take a write lock; lookups take a read lock.
/// After every mutation a best-effort snapshot is written to the key/value
/// store so a restarted process can see the prior node set before the first
/// discovery cycle completes.
pub struct HashRing {
	inner: RwLock<RingInner>,
	virtual_nodes: usize,
}

impl HashRing {
	pub fn new(virtual_nodes: usize) -> Self {
		HashRing {
			inner: RwLock::new(RingInner::default()),
			virtual_nodes: if virtual_nodes == 0 {
				DEFAULT_VIRTUAL_NODES
			} else {
				virtual_nodes
			},
		}
	}

	/// Rebuilds ring membership from the live node set in `all_nodes`,
	/// ignoring any `hash_ring` snapshot contents. Called once at startup.
	pub async fn rebuild_from_kv(&self, kv: &dyn KvStore) -> Result<(), Error> {
		let owners = kv.smembers(keys::ALL_NODES).await?;
		for owner in owners {
			self.add(&owner);
		}
		self.persist(kv).await;
		Ok(())
	}

	/// Idempotent: re-adding an owner that already holds its virtual slots is
	/// a no-op per slot.
	pub fn add(&self, owner: &str) {
		let mut inner = self.inner.write().unwrap();
		for i in 0..self.virtual_nodes {
			let vkey = format!("{}-{}", owner, i);
			inner.insert_slot(hash_key(&vkey), owner);
		}
	}

	/// Idempotent: removing an owner with no slots left is a no-op.
	pub fn remove(&self, owner: &str) {
		self.inner.write().unwrap().remove_owner(owner);
	}

	pub fn get(&self, key: &str) -> Option<String> {
		let hash = hash_key(key);
		self.inner
			.read()
			.unwrap()
			.slot_at_or_after(hash)
			.map(|s| s.to_string())
	}

	/// Walks clockwise from `H(key)` accumulating distinct owners, wrapping
	/// once, until `n` are found or the ring is exhausted.
	pub fn get_n(&self, key: &str, n: usize) -> Vec<String> {
		let inner = self.inner.read().unwrap();
		if inner.sorted_keys.is_empty() || n == 0 {
			return Vec::new();
		}
		let hash = hash_key(key);
		let start = {
			let idx = inner.sorted_keys.partition_point(|k| *k < hash);
			if idx == inner.sorted_keys.len() {
				0
			} else {
				idx
			}
		};

		let mut out = Vec::new();
		let len = inner.sorted_keys.len();
		for i in 0..len {
			let idx = (start + i) % len;
			let owner = inner.ring.get(&inner.sorted_keys[idx]).unwrap();
			if !out.iter().any(|o: &String| o == owner) {
				out.push(owner.clone());
			}
			if out.len() >= n {
				break;
			}
		}
		out
	}

	/// Node status changes the cached record only; ring membership is
	/// decided solely by `add`/`remove`.
	pub async fn update_status(
		&self,
		kv: &dyn KvStore,
		owner: &str,
		status: coord_model::NodeStatus,
	) -> Result<(), Error> {
		if let Some(raw) = kv.get(&keys::node(owner)).await? {
			let mut node: coord_model::Node = serde_json::from_str(&raw)?;
			node.status = status;
			kv.set(&keys::node(owner), &serde_json::to_string(&node)?)
				.await?;
		}
		Ok(())
	}

	/// Best-effort snapshot write; failures are logged and otherwise
	/// ignored, since the live node set remains the source of truth.
	pub async fn persist(&self, kv: &dyn KvStore) {
		let snapshot = {
			let inner = self.inner.read().unwrap();
			RingSnapshot {
				ring: inner
					.ring
					.iter()
					.map(|(k, v)| (k.to_string(), v.clone()))
					.collect(),
				sorted_keys: inner.sorted_keys.iter().map(|k| k.to_string()).collect(),
			}
		};
		match serde_json::to_string(&snapshot) {
			Ok(s) => {
				if let Err(e) = kv.set(keys::HASH_RING, &s).await {
					tracing::warn!("failed to persist hash ring snapshot: {}", e);
				}
			}
			Err(e) => tracing::warn!("failed to encode hash ring snapshot: {}", e),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn add_is_idempotent() {
		let ring = HashRing::new(8);
		ring.add("a");
		let slots_once = ring.inner.read().unwrap().sorted_keys.len();
		ring.add("a");
		let slots_twice = ring.inner.read().unwrap().sorted_keys.len();
		assert_eq!(slots_once, slots_twice);
	}

	#[test]
	fn remove_is_idempotent() {
		let ring = HashRing::new(8);
		ring.add("a");
		ring.remove("a");
		ring.remove("a");
		assert!(ring.inner.read().unwrap().sorted_keys.is_empty());
	}

	#[test]
	fn empty_ring_returns_none_and_empty() {
		let ring = HashRing::new(8);
		assert_eq!(ring.get("x"), None);
		assert_eq!(ring.get_n("x", 3), Vec::<String>::new());
	}

	#[test]
	fn get_n_never_duplicates_and_bounds_by_node_count() {
		let ring = HashRing::new(32);
		ring.add("a");
		ring.add("b");
		ring.add("c");
		let owners = ring.get_n("some-offering-id", 10);
		assert_eq!(owners.len(), 3);
		let mut sorted = owners.clone();
		sorted.sort();
		sorted.dedup();
		assert_eq!(sorted.len(), owners.len());
	}

	#[test]
	fn placement_is_deterministic() {
		let ring = HashRing::new(32);
		ring.add("a");
		ring.add("b");
		ring.add("c");
		let first = ring.get_n("offering-42", 2);
		let second = ring.get_n("offering-42", 2);
		assert_eq!(first, second);
	}

	#[test]
	fn fewer_than_n_nodes_returns_all_of_them() {
		let ring = HashRing::new(16);
		ring.add("only-one");
		let owners = ring.get_n("k", 5);
		assert_eq!(owners, vec!["only-one".to_string()]);
	}
}
