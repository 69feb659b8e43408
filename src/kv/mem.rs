use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use coord_util::error::Error;

use crate::glob;
use crate::store::KvStore;

#[derive(Default)]
struct Inner {
	strings: HashMap<String, String>,
	hashes: HashMap<String, HashMap<String, String>>,
	sets: HashMap<String, HashSet<String>>,
}

/// In-process stand-in for the networked store. Not shared across OS
/// processes; satisfies the same interface, including glob `scan` and an
/// always-successful `ping`.
pub struct MemKv {
	inner: Mutex<Inner>,
}

impl MemKv {
	pub fn new() -> Self {
		MemKv {
			inner: Mutex::new(Inner::default()),
		}
	}
}

impl Default for MemKv {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl KvStore for MemKv {
	async fn get(&self, key: &str) -> Result<Option<String>, Error> {
		Ok(self.inner.lock().unwrap().strings.get(key).cloned())
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
		self.inner
			.lock()
			.unwrap()
			.strings
			.insert(key.to_string(), value.to_string());
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), Error> {
		let mut inner = self.inner.lock().unwrap();
		inner.strings.remove(key);
		inner.hashes.remove(key);
		inner.sets.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, Error> {
		let inner = self.inner.lock().unwrap();
		Ok(inner.strings.contains_key(key)
			|| inner.hashes.contains_key(key)
			|| inner.sets.contains_key(key))
	}

	async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), Error> {
		self.inner
			.lock()
			.unwrap()
			.hashes
			.entry(key.to_string())
			.or_default()
			.insert(field.to_string(), value.to_string());
		Ok(())
	}

	async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, Error> {
		Ok(self
			.inner
			.lock()
			.unwrap()
			.hashes
			.get(key)
			.cloned()
			.unwrap_or_default())
	}

	async fn sadd(&self, key: &str, member: &str) -> Result<(), Error> {
		self.inner
			.lock()
			.unwrap()
			.sets
			.entry(key.to_string())
			.or_default()
			.insert(member.to_string());
		Ok(())
	}

	async fn srem(&self, key: &str, member: &str) -> Result<(), Error> {
		if let Some(set) = self.inner.lock().unwrap().sets.get_mut(key) {
			set.remove(member);
		}
		Ok(())
	}

	async fn smembers(&self, key: &str) -> Result<HashSet<String>, Error> {
		Ok(self
			.inner
			.lock()
			.unwrap()
			.sets
			.get(key)
			.cloned()
			.unwrap_or_default())
	}

	async fn scan(&self, pattern: &str) -> Result<Vec<String>, Error> {
		let inner = self.inner.lock().unwrap();
		let keys = inner
			.strings
			.keys()
			.chain(inner.hashes.keys())
			.chain(inner.sets.keys())
			.filter(|k| glob::matches(pattern, k))
			.cloned()
			.collect::<HashSet<_>>();
		Ok(keys.into_iter().collect())
	}

	async fn ping(&self) -> bool {
		true
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[tokio::test]
	async fn set_and_scan() {
		let kv = MemKv::new();
		kv.set("node:a", "1").await.unwrap();
		kv.set("node:b", "2").await.unwrap();
		kv.set("offering:a", "3").await.unwrap();

		let mut keys = kv.scan("node:*").await.unwrap();
		keys.sort();
		assert_eq!(keys, vec!["node:a".to_string(), "node:b".to_string()]);
	}

	#[tokio::test]
	async fn sets_are_commutative() {
		let kv = MemKv::new();
		kv.sadd("node_offerings:a", "x").await.unwrap();
		kv.sadd("node_offerings:a", "y").await.unwrap();
		kv.srem("node_offerings:a", "x").await.unwrap();
		let members = kv.smembers("node_offerings:a").await.unwrap();
		assert_eq!(members, ["y".to_string()].into_iter().collect());
	}

	#[tokio::test]
	async fn ping_always_succeeds() {
		let kv = MemKv::new();
		assert!(kv.ping().await);
	}
}
