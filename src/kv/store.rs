use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use coord_util::error::Error;

use crate::mem::MemKv;
use crate::redis_kv::RedisKv;

/// The surface every placement-bookkeeping caller uses: get/set/delete on
/// plain keys, hash and set operations for node records and indices, a scan
/// for glob-style range walks, and a liveness probe.
#[async_trait]
pub trait KvStore: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<String>, Error>;
	async fn set(&self, key: &str, value: &str) -> Result<(), Error>;
	async fn delete(&self, key: &str) -> Result<(), Error>;
	async fn exists(&self, key: &str) -> Result<bool, Error>;

	async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), Error>;
	async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, Error>;

	async fn sadd(&self, key: &str, member: &str) -> Result<(), Error>;
	async fn srem(&self, key: &str, member: &str) -> Result<(), Error>;
	async fn smembers(&self, key: &str) -> Result<HashSet<String>, Error>;

	/// Returns every key matching a glob pattern. Cursor iteration against
	/// the backend (if any) is internal to the implementation.
	async fn scan(&self, pattern: &str) -> Result<Vec<String>, Error>;

	async fn ping(&self) -> bool;
}

/// Dispatches to a networked backend until the first failed operation, then
/// falls back to the in-process implementation for the rest of the
/// process's life. Callers never branch on which backend is live.
pub struct Kv {
	redis: RedisKv,
	mem: MemKv,
	fallen_back: AtomicBool,
}

impl Kv {
	pub async fn connect(
		host: &str,
		port: u16,
		db: i64,
		password: Option<&str>,
	) -> Self {
		let redis = RedisKv::new(host, port, db, password);
		let fallen_back = match redis.ping_fresh().await {
			true => false,
			false => {
				tracing::warn!(
					"could not reach redis at {}:{}, falling back to in-process store",
					host,
					port
				);
				true
			}
		};
		Kv {
			redis,
			mem: MemKv::new(),
			fallen_back: AtomicBool::new(fallen_back),
		}
	}

	fn is_fallen_back(&self) -> bool {
		self.fallen_back.load(Ordering::Acquire)
	}

	fn fall_back(&self) {
		if !self.fallen_back.swap(true, Ordering::AcqRel) {
			tracing::warn!("redis operation failed, falling back to in-process store");
		}
	}
}

#[async_trait]
impl KvStore for Kv {
	async fn get(&self, key: &str) -> Result<Option<String>, Error> {
		if !self.is_fallen_back() {
			match self.redis.get(key).await {
				Ok(v) => return Ok(v),
				Err(e) => {
					tracing::warn!("redis get failed: {}", e);
					self.fall_back();
				}
			}
		}
		self.mem.get(key).await
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
		if !self.is_fallen_back() {
			match self.redis.set(key, value).await {
				Ok(()) => return Ok(()),
				Err(e) => {
					tracing::warn!("redis set failed: {}", e);
					self.fall_back();
				}
			}
		}
		self.mem.set(key, value).await
	}

	async fn delete(&self, key: &str) -> Result<(), Error> {
		if !self.is_fallen_back() {
			match self.redis.delete(key).await {
				Ok(()) => return Ok(()),
				Err(e) => {
					tracing::warn!("redis delete failed: {}", e);
					self.fall_back();
				}
			}
		}
		self.mem.delete(key).await
	}

	async fn exists(&self, key: &str) -> Result<bool, Error> {
		if !self.is_fallen_back() {
			match self.redis.exists(key).await {
				Ok(v) => return Ok(v),
				Err(e) => {
					tracing::warn!("redis exists failed: {}", e);
					self.fall_back();
				}
			}
		}
		self.mem.exists(key).await
	}

	async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), Error> {
		if !self.is_fallen_back() {
			match self.redis.hset(key, field, value).await {
				Ok(()) => return Ok(()),
				Err(e) => {
					tracing::warn!("redis hset failed: {}", e);
					self.fall_back();
				}
			}
		}
		self.mem.hset(key, field, value).await
	}

	async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, Error> {
		if !self.is_fallen_back() {
			match self.redis.hgetall(key).await {
				Ok(v) => return Ok(v),
				Err(e) => {
					tracing::warn!("redis hgetall failed: {}", e);
					self.fall_back();
				}
			}
		}
		self.mem.hgetall(key).await
	}

	async fn sadd(&self, key: &str, member: &str) -> Result<(), Error> {
		if !self.is_fallen_back() {
			match self.redis.sadd(key, member).await {
				Ok(()) => return Ok(()),
				Err(e) => {
					tracing::warn!("redis sadd failed: {}", e);
					self.fall_back();
				}
			}
		}
		self.mem.sadd(key, member).await
	}

	async fn srem(&self, key: &str, member: &str) -> Result<(), Error> {
		if !self.is_fallen_back() {
			match self.redis.srem(key, member).await {
				Ok(()) => return Ok(()),
				Err(e) => {
					tracing::warn!("redis srem failed: {}", e);
					self.fall_back();
				}
			}
		}
		self.mem.srem(key, member).await
	}

	async fn smembers(&self, key: &str) -> Result<HashSet<String>, Error> {
		if !self.is_fallen_back() {
			match self.redis.smembers(key).await {
				Ok(v) => return Ok(v),
				Err(e) => {
					tracing::warn!("redis smembers failed: {}", e);
					self.fall_back();
				}
			}
		}
		self.mem.smembers(key).await
	}

	async fn scan(&self, pattern: &str) -> Result<Vec<String>, Error> {
		if !self.is_fallen_back() {
			match self.redis.scan(pattern).await {
				Ok(v) => return Ok(v),
				Err(e) => {
					tracing::warn!("redis scan failed: {}", e);
					self.fall_back();
				}
			}
		}
		self.mem.scan(pattern).await
	}

	async fn ping(&self) -> bool {
		if !self.is_fallen_back() && self.redis.ping().await {
			return true;
		}
		self.mem.ping().await
	}
}
