use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use coord_util::error::Error;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::store::KvStore;

fn redis_err(e: redis::RedisError) -> Error {
	Error::Http(format!("redis: {}", e))
}

/// Networked backend. Holds a lazily-established `ConnectionManager`, which
/// redis-rs reconnects internally on transient errors; `ping_fresh` is used
/// once at startup to decide whether to start in fallback mode at all.
pub struct RedisKv {
	client: redis::Client,
	conn: Mutex<Option<ConnectionManager>>,
}

impl RedisKv {
	pub fn new(host: &str, port: u16, db: i64, password: Option<&str>) -> Self {
		let mut url = format!("redis://{}:{}/{}", host, port, db);
		if let Some(pw) = password {
			url = format!("redis://:{}@{}:{}/{}", pw, host, port, db);
		}
		let client = redis::Client::open(url).expect("invalid redis url");
		RedisKv {
			client,
			conn: Mutex::new(None),
		}
	}

	async fn connection(&self) -> Result<ConnectionManager, Error> {
		let existing = self.conn.lock().unwrap().clone();
		if let Some(c) = existing {
			return Ok(c);
		}
		let c = tokio::time::timeout(
			Duration::from_secs(2),
			ConnectionManager::new(self.client.clone()),
		)
		.await
		.map_err(|_| Error::Timeout)?
		.map_err(redis_err)?;
		*self.conn.lock().unwrap() = Some(c.clone());
		Ok(c)
	}

	pub async fn ping_fresh(&self) -> bool {
		match self.connection().await {
			Ok(mut c) => redis::cmd("PING").query_async::<_, String>(&mut c).await.is_ok(),
			Err(_) => false,
		}
	}

	pub async fn get(&self, key: &str) -> Result<Option<String>, Error> {
		let mut c = self.connection().await?;
		c.get(key).await.map_err(redis_err)
	}

	pub async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
		let mut c = self.connection().await?;
		c.set(key, value).await.map_err(redis_err)
	}

	pub async fn delete(&self, key: &str) -> Result<(), Error> {
		let mut c = self.connection().await?;
		let _: () = c.del(key).await.map_err(redis_err)?;
		Ok(())
	}

	pub async fn exists(&self, key: &str) -> Result<bool, Error> {
		let mut c = self.connection().await?;
		c.exists(key).await.map_err(redis_err)
	}

	pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), Error> {
		let mut c = self.connection().await?;
		let _: () = c.hset(key, field, value).await.map_err(redis_err)?;
		Ok(())
	}

	pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, Error> {
		let mut c = self.connection().await?;
		c.hgetall(key).await.map_err(redis_err)
	}

	pub async fn sadd(&self, key: &str, member: &str) -> Result<(), Error> {
		let mut c = self.connection().await?;
		let _: () = c.sadd(key, member).await.map_err(redis_err)?;
		Ok(())
	}

	pub async fn srem(&self, key: &str, member: &str) -> Result<(), Error> {
		let mut c = self.connection().await?;
		let _: () = c.srem(key, member).await.map_err(redis_err)?;
		Ok(())
	}

	pub async fn smembers(&self, key: &str) -> Result<HashSet<String>, Error> {
		let mut c = self.connection().await?;
		c.smembers(key).await.map_err(redis_err)
	}

	pub async fn scan(&self, pattern: &str) -> Result<Vec<String>, Error> {
		let mut c = self.connection().await?;
		let mut cursor: u64 = 0;
		let mut out = Vec::new();
		loop {
			let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
				.arg(cursor)
				.arg("MATCH")
				.arg(pattern)
				.arg("COUNT")
				.arg(200)
				.query_async(&mut c)
				.await
				.map_err(redis_err)?;
			out.extend(batch);
			if next == 0 {
				break;
			}
			cursor = next;
		}
		Ok(out)
	}

	pub async fn ping(&self) -> bool {
		match self.connection().await {
			Ok(mut c) => redis::cmd("PING").query_async::<_, String>(&mut c).await.is_ok(),
			Err(_) => false,
		}
	}
}

// `RedisKv` also satisfies the generic trait so it can be used directly in
// tests without going through the fallback-aware `Kv` wrapper.
#[async_trait]
impl KvStore for RedisKv {
	async fn get(&self, key: &str) -> Result<Option<String>, Error> {
		RedisKv::get(self, key).await
	}
	async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
		RedisKv::set(self, key, value).await
	}
	async fn delete(&self, key: &str) -> Result<(), Error> {
		RedisKv::delete(self, key).await
	}
	async fn exists(&self, key: &str) -> Result<bool, Error> {
		RedisKv::exists(self, key).await
	}
	async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), Error> {
		RedisKv::hset(self, key, field, value).await
	}
	async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, Error> {
		RedisKv::hgetall(self, key).await
	}
	async fn sadd(&self, key: &str, member: &str) -> Result<(), Error> {
		RedisKv::sadd(self, key, member).await
	}
	async fn srem(&self, key: &str, member: &str) -> Result<(), Error> {
		RedisKv::srem(self, key, member).await
	}
	async fn smembers(&self, key: &str) -> Result<HashSet<String>, Error> {
		RedisKv::smembers(self, key).await
	}
	async fn scan(&self, pattern: &str) -> Result<Vec<String>, Error> {
		RedisKv::scan(self, pattern).await
	}
	async fn ping(&self) -> bool {
		RedisKv::ping(self).await
	}
}
