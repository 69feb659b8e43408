use std::env;
use std::time::Duration;

use crate::error::Error;

/// Everything the Coordinator reads from the environment, parsed once at
/// startup and shared behind an `Arc` from the composition root.
#[derive(Debug, Clone)]
pub struct Config {
	pub host_address: String,
	pub host_port: u16,

	pub dlt_base_url: String,

	pub redis_host: String,
	pub redis_port: u16,
	pub redis_db: i64,
	pub redis_password: Option<String>,

	pub worker_pool_size: usize,

	pub node_health_check_interval: Duration,
	pub node_grace_period: Duration,
	pub node_timeout: Duration,

	pub hash_ring_virtual_nodes: usize,
	pub redundancy_replicas: usize,

	pub offering_fetch_interval: Duration,

	pub baseline_infra: bool,
	pub baseline_infra_file: String,

	pub federation_upstream_url: Option<String>,

	pub shutdown_deadline: Duration,
}

fn env_string(key: &str, default: &str) -> String {
	env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
	env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
	match env::var(key) {
		Ok(v) => v.parse().unwrap_or_else(|_| {
			tracing::warn!("invalid value for {}, using default", key);
			default
		}),
		Err(_) => default,
	}
}

impl Config {
	/// Assembles configuration from the process environment. Invalid values
	/// are warned about and replaced with the last-known-sane default rather
	/// than aborting startup, per the coordinator's error handling policy.
	pub fn from_env() -> Result<Self, Error> {
		let worker_pool_size: usize = env_parsed("WORKER_POOL_SIZE", 10);
		if worker_pool_size > 100 {
			tracing::warn!(
				"WORKER_POOL_SIZE={} is unusually large (>100)",
				worker_pool_size
			);
		}

		let host_port: u16 = env_parsed("HOST_PORT", 5000);
		let redis_port: u16 = env_parsed("REDIS_PORT", 6379);

		Ok(Config {
			host_address: env_string("HOST_ADDRESS", "0.0.0.0"),
			host_port,

			dlt_base_url: env_string("DLT_BASE_URL", "http://dlt-booth:8085/api"),

			redis_host: env_string("REDIS_HOST", "catalogue-coordinator-redis"),
			redis_port,
			redis_db: env_parsed("REDIS_DB", 0),
			redis_password: env_opt_string("REDIS_PASSWORD"),

			worker_pool_size,

			node_health_check_interval: Duration::from_secs(env_parsed(
				"NODE_HEALTH_CHECK_INTERVAL",
				30,
			)),
			node_grace_period: Duration::from_secs(env_parsed("NODE_GRACE_PERIOD", 60)),
			node_timeout: Duration::from_secs(env_parsed("NODE_TIMEOUT", 10)),

			hash_ring_virtual_nodes: env_parsed("HASH_RING_VIRTUAL_NODES", 150),
			redundancy_replicas: env_parsed("REDUNDANCY_REPLICAS", 2),

			offering_fetch_interval: Duration::from_secs(env_parsed(
				"OFFERING_FETCH_INTERVAL",
				60,
			)),

			baseline_infra: env_parsed("BASELINE_INFRA", false),
			baseline_infra_file: env_string("BASELINE_INFRA_FILE", "baseline_nodes.json"),

			federation_upstream_url: env_opt_string("FEDERATION_UPSTREAM_URL"),

			shutdown_deadline: Duration::from_secs(env_parsed("SHUTDOWN_DEADLINE", 10)),
		})
	}
}
