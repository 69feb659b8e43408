//! Integration tests for the composition root: these exercise wiring
//! between crates without binding a real KV backend or catalogue node.

use std::sync::Arc;

use coord_kv::mem::MemKv;
use coord_kv::KvStore;
use coord_placement::PlacementDriver;
use coord_registry::NodeRegistry;
use coord_ring::HashRing;
use coord_util::config::Config;

#[test]
fn config_from_env_applies_documented_defaults() {
	for var in [
		"HOST_PORT",
		"WORKER_POOL_SIZE",
		"HASH_RING_VIRTUAL_NODES",
		"REDUNDANCY_REPLICAS",
		"NODE_GRACE_PERIOD",
		"BASELINE_INFRA",
	] {
		std::env::remove_var(var);
	}
	let config = Config::from_env().unwrap();
	assert_eq!(config.host_port, 5000);
	assert_eq!(config.worker_pool_size, 10);
	assert_eq!(config.hash_ring_virtual_nodes, 150);
	assert_eq!(config.redundancy_replicas, 2);
	assert_eq!(config.node_grace_period.as_secs(), 60);
	assert!(!config.baseline_infra);
}

#[tokio::test]
async fn cold_start_with_baseline_nodes_places_onto_ring() {
	let kv: Arc<dyn KvStore> = Arc::new(MemKv::new());
	let ring = Arc::new(HashRing::new(16));

	let registry = Arc::new(NodeRegistry::new(
		kv.clone(),
		"http://unreachable.invalid".to_string(),
		true,
		"does-not-exist.json".to_string(),
	));
	let nodes = registry.discover_and_store().await.unwrap();
	assert!(nodes.is_empty(), "missing baseline file yields no synthetic nodes");

	let driver = PlacementDriver::new(kv, ring, 2);
	let targets = driver.already_processed("offering-a");
	assert!(!targets);
}
