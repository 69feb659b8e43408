use std::sync::Arc;

use coord_federation::FederationEngine;
use coord_kv::KvStore;
use coord_placement::PlacementDriver;
use coord_pool::WorkerPool;
use coord_registry::NodeRegistry;
use coord_ring::HashRing;

/// Everything the HTTP surface needs to serve a request. Handlers take this
/// by reference; the composition root owns the one instance for the whole
/// process.
pub struct ApiState {
	pub kv: Arc<dyn KvStore>,
	pub ring: Arc<HashRing>,
	pub registry: Arc<NodeRegistry>,
	pub placement: Arc<PlacementDriver>,
	pub pool: Arc<WorkerPool<bool>>,
	pub federation: Arc<FederationEngine>,
	pub federation_upstream_url: Option<String>,
	pub service_name: String,
}
