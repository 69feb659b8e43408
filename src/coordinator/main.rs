//! Catalogue Coordinator entry point: the composition root that wires the
//! key/value store, node registry, hash ring, health supervisor, worker
//! pool, placement driver and federated query engine together, then serves
//! the HTTP surface until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use coord_api::state::ApiState;
use coord_federation::FederationEngine;
use coord_health::HealthSupervisor;
use coord_kv::{Kv, KvStore};
use coord_placement::{PlacementDriver, PlacementPoller};
use coord_pool::WorkerPool;
use coord_registry::NodeRegistry;
use coord_ring::HashRing;
use coord_util::background::BackgroundRunner;
use coord_util::config::Config;

#[tokio::main]
async fn main() {
	let panic_version_info = version_string();
	std::panic::set_hook(Box::new(move |panic_info| {
		eprintln!("======== PANIC (internal coordinator error) ========");
		eprintln!("{}", panic_info);
		eprintln!();
		eprintln!("Panics are internal errors the coordinator is unable to handle on its own.");
		eprintln!("Please include the last log messages and the backtrace below if you file");
		eprintln!("an issue.");
		eprintln!();
		eprintln!("VERSION: {}", panic_version_info);
		eprintln!();
		eprintln!("BACKTRACE:");
		eprintln!("{:?}", backtrace::Backtrace::new());
		std::process::abort();
	}));

	if std::env::var("RUST_LOG").is_err() {
		std::env::set_var("RUST_LOG", "info");
	}
	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
		.init();

	tracing::info!("catalogue-coordinator {} starting", version_string());

	if let Err(e) = run().await {
		eprintln!("Error: {}", e);
		std::process::exit(1);
	}
}

fn version_string() -> String {
	git_version::git_version!(
		prefix = "git:",
		cargo_prefix = "cargo:",
		fallback = "unknown"
	)
	.to_string()
}

async fn run() -> Result<(), coord_util::error::Error> {
	let config = Config::from_env()?;

	let kv: Arc<dyn KvStore> = Arc::new(
		Kv::connect(
			&config.redis_host,
			config.redis_port,
			config.redis_db,
			config.redis_password.as_deref(),
		)
		.await,
	);

	let ring = Arc::new(HashRing::new(config.hash_ring_virtual_nodes));
	ring.rebuild_from_kv(kv.as_ref()).await?;

	let registry = Arc::new(NodeRegistry::new(
		kv.clone(),
		config.dlt_base_url.clone(),
		config.baseline_infra,
		config.baseline_infra_file.clone(),
	));
	// Warm the ring and the KV node records from whatever the registry can
	// reach before serving the first request.
	for node in registry.discover_and_store().await? {
		ring.add(&node.owner);
	}
	ring.persist(kv.as_ref()).await;

	let placement = Arc::new(PlacementDriver::new(
		kv.clone(),
		ring.clone(),
		config.redundancy_replicas,
	));
	let pool = Arc::new(WorkerPool::new(config.worker_pool_size));
	let federation = Arc::new(FederationEngine::new());

	let health = HealthSupervisor::new(
		kv.clone(),
		ring.clone(),
		placement.clone(),
		config.node_health_check_interval,
		config.node_timeout,
		config.node_grace_period,
	);
	let poller = PlacementPoller::new(
		registry.clone(),
		placement.clone(),
		pool.clone(),
		config.offering_fetch_interval,
	);

	let (background, _stop_rx) = BackgroundRunner::new();
	background.spawn_worker(health);
	background.spawn_worker(poller);

	let api_state = Arc::new(ApiState {
		kv: kv.clone(),
		ring: ring.clone(),
		registry,
		placement,
		pool,
		federation,
		federation_upstream_url: config.federation_upstream_url.clone(),
		service_name: "catalogue-coordinator".to_string(),
	});

	let addr: SocketAddr = format!("{}:{}", config.host_address, config.host_port)
		.parse()
		.map_err(|e| coord_util::error::Error::Config(format!("invalid bind address: {}", e)))?;

	let shutdown_deadline = config.shutdown_deadline;
	let server = coord_api::run_server(addr, api_state, shutdown_signal());
	if let Err(e) = server.await {
		tracing::error!("HTTP server error: {}", e);
	}

	tracing::info!("shutting down background workers");
	background.shutdown(shutdown_deadline).await;

	Ok(())
}

/// Resolves once `SIGINT` or (on unix) `SIGTERM` is received, so
/// `run_server`'s graceful shutdown and the background worker drain both key
/// off the same signal.
async fn shutdown_signal() {
	let ctrl_c = async {
		let _ = tokio::signal::ctrl_c().await;
	};

	#[cfg(unix)]
	let terminate = async {
		use tokio::signal::unix::{signal, SignalKind};
		let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
		sigterm.recv().await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
	tracing::info!("shutdown signal received");
}
