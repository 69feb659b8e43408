//! The placement poller: a supervised background worker that ticks every
//! `OFFERING_FETCH_INTERVAL`, fetches pending offerings from the registry,
//! and submits the new ones to the worker pool via the placement driver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coord_pool::WorkerPool;
use coord_registry::NodeRegistry;
use coord_util::background::{sleep_or_exit, Worker, WorkerState};
use coord_util::error::Error;
use tokio::sync::watch;

use crate::{submit_bulk_offering_processing, PlacementDriver};

/// Terminal task records are dropped once this many accumulate, per the
/// source's `main.py` loop, which calls `auto_cleanup(max_completed_tasks=50)`
/// on every tick.
const MAX_RETAINED_TASKS: usize = 50;

pub struct PlacementPoller {
	registry: Arc<NodeRegistry>,
	driver: Arc<PlacementDriver>,
	pool: Arc<WorkerPool<bool>>,
	fetch_interval: Duration,
}

impl PlacementPoller {
	pub fn new(
		registry: Arc<NodeRegistry>,
		driver: Arc<PlacementDriver>,
		pool: Arc<WorkerPool<bool>>,
		fetch_interval: Duration,
	) -> Self {
		PlacementPoller {
			registry,
			driver,
			pool,
			fetch_interval,
		}
	}

	async fn tick(&self) -> Result<(), Error> {
		let offerings = self.registry.list_offerings().await?;
		let fresh: Vec<(String, String)> = offerings
			.into_iter()
			.filter(|(id, _)| !self.driver.already_processed(id))
			.map(|(id, meta)| (id, meta.description_uri))
			.collect();

		if !fresh.is_empty() {
			let task_ids = submit_bulk_offering_processing(&self.pool, &self.driver, fresh);
			tracing::info!("placement poller submitted {} new offerings", task_ids.len());
		}

		self.pool.auto_cleanup(MAX_RETAINED_TASKS);
		Ok(())
	}
}

#[async_trait]
impl Worker for PlacementPoller {
	fn name(&self) -> String {
		"placement-poller".to_string()
	}

	async fn work(&mut self, _must_exit: &mut watch::Receiver<bool>) -> Result<WorkerState, Error> {
		self.tick().await?;
		Ok(WorkerState::Idle)
	}

	async fn wait_for_work(&mut self, must_exit: &mut watch::Receiver<bool>) -> WorkerState {
		sleep_or_exit(self.fetch_interval, must_exit).await
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use coord_kv::mem::MemKv;
	use coord_ring::HashRing;
	use std::sync::Arc;

	#[tokio::test]
	async fn tick_with_no_offerings_is_a_noop() {
		let kv: Arc<dyn coord_kv::KvStore> = Arc::new(MemKv::new());
		let ring = Arc::new(HashRing::new(8));
		let registry = Arc::new(NodeRegistry::new(
			kv.clone(),
			"http://unreachable.invalid".to_string(),
			true,
			"does-not-exist.json".to_string(),
		));
		let driver = Arc::new(PlacementDriver::new(kv, ring, 2));
		let pool = Arc::new(WorkerPool::new(4));
		let poller = PlacementPoller::new(registry, driver, pool, Duration::from_secs(60));
		poller.tick().await.unwrap();
	}
}
