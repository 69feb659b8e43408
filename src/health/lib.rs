//! Periodically probes every known node, applies the suspect/grace-period
//! death transition, and drives ring membership as a side effect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coord_kv::KvStore;
use coord_model::{keys, Node, NodeStatus};
use coord_ring::HashRing;
use coord_util::background::{sleep_or_exit, Worker, WorkerState};
use coord_util::error::Error;
use coord_util::time::{elapsed_since_msec, now_msec};
use tokio::sync::{watch, Mutex as AsyncMutex};

/// Capability the Health Supervisor calls into on a node death, implemented
/// by the placement driver so this crate does not depend on it directly.
#[async_trait]
pub trait Redistributor: Send + Sync {
	async fn redistribute(&self, dead_owner: &str) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy)]
enum FailureState {
	Healthy,
	Suspect { since: u64 },
	Dead,
}

pub struct HealthSupervisor {
	kv: Arc<dyn KvStore>,
	ring: Arc<HashRing>,
	redistributor: Arc<dyn Redistributor>,
	http: reqwest::Client,
	probe_interval: Duration,
	grace_period: Duration,
	state: std::sync::Mutex<HashMap<String, FailureState>>,
	// Serialises the redistribute+remove critical section across nodes dying
	// concurrently, as required by the state machine contract.
	death_lock: AsyncMutex<()>,
}

impl HealthSupervisor {
	pub fn new(
		kv: Arc<dyn KvStore>,
		ring: Arc<HashRing>,
		redistributor: Arc<dyn Redistributor>,
		probe_interval: Duration,
		probe_timeout: Duration,
		grace_period: Duration,
	) -> Self {
		let http = reqwest::Client::builder()
			.timeout(probe_timeout)
			.build()
			.expect("failed to build http client");
		HealthSupervisor {
			kv,
			ring,
			redistributor,
			http,
			probe_interval,
			grace_period,
			state: std::sync::Mutex::new(HashMap::new()),
			death_lock: AsyncMutex::new(()),
		}
	}

	/// `Ok(())` on a successful probe, `Err(reason)` otherwise — the reason is
	/// attached to the node record for observability.
	async fn probe(&self, node_url: &str) -> Result<(), String> {
		match self.http.get(format!("{}/test", node_url)).send().await {
			Ok(resp) if resp.status().is_success() => Ok(()),
			Ok(resp) => Err(format!("unexpected status {}", resp.status())),
			Err(e) if e.is_timeout() => Err("timed out".to_string()),
			Err(e) => Err(format!("connection error: {}", e)),
		}
	}

	async fn record_failure_reason(&self, owner: &str, reason: Option<&str>) {
		if let Ok(Some(mut node)) = self.load_node(owner).await {
			node.last_failure_reason = reason.map(|r| r.to_string());
			let _ = self
				.kv
				.set(&keys::node(owner), &serde_json::to_string(&node).unwrap_or_default())
				.await;
		}
	}

	async fn load_node(&self, owner: &str) -> Result<Option<Node>, Error> {
		match self.kv.get(&keys::node(owner)).await? {
			Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
			None => Ok(None),
		}
	}

	async fn set_node_status(&self, node: &mut Node, status: NodeStatus) -> Result<(), Error> {
		node.status = status;
		self.kv
			.set(&keys::node(&node.owner), &serde_json::to_string(node)?)
			.await
	}

	async fn handle_probe_result(&self, owner: &str, node_url: &str, probe: Result<(), String>) {
		let now = now_msec();
		let prev = self
			.state
			.lock()
			.unwrap()
			.get(owner)
			.copied()
			.unwrap_or(FailureState::Healthy);

		let next = if let Err(reason) = &probe {
			self.record_failure_reason(owner, Some(reason)).await;
			match prev {
				FailureState::Healthy => {
					tracing::warn!("node {} ({}) failed probe: {}, now suspect", owner, node_url, reason);
					FailureState::Suspect { since: now }
				}
				FailureState::Suspect { since } => {
					let elapsed = elapsed_since_msec(since);
					if elapsed >= self.grace_period {
						self.transition_to_dead(owner).await;
						FailureState::Dead
					} else {
						tracing::debug!(
							"node {} still suspect, {:?} left of grace period",
							owner,
							self.grace_period.saturating_sub(elapsed)
						);
						FailureState::Suspect { since }
					}
				}
				FailureState::Dead => FailureState::Dead,
			}
		} else {
			match prev {
				FailureState::Healthy => FailureState::Healthy,
				FailureState::Suspect { .. } => {
					self.record_failure_reason(owner, None).await;
					tracing::info!("node {} recovered", owner);
					FailureState::Healthy
				}
				FailureState::Dead => {
					let _guard = self.death_lock.lock().await;
					if let Ok(Some(mut node)) = self.load_node(owner).await {
						node.last_failure_reason = None;
						if self.set_node_status(&mut node, NodeStatus::Healthy).await.is_ok() {
							self.ring.add(owner);
							self.ring.persist(self.kv.as_ref()).await;
							tracing::info!("node {} recovered from dead, re-added to ring", owner);
						}
					}
					FailureState::Healthy
				}
			}
		};

		self.state.lock().unwrap().insert(owner.to_string(), next);
	}

	/// The atomic block: mark unhealthy, redistribute offerings, remove from
	/// the ring. Serialised by `death_lock` so two nodes dying at once never
	/// interleave their redistribute+remove sections.
	async fn transition_to_dead(&self, owner: &str) {
		let _guard = self.death_lock.lock().await;
		tracing::error!("node {} exceeded grace period, declaring dead", owner);

		if let Ok(Some(mut node)) = self.load_node(owner).await {
			if let Err(e) = self.set_node_status(&mut node, NodeStatus::Unhealthy).await {
				tracing::warn!("failed to mark node {} unhealthy: {}", owner, e);
			}
		}

		if let Err(e) = self.redistributor.redistribute(owner).await {
			tracing::warn!("redistribution for dead node {} failed: {}", owner, e);
		}

		self.ring.remove(owner);
		self.ring.persist(self.kv.as_ref()).await;
	}

	async fn tick(&self) -> Result<(), Error> {
		let owners = self.kv.smembers(keys::ALL_NODES).await?;
		let mut probes = Vec::new();
		for owner in owners {
			let node = match self.load_node(&owner).await? {
				Some(n) => n,
				None => continue,
			};
			probes.push(async move {
				let result = self.probe(&node.node_url).await;
				(node.owner, node.node_url, result)
			});
		}

		let results = futures::future::join_all(probes).await;
		for (owner, node_url, result) in results {
			self.handle_probe_result(&owner, &node_url, result).await;
		}
		Ok(())
	}
}

#[async_trait]
impl Worker for HealthSupervisor {
	fn name(&self) -> String {
		"health-supervisor".to_string()
	}

	async fn work(&mut self, _must_exit: &mut watch::Receiver<bool>) -> Result<WorkerState, Error> {
		self.tick().await?;
		Ok(WorkerState::Idle)
	}

	async fn wait_for_work(&mut self, must_exit: &mut watch::Receiver<bool>) -> WorkerState {
		sleep_or_exit(self.probe_interval, must_exit).await
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use coord_kv::mem::MemKv;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct CountingRedistributor(AtomicUsize);

	#[async_trait]
	impl Redistributor for CountingRedistributor {
		async fn redistribute(&self, _dead_owner: &str) -> Result<(), Error> {
			self.0.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	#[tokio::test]
	async fn grace_period_honesty() {
		let kv: Arc<dyn KvStore> = Arc::new(MemKv::new());
		let ring = Arc::new(HashRing::new(8));
		ring.add("a");

		let node = Node {
			owner: "a".to_string(),
			address: "http://a".to_string(),
			node_url: "http://127.0.0.1:1/unreachable".to_string(),
			name: "a".to_string(),
			status: NodeStatus::Healthy,
			last_failure_reason: None,
		};
		kv.set(&keys::node("a"), &serde_json::to_string(&node).unwrap())
			.await
			.unwrap();
		kv.sadd(keys::ALL_NODES, "a").await.unwrap();

		let redistributor = Arc::new(CountingRedistributor(AtomicUsize::new(0)));
		let supervisor = HealthSupervisor::new(
			kv.clone(),
			ring.clone(),
			redistributor.clone(),
			Duration::from_secs(30),
			Duration::from_millis(50),
			Duration::from_millis(50),
		);

		supervisor
			.handle_probe_result("a", &node.node_url, Err("connection refused".to_string()))
			.await;
		assert_eq!(redistributor.0.load(Ordering::SeqCst), 0);

		tokio::time::sleep(Duration::from_millis(60)).await;
		supervisor
			.handle_probe_result("a", &node.node_url, Err("connection refused".to_string()))
			.await;
		assert_eq!(redistributor.0.load(Ordering::SeqCst), 1);

		let stored = supervisor.load_node("a").await.unwrap().unwrap();
		assert_eq!(stored.last_failure_reason.as_deref(), Some("connection refused"));
	}
}
