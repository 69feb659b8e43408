//! Bounded-concurrency worker pool: accepts unit-of-work submissions,
//! exposes per-task status, and enforces a fixed width of in-flight tasks.
//! Generic over the task's success payload; domain adapters live alongside
//! their domain logic, not here.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::time::timeout;

use coord_util::time::now_msec;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
	Pending,
	Completed,
	Failed,
	Cancelled,
	NotFound,
}

enum TaskState<T> {
	Pending,
	Completed(T),
	Failed(String),
	Cancelled,
}

struct TaskHandle<T> {
	state: Mutex<TaskState<T>>,
	notify: Notify,
}

#[derive(Debug, Clone)]
pub struct PoolStats {
	pub total_tasks: usize,
	pub pending: usize,
	pub completed: usize,
	pub failed: usize,
	pub cancelled: usize,
	pub max_workers: usize,
	pub is_running: bool,
}

#[derive(Debug, Clone)]
pub struct MemoryStats {
	pub results_dict_size: usize,
	pub estimated_memory_bytes: usize,
	pub estimated_memory_mb: f64,
	pub max_workers: usize,
	pub is_running: bool,
}

/// A bounded pool of `max_workers` concurrent tasks, each identified by a
/// stable task id handed back from `submit`.
pub struct WorkerPool<T> {
	max_workers: usize,
	semaphore: Arc<Semaphore>,
	tasks: Mutex<HashMap<String, Arc<TaskHandle<T>>>>,
	seq: AtomicU64,
	running: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> WorkerPool<T> {
	pub fn new(max_workers: usize) -> Self {
		if max_workers > 100 {
			tracing::warn!("worker pool size {} is unusually large (>100)", max_workers);
		}
		tracing::info!("worker pool initialized with {} workers", max_workers);
		WorkerPool {
			max_workers,
			semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
			tasks: Mutex::new(HashMap::new()),
			seq: AtomicU64::new(0),
			running: AtomicBool::new(true),
		}
	}

	fn next_task_id(&self) -> String {
		let seq = self.seq.fetch_add(1, Ordering::Relaxed);
		format!("task_{}_{}", now_msec(), seq)
	}

	/// Enqueues a unit of work; the task starts once a permit is free and is
	/// not blocked on the submitter awaiting it.
	pub fn submit(&self, fut: BoxFuture<T>) -> String {
		let task_id = self.next_task_id();
		let handle = Arc::new(TaskHandle {
			state: Mutex::new(TaskState::Pending),
			notify: Notify::new(),
		});
		self.tasks
			.lock()
			.unwrap()
			.insert(task_id.clone(), handle.clone());

		let semaphore = self.semaphore.clone();
		tokio::spawn(async move {
			let permit = match semaphore.acquire_owned().await {
				Ok(p) => p,
				Err(_) => return,
			};
			{
				let state = handle.state.lock().unwrap();
				if matches!(*state, TaskState::Cancelled) {
					return;
				}
			}
			let result = fut.await;
			{
				let mut state = handle.state.lock().unwrap();
				if matches!(*state, TaskState::Cancelled) {
					return;
				}
				*state = match result {
					Ok(v) => TaskState::Completed(v),
					Err(e) => TaskState::Failed(e),
				};
			}
			handle.notify.notify_waiters();
			drop(permit);
		});

		task_id
	}

	/// Submits several tasks at once, in order; returns their ids in the
	/// same order.
	pub fn submit_batch(&self, futs: Vec<BoxFuture<T>>) -> Vec<String> {
		let ids: Vec<String> = futs.into_iter().map(|f| self.submit(f)).collect();
		tracing::info!("submitted {} tasks to worker pool", ids.len());
		ids
	}

	pub fn status(&self, task_id: &str) -> TaskStatus {
		let tasks = self.tasks.lock().unwrap();
		match tasks.get(task_id) {
			None => TaskStatus::NotFound,
			Some(handle) => match *handle.state.lock().unwrap() {
				TaskState::Pending => TaskStatus::Pending,
				TaskState::Completed(_) => TaskStatus::Completed,
				TaskState::Failed(_) => TaskStatus::Failed,
				TaskState::Cancelled => TaskStatus::Cancelled,
			},
		}
	}

	/// Blocks up to `timeout_dur` for the task's outcome. `Ok(Err(..))`
	/// surfaces a task function's own error; the outer `Err` is the id not
	/// existing or the wait timing out.
	pub async fn result(
		&self,
		task_id: &str,
		timeout_dur: Option<Duration>,
	) -> Result<Result<T, String>, String> {
		let handle = match self.tasks.lock().unwrap().get(task_id).cloned() {
			Some(h) => h,
			None => return Err(format!("task {} not found", task_id)),
		};

		let wait = async {
			loop {
				{
					let state = handle.state.lock().unwrap();
					match &*state {
						TaskState::Pending => {}
						TaskState::Completed(v) => return Ok(v.clone()),
						TaskState::Failed(e) => return Err(e.clone()),
						TaskState::Cancelled => return Err("task cancelled".to_string()),
					}
				}
				handle.notify.notified().await;
			}
		};

		let outcome: Result<T, String> = match timeout_dur {
			Some(d) => match timeout(d, wait).await {
				Ok(inner) => inner,
				Err(_) => return Err("task result timed out".to_string()),
			},
			None => wait.await,
		};
		Ok(outcome)
	}

	/// Cancels a task that has not started running yet; returns `false` if
	/// it is already running or terminal.
	pub fn cancel(&self, task_id: &str) -> bool {
		let tasks = self.tasks.lock().unwrap();
		match tasks.get(task_id) {
			None => false,
			Some(handle) => {
				let mut state = handle.state.lock().unwrap();
				if matches!(*state, TaskState::Pending) {
					*state = TaskState::Cancelled;
					drop(state);
					handle.notify.notify_waiters();
					tracing::info!("task {} cancelled", task_id);
					true
				} else {
					false
				}
			}
		}
	}

	/// Waits for every currently-pending task, returning a map from task id
	/// to its outcome (or a timeout/error string).
	pub async fn wait_all(
		&self,
		timeout_dur: Option<Duration>,
	) -> HashMap<String, Result<T, String>> {
		let pending_ids: Vec<String> = {
			let tasks = self.tasks.lock().unwrap();
			tasks
				.iter()
				.filter(|(_, h)| matches!(*h.state.lock().unwrap(), TaskState::Pending))
				.map(|(id, _)| id.clone())
				.collect()
		};

		let mut out = HashMap::new();
		for id in pending_ids {
			let res = match self.result(&id, timeout_dur).await {
				Ok(r) => r,
				Err(e) => Err(e),
			};
			out.insert(id, res);
		}
		out
	}

	/// Drops terminal (completed/failed/cancelled) task records once their
	/// count exceeds `max_retained`.
	pub fn auto_cleanup(&self, max_retained: usize) {
		let mut tasks = self.tasks.lock().unwrap();
		let terminal_count = tasks
			.values()
			.filter(|h| !matches!(*h.state.lock().unwrap(), TaskState::Pending))
			.count();
		if terminal_count > max_retained {
			tracing::info!(
				"auto-cleanup triggered: {} completed tasks exceed threshold {}",
				terminal_count,
				max_retained
			);
			tasks.retain(|_, h| matches!(*h.state.lock().unwrap(), TaskState::Pending));
		}
	}

	pub fn stats(&self) -> PoolStats {
		let tasks = self.tasks.lock().unwrap();
		let mut pending = 0;
		let mut completed = 0;
		let mut failed = 0;
		let mut cancelled = 0;
		for handle in tasks.values() {
			match *handle.state.lock().unwrap() {
				TaskState::Pending => pending += 1,
				TaskState::Completed(_) => completed += 1,
				TaskState::Failed(_) => failed += 1,
				TaskState::Cancelled => cancelled += 1,
			}
		}
		PoolStats {
			total_tasks: tasks.len(),
			pending,
			completed,
			failed,
			cancelled,
			max_workers: self.max_workers,
			is_running: self.running.load(Ordering::Relaxed),
		}
	}

	pub fn memory_stats(&self) -> MemoryStats {
		let size = self.tasks.lock().unwrap().len();
		let estimated_bytes = size * 200;
		MemoryStats {
			results_dict_size: size,
			estimated_memory_bytes: estimated_bytes,
			estimated_memory_mb: (estimated_bytes as f64) / (1024.0 * 1024.0),
			max_workers: self.max_workers,
			is_running: self.running.load(Ordering::Relaxed),
		}
	}

	pub fn stop(&self) {
		self.running.store(false, Ordering::Relaxed);
		tracing::info!("worker pool stopped");
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[tokio::test]
	async fn submit_and_await_result() {
		let pool: WorkerPool<i32> = WorkerPool::new(4);
		let id = pool.submit(Box::pin(async { Ok(42) }));
		let res = pool.result(&id, Some(Duration::from_secs(1))).await.unwrap();
		assert_eq!(res, Ok(42));
		assert_eq!(pool.status(&id), TaskStatus::Completed);
	}

	#[tokio::test]
	async fn failed_task_is_surfaced_not_panicked() {
		let pool: WorkerPool<i32> = WorkerPool::new(4);
		let id = pool.submit(Box::pin(async { Err("boom".to_string()) }));
		let res = pool.result(&id, Some(Duration::from_secs(1))).await.unwrap();
		assert_eq!(res, Err("boom".to_string()));
	}

	#[tokio::test]
	async fn unknown_task_status_is_not_found() {
		let pool: WorkerPool<i32> = WorkerPool::new(4);
		assert_eq!(pool.status("nope"), TaskStatus::NotFound);
	}

	#[tokio::test]
	async fn auto_cleanup_drops_terminal_entries_past_threshold() {
		let pool: WorkerPool<i32> = WorkerPool::new(4);
		for _ in 0..5 {
			let id = pool.submit(Box::pin(async { Ok(1) }));
			pool.result(&id, Some(Duration::from_secs(1))).await.unwrap();
		}
		assert_eq!(pool.stats().total_tasks, 5);
		pool.auto_cleanup(2);
		assert_eq!(pool.stats().total_tasks, 0);
	}
}
