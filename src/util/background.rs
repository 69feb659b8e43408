use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Error;

/// What a worker's last tick produced. `Idle` means "nothing to do right
/// now, call `wait_for_work` for the next signal"; `Busy` means "call `work`
/// again immediately, there is more to do"; `Done` means the worker is
/// finished for good and the runner should drop its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
	Busy,
	Idle,
	Done,
}

/// A long-lived supervised background task: the Health Supervisor loop and
/// the Placement poller both implement this, each doing one tick of work per
/// call to `work` and sleeping until the next tick inside `wait_for_work`.
#[async_trait]
pub trait Worker: Send + 'static {
	fn name(&self) -> String;

	/// Perform one unit of work. Must never propagate an error out of the
	/// supervising loop: an `Err` here is logged by the runner and the worker
	/// keeps running.
	async fn work(&mut self, must_exit: &mut watch::Receiver<bool>) -> Result<WorkerState, Error>;

	/// Suspend until there is more work to do, or until `must_exit` fires.
	/// Implementations that run on a fixed tick sleep for the tick interval
	/// here, racing the exit signal so shutdown is not delayed by a sleep.
	async fn wait_for_work(&mut self, must_exit: &mut watch::Receiver<bool>) -> WorkerState;
}

/// Sleeps for `dur`, racing the shutdown signal, for use inside
/// `wait_for_work` implementations that tick on a fixed interval.
pub async fn sleep_or_exit(
	dur: std::time::Duration,
	must_exit: &mut watch::Receiver<bool>,
) -> WorkerState {
	tokio::select! {
		_ = tokio::time::sleep(dur) => WorkerState::Busy,
		_ = must_exit.changed() => WorkerState::Done,
	}
}

/// Owns the shutdown signal and the set of spawned worker tasks. Mirrors the
/// shape of the networked membership manager's discovery/status-exchange
/// loops, generalised into a reusable spawn point so every long-lived loop in
/// the process (health probing, placement polling) is supervised the same
/// way.
pub struct BackgroundRunner {
	stop_signal: watch::Sender<bool>,
	handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundRunner {
	pub fn new() -> (Self, watch::Receiver<bool>) {
		let (stop_signal, stop_rx) = watch::channel(false);
		(
			Self {
				stop_signal,
				handles: std::sync::Mutex::new(Vec::new()),
			},
			stop_rx,
		)
	}

	pub fn spawn_worker<W: Worker>(&self, mut worker: W) {
		let mut must_exit = self.stop_signal.subscribe();
		let handle = tokio::spawn(async move {
			let name = worker.name();
			loop {
				if *must_exit.borrow() {
					break;
				}
				let res = worker.work(&mut must_exit).await;
				let next = match res {
					Ok(s) => s,
					Err(e) => {
						tracing::warn!("worker {} tick failed: {}", name, e);
						WorkerState::Idle
					}
				};
				match next {
					WorkerState::Done => break,
					WorkerState::Busy => continue,
					WorkerState::Idle => {
						if worker.wait_for_work(&mut must_exit).await == WorkerState::Done {
							break;
						}
					}
				}
			}
			tracing::info!("worker {} exited", name);
		});
		self.handles.lock().unwrap().push(handle);
	}

	/// Flips the shutdown signal and waits for every spawned worker to exit,
	/// up to `deadline`. Workers still running past the deadline are left
	/// detached (their task is aborted when the process exits).
	pub async fn shutdown(&self, deadline: std::time::Duration) {
		let _ = self.stop_signal.send(true);
		let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
		let join_all = futures::future::join_all(handles);
		if tokio::time::timeout(deadline, join_all).await.is_err() {
			tracing::warn!("background workers did not drain within shutdown deadline");
		}
	}
}
