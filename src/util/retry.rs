use std::future::Future;
use std::time::Duration;

use crate::error::Error;

/// A single retry strategy applied at each outbound call site, replacing the
/// ad-hoc retry-with-backoff scattered through the original implementation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub multiplier: f64,
}

impl RetryPolicy {
	pub const fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
		Self {
			max_attempts,
			base_delay,
			multiplier,
		}
	}

	/// Three attempts, one second base delay doubling each time: the schedule
	/// used by the offering placement call sites.
	pub const fn offering_default() -> Self {
		Self::new(3, Duration::from_secs(1), 2.0)
	}

	fn delay_for(&self, attempt: u32) -> Duration {
		let factor = self.multiplier.powi(attempt as i32 - 1);
		Duration::from_secs_f64(self.base_delay.as_secs_f64() * factor)
	}

	/// Runs `f` until it succeeds or `max_attempts` is exhausted, sleeping the
	/// exponential schedule between attempts. The last error is returned.
	pub async fn run<F, Fut, T>(&self, mut f: F) -> Result<T, Error>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, Error>>,
	{
		let mut attempt = 1;
		loop {
			match f().await {
				Ok(v) => return Ok(v),
				Err(e) if attempt < self.max_attempts => {
					tracing::warn!(
						"attempt {}/{} failed: {}, retrying",
						attempt,
						self.max_attempts,
						e
					);
					tokio::time::sleep(self.delay_for(attempt)).await;
					attempt += 1;
				}
				Err(e) => return Err(e),
			}
		}
	}
}
