use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, used for task ids and failure
/// timestamps. Saturates rather than panics on a clock before 1970.
pub fn now_msec() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or(Duration::ZERO)
		.as_millis() as u64
}

pub fn elapsed_since_msec(t0: u64) -> Duration {
	Duration::from_millis(now_msec().saturating_sub(t0))
}
