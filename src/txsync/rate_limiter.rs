//! Launch pacing for page requests.
//!
//! The limiter only paces how often requests are *issued*; it does not cap how many
//! are in flight. The orchestrator pairs it with a semaphore for that.

use crate::txsync::types::ConfigError;

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// `tokio::time::interval` rejects a zero period
const MIN_PERIOD: Duration = Duration::from_nanos(1);

/// Admits at most `max_requests_per_second` callers per second, evenly spaced.
///
/// Each orchestrator owns its own instance, so separate syncs never share pacing state.
#[derive(Debug)]
pub struct RateLimiter {
	period: Duration,
	ticker: Mutex<Interval>,
}

impl RateLimiter {
	/// Create a limiter with period `1s / max_requests_per_second`.
	pub fn per_second(max_requests_per_second: u32) -> Result<Self, ConfigError> {
		if max_requests_per_second == 0 {
			return Err(ConfigError::InvalidSetting(
				"max requests per second must be greater than zero".to_string(),
			));
		}
		let period = Duration::from_secs(1) / max_requests_per_second;
		if period.is_zero() {
			return Err(ConfigError::InvalidSetting(format!(
				"max requests per second {} exceeds one per nanosecond",
				max_requests_per_second
			)));
		}
		Ok(Self::with_period(period))
	}

	/// Create a limiter that admits one caller per `period`; a zero period is raised
	/// to one nanosecond.
	pub fn with_period(period: Duration) -> Self {
		let period = period.max(MIN_PERIOD);
		let mut ticker = tokio::time::interval(period);
		// After a stall, keep the full spacing instead of bursting to catch up.
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		Self {
			period,
			ticker: Mutex::new(ticker),
		}
	}

	pub fn period(&self) -> Duration {
		self.period
	}

	/// Wait until the next request may be issued; returns the admission instant.
	///
	/// The first call is admitted immediately. Safe to call from many tasks at once;
	/// callers are admitted one per period in the order they queued on the lock.
	pub async fn admit(&self) -> Instant {
		let mut ticker = self.ticker.lock().await;
		// `tick` yields the scheduled deadline, which lags after a stall.
		ticker.tick().await;
		Instant::now()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	#[test]
	fn test_zero_rate_is_rejected() {
		assert!(matches!(
			RateLimiter::per_second(0),
			Err(ConfigError::InvalidSetting(_))
		));
	}

	#[tokio::test]
	async fn test_rate_above_one_per_nanosecond_is_rejected() {
		assert!(matches!(
			RateLimiter::per_second(2_000_000_000),
			Err(ConfigError::InvalidSetting(_))
		));
		assert_eq!(
			RateLimiter::per_second(1_000_000_000).unwrap().period(),
			Duration::from_nanos(1)
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_zero_period_is_raised_to_minimum() {
		let limiter = RateLimiter::with_period(Duration::ZERO);
		assert_eq!(limiter.period(), Duration::from_nanos(1));

		let first = limiter.admit().await;
		let second = limiter.admit().await;
		assert!(second - first >= Duration::from_nanos(1));
	}

	#[tokio::test(start_paused = true)]
	async fn test_first_admission_is_immediate() {
		let limiter = RateLimiter::per_second(10).unwrap();
		let start = Instant::now();
		limiter.admit().await;
		assert_eq!(Instant::now() - start, Duration::ZERO);
	}

	#[tokio::test(start_paused = true)]
	async fn test_thirty_admissions_at_ten_per_second() {
		let limiter = RateLimiter::per_second(10).unwrap();
		assert_eq!(limiter.period(), Duration::from_millis(100));

		let mut launches = Vec::new();
		for _ in 0..30 {
			launches.push(limiter.admit().await);
		}

		for pair in launches.windows(2) {
			assert!(pair[1] - pair[0] >= Duration::from_millis(100));
		}
		let span = *launches.last().unwrap() - launches[0];
		assert!(span >= Duration::from_millis(2900), "span was {:?}", span);
	}

	#[tokio::test(start_paused = true)]
	async fn test_slow_callers_do_not_cause_a_burst() {
		let limiter = RateLimiter::per_second(10).unwrap();
		let first = limiter.admit().await;
		tokio::time::sleep(Duration::from_secs(1)).await;
		let second = limiter.admit().await;
		let third = limiter.admit().await;

		assert!(second - first >= Duration::from_millis(100));
		assert!(third - second >= Duration::from_millis(100));
	}

	#[tokio::test(start_paused = true)]
	async fn test_concurrent_admissions_stay_spaced() {
		let limiter = Arc::new(RateLimiter::per_second(20).unwrap());

		let handles: Vec<_> = (0..10)
			.map(|_| {
				let limiter = limiter.clone();
				tokio::spawn(async move { limiter.admit().await })
			})
			.collect();

		let mut launches: Vec<Instant> = futures::future::join_all(handles)
			.await
			.into_iter()
			.map(|r| r.unwrap())
			.collect();
		launches.sort();

		for pair in launches.windows(2) {
			assert!(pair[1] - pair[0] >= Duration::from_millis(50));
		}
	}
}
