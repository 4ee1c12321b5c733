// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::context::CancellationToken;

/// Fixed-delay retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Extra attempts after the first call.
	pub retries: u32,
	pub interval: Duration,
}

impl RetryPolicy {
	pub fn new(retries: u32, interval: Duration) -> Self {
		Self { retries, interval }
	}

	pub fn none() -> Self {
		Self::new(0, Duration::ZERO)
	}
}

#[derive(Debug)]
pub enum RetryError<E> {
	/// Every attempt failed. Holds the last error.
	Exhausted { attempts: u32, error: E },
	/// Cancelled while waiting for the next attempt. Holds the last error.
	Cancelled { attempts: u32, error: E },
}

impl<E> RetryError<E> {
	pub fn attempts(&self) -> u32 {
		match self {
			Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
		}
	}

	pub fn into_inner(self) -> E {
		match self {
			Self::Exhausted { error, .. } | Self::Cancelled { error, .. } => error,
		}
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled { .. })
	}
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Exhausted { attempts, error } => {
				write!(f, "failed after {attempts} attempts: {error}")
			}
			Self::Cancelled { attempts, error } => {
				write!(f, "cancelled after {attempts} attempts: {error}")
			}
		}
	}
}

/// Call `op` until it succeeds or `policy.retries` extra attempts are used.
///
/// Waits `policy.interval` between attempts and logs the failure reason
/// before each retry. A cancelled `token` abandons the wait.
pub async fn execute_with_retry<T, E, F, Fut>(
	policy: RetryPolicy,
	token: &CancellationToken,
	label: &str,
	mut op: F,
) -> Result<T, RetryError<E>>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: fmt::Display,
{
	let mut attempt = 1u32;
	loop {
		let error = match op().await {
			Ok(value) => return Ok(value),
			Err(error) => error,
		};

		if attempt > policy.retries {
			return Err(RetryError::Exhausted {
				attempts: attempt,
				error,
			});
		}

		warn!(
			operation = label,
			attempt,
			max_attempts = policy.retries + 1,
			delay_ms = policy.interval.as_millis() as u64,
			error = %error,
			"attempt failed, retrying"
		);

		tokio::select! {
			_ = tokio::time::sleep(policy.interval) => {}
			_ = token.cancelled() => {
				return Err(RetryError::Cancelled {
					attempts: attempt,
					error,
				});
			}
		}

		attempt += 1;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;
	use tokio::time::Instant;

	#[tokio::test(start_paused = true)]
	async fn test_always_failing_op_is_called_k_plus_one_times() {
		let calls = Arc::new(AtomicU32::new(0));
		let started = Instant::now();
		let token = CancellationToken::new();

		let result: Result<(), _> = execute_with_retry(
			RetryPolicy::new(3, Duration::from_secs(5)),
			&token,
			"always-fails",
			|| {
				let calls = Arc::clone(&calls);
				async move {
					calls.fetch_add(1, Ordering::SeqCst);
					Err::<(), _>("still broken")
				}
			},
		)
		.await;

		let err = result.unwrap_err();
		assert_eq!(calls.load(Ordering::SeqCst), 4);
		assert_eq!(err.attempts(), 4);
		assert!(!err.is_cancelled());
		assert!(started.elapsed() >= Duration::from_secs(15));
	}

	#[tokio::test(start_paused = true)]
	async fn test_success_after_failures_returns_value() {
		let calls = Arc::new(AtomicU32::new(0));
		let token = CancellationToken::new();

		let result = execute_with_retry(
			RetryPolicy::new(5, Duration::from_secs(1)),
			&token,
			"flaky",
			|| {
				let calls = Arc::clone(&calls);
				async move {
					let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
					if n < 3 {
						Err(format!("attempt {n} failed"))
					} else {
						Ok(n)
					}
				}
			},
		)
		.await;

		assert_eq!(result.unwrap(), 3);
	}

	#[tokio::test]
	async fn test_no_retries_calls_once() {
		let calls = AtomicU32::new(0);
		let token = CancellationToken::new();
		let result: Result<(), _> = execute_with_retry(RetryPolicy::none(), &token, "once", || {
			calls.fetch_add(1, Ordering::SeqCst);
			async { Err::<(), _>("nope") }
		})
		.await;
		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancellation_abandons_retry_wait() {
		let token = CancellationToken::new();
		let calls = Arc::new(AtomicU32::new(0));

		let task = {
			let token = token.clone();
			let calls = Arc::clone(&calls);
			tokio::spawn(async move {
				execute_with_retry(
					RetryPolicy::new(10, Duration::from_secs(59)),
					&token,
					"cancelled",
					|| {
						let calls = Arc::clone(&calls);
						async move {
							calls.fetch_add(1, Ordering::SeqCst);
							Err::<(), _>("down")
						}
					},
				)
				.await
			})
		};

		tokio::time::sleep(Duration::from_secs(1)).await;
		token.cancel();

		let err = task.await.unwrap().unwrap_err();
		assert!(err.is_cancelled());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
