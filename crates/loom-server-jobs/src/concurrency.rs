// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// Run every action with at most `max_in_flight` executing at once.
///
/// A permit is taken before each action is spawned and released when that
/// action finishes, panics included. Returns once the whole batch has
/// drained, with results in submission order. A panicking action yields an
/// `Err` in its slot and does not affect its siblings.
pub async fn run_bounded<T, F, Fut>(
	actions: impl IntoIterator<Item = F>,
	max_in_flight: usize,
) -> Vec<Result<T, JoinError>>
where
	F: FnOnce() -> Fut,
	Fut: Future<Output = T> + Send + 'static,
	T: Send + 'static,
{
	let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
	let mut handles = Vec::new();

	for action in actions {
		// The semaphore is owned here and never closed.
		let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
			break;
		};
		let future = action();
		handles.push(tokio::spawn(async move {
			let _permit = permit;
			future.await
		}));
	}

	futures::future::join_all(handles).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	#[tokio::test(start_paused = true)]
	async fn test_never_exceeds_limit() {
		let running = Arc::new(AtomicUsize::new(0));
		let peak = Arc::new(AtomicUsize::new(0));

		let actions = (0..20).map(|i| {
			let running = Arc::clone(&running);
			let peak = Arc::clone(&peak);
			move || async move {
				let now = running.fetch_add(1, Ordering::SeqCst) + 1;
				peak.fetch_max(now, Ordering::SeqCst);
				tokio::time::sleep(Duration::from_millis(10 + (i % 3) * 5)).await;
				running.fetch_sub(1, Ordering::SeqCst);
				i
			}
		});

		let results = run_bounded(actions, 4).await;

		assert_eq!(results.len(), 20);
		assert!(peak.load(Ordering::SeqCst) <= 4);
		assert_eq!(running.load(Ordering::SeqCst), 0);
		let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
		assert_eq!(values, (0..20).collect::<Vec<_>>());
	}

	#[tokio::test]
	async fn test_panicking_action_does_not_abort_siblings() {
		let completed = Arc::new(AtomicUsize::new(0));

		let actions = (0..5).map(|i| {
			let completed = Arc::clone(&completed);
			move || async move {
				if i == 2 {
					panic!("element blew up");
				}
				completed.fetch_add(1, Ordering::SeqCst);
			}
		});

		let results = run_bounded(actions, 2).await;

		assert_eq!(completed.load(Ordering::SeqCst), 4);
		assert!(results[2].as_ref().unwrap_err().is_panic());
		assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);
	}

	#[tokio::test]
	async fn test_zero_limit_is_treated_as_one() {
		let results = run_bounded((0..3).map(|i| move || async move { i * 2 }), 0).await;
		assert_eq!(results.len(), 3);
	}
}
