// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::types::{JobKey, TriggerKey};
use chrono::{DateTime, Utc};
use loom_jobs_core::DataMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub use tokio_util::sync::CancellationToken;

/// Everything a job sees about the firing that started it.
#[derive(Clone)]
pub struct JobContext {
	pub job_key: JobKey,
	pub trigger_key: TriggerKey,
	pub trigger_data: DataMap,
	pub fire_instance_id: String,
	pub fire_time: DateTime<Utc>,
	pub cancellation_token: CancellationToken,
	pub progress: RunProgress,
}

impl JobContext {
	pub fn new(job_key: JobKey, trigger_key: TriggerKey) -> Self {
		Self {
			job_key,
			trigger_key,
			trigger_data: DataMap::new(),
			fire_instance_id: uuid::Uuid::new_v4().to_string(),
			fire_time: Utc::now(),
			cancellation_token: CancellationToken::new(),
			progress: RunProgress::default(),
		}
	}

	pub fn with_trigger_data(mut self, data: DataMap) -> Self {
		self.trigger_data = data;
		self
	}

	pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
		self.cancellation_token = token;
		self
	}

	/// Manual and system firings bypass element trigger bindings.
	pub fn is_manual_or_system(&self) -> bool {
		self.trigger_key.is_manual() || self.trigger_key.is_system()
	}
}

/// Progress of an operation batch, readable while the run is in flight.
#[derive(Clone, Default)]
pub struct RunProgress {
	inner: Arc<ProgressCounters>,
}

#[derive(Default)]
struct ProgressCounters {
	current: AtomicUsize,
	total: AtomicUsize,
}

impl RunProgress {
	pub fn start(&self, total: usize) {
		self.inner.total.store(total, Ordering::SeqCst);
		self.inner.current.store(0, Ordering::SeqCst);
	}

	pub fn advance(&self) -> usize {
		self.inner.current.fetch_add(1, Ordering::SeqCst) + 1
	}

	pub fn current(&self) -> usize {
		self.inner.current.load(Ordering::SeqCst)
	}

	pub fn total(&self) -> usize {
		self.inner.total.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_progress() {
		let progress = RunProgress::default();
		progress.start(3);
		assert_eq!(progress.advance(), 1);
		assert_eq!(progress.advance(), 2);
		assert_eq!(progress.current(), 2);
		assert_eq!(progress.total(), 3);
	}

	#[test]
	fn test_manual_firing_bypasses_bindings() {
		let ctx = JobContext::new(JobKey::named("j"), TriggerKey::manual("j"));
		assert!(ctx.is_manual_or_system());
		let ctx = JobContext::new(JobKey::named("j"), TriggerKey::named("nightly"));
		assert!(!ctx.is_manual_or_system());
	}
}
