// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use loom_jobs_core::DataMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

use crate::error::Result;
use crate::types::{JobDetails, RunOutcome, TriggerKey};

/// A finished firing, handed to every listener.
#[derive(Debug, Clone)]
pub struct CompletedFiring {
	pub job: JobDetails,
	pub trigger_key: TriggerKey,
	pub trigger_data: DataMap,
	pub fire_instance_id: String,
	pub fire_time: DateTime<Utc>,
	pub outcome: RunOutcome,
}

/// Observes completed firings. Errors are logged by the scheduler and never
/// reach the job.
#[async_trait]
pub trait JobListener: Send + Sync {
	fn name(&self) -> &str;

	async fn on_firing_completed(&self, firing: &CompletedFiring) -> Result<()>;
}

/// Hand `firing` to each listener in turn, isolating errors and panics.
pub async fn notify_listeners(listeners: &[Arc<dyn JobListener>], firing: &CompletedFiring) {
	for listener in listeners {
		let result = AssertUnwindSafe(listener.on_firing_completed(firing))
			.catch_unwind()
			.await;
		match result {
			Ok(Ok(())) => {}
			Ok(Err(e)) => {
				error!(
					listener = listener.name(),
					job_key = %firing.job.key,
					fire_instance_id = %firing.fire_instance_id,
					error = %e,
					"job listener failed"
				);
			}
			Err(_) => {
				error!(
					listener = listener.name(),
					job_key = %firing.job.key,
					fire_instance_id = %firing.fire_instance_id,
					"job listener panicked"
				);
			}
		}
	}
}
