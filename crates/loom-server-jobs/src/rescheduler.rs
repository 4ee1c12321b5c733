// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Trigger-level retries.
//!
//! A failed firing whose trigger data carries a retry span is re-fired by a
//! one-shot trigger in the `loom.retry` group. The attempt counter travels
//! in the trigger data, so every retry trigger knows how many came before it.

use async_trait::async_trait;
use chrono::Utc;
use loom_jobs_core::{
	build_retry_data, retry_trigger_name, RetryPlan, RetryTriggerConfig, RETRY_TRIGGER_GROUP,
	TRIGGER_ID_KEY,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{JobError, Result};
use crate::listener::{CompletedFiring, JobListener};
use crate::monitor::{Monitor, MonitorEvent};
use crate::runtime::SchedulerRuntime;
use crate::types::{OneShotTrigger, TriggerKey};

pub struct RetryTriggerRescheduler {
	runtime: Arc<dyn SchedulerRuntime>,
	monitor: Monitor,
	default_max_retries: u32,
}

impl RetryTriggerRescheduler {
	pub fn new(runtime: Arc<dyn SchedulerRuntime>, monitor: Monitor, default_max_retries: u32) -> Self {
		Self {
			runtime,
			monitor,
			default_max_retries,
		}
	}
}

#[async_trait]
impl JobListener for RetryTriggerRescheduler {
	fn name(&self) -> &str {
		"retry-rescheduler"
	}

	#[instrument(skip_all, fields(job_key = %firing.job.key, trigger_key = %firing.trigger_key))]
	async fn on_firing_completed(&self, firing: &CompletedFiring) -> Result<()> {
		if firing.job.key.is_system() || firing.trigger_key.is_system() {
			return Ok(());
		}
		if !firing.outcome.is_failure() {
			return Ok(());
		}
		let Some(config) = RetryTriggerConfig::from_data(&firing.trigger_data)? else {
			return Ok(());
		};

		let (attempt, retry_span, max_retries) = match config.plan(self.default_max_retries) {
			RetryPlan::NoRetrySpan => {
				debug!("trigger has retry settings but no retry span");
				return Ok(());
			}
			RetryPlan::Exhausted {
				attempts,
				max_retries,
			} => {
				warn!(attempts, max_retries, "last retry failed, giving up");
				self.monitor
					.raise(MonitorEvent::last_retry_failed(
						&firing.job.key,
						&firing.trigger_key,
						attempts,
						max_retries,
					))
					.await;
				return Ok(());
			}
			RetryPlan::Retry {
				attempt,
				retry_span,
				max_retries,
			} => (attempt, retry_span, max_retries),
		};

		let origin_id = firing
			.trigger_data
			.get(TRIGGER_ID_KEY)
			.cloned()
			.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
		let new_trigger_id = uuid::Uuid::new_v4().to_string();
		let span = chrono::Duration::from_std(retry_span)
			.map_err(|e| JobError::Internal(format!("retry span out of range: {e}")))?;
		let fire_at = Utc::now() + span;

		let trigger = OneShotTrigger {
			key: TriggerKey::new(RETRY_TRIGGER_GROUP, retry_trigger_name(attempt, &origin_id)),
			job_key: firing.job.key.clone(),
			fire_at,
			data: build_retry_data(
				&firing.trigger_data,
				&new_trigger_id,
				attempt,
				retry_span,
				max_retries,
			),
		};
		let trigger_key = trigger.key.clone();

		match self.runtime.schedule_one_shot(trigger).await {
			Ok(()) => {}
			Err(JobError::TriggerExists(_)) => {
				debug!(retry_trigger = %trigger_key, "retry trigger already scheduled");
				return Ok(());
			}
			Err(e) => return Err(e),
		}

		info!(
			retry_trigger = %trigger_key,
			attempt,
			max_retries,
			fire_at = %fire_at,
			"retry scheduled"
		);
		self.monitor
			.raise(MonitorEvent::retry_scheduled(
				&firing.job.key,
				&trigger_key,
				attempt,
				max_retries,
				fire_at,
			))
			.await;
		Ok(())
	}
}
