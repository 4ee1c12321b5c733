// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-job circuit breaker.
//!
//! Counts consecutive failed and successful firings in the job's data map.
//! Reaching the failure threshold pauses the job and schedules a system
//! trigger that resumes it after the pause span.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loom_jobs_core::{
	BreakerTransition, CircuitBreakerMetadata, CircuitBreakerSettings, DataMap,
	CIRCUIT_BREAKER_DATA_KEY,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::audit::{JobAuditRecord, JobAuditSink};
use crate::context::JobContext;
use crate::error::{JobError, Result};
use crate::job::Job;
use crate::listener::{CompletedFiring, JobListener};
use crate::monitor::{Monitor, MonitorEvent};
use crate::runtime::SchedulerRuntime;
use crate::store::{DataScope, JobDataStore};
use crate::types::{JobDetails, JobKey, JobOutput, OneShotTrigger, RunOutcome, TriggerKey};

/// Name of the system job that resumes paused jobs.
pub const RESUME_JOB_NAME: &str = "resume";
pub const RESUME_TARGET_GROUP_KEY: &str = "resume.job.group";
pub const RESUME_TARGET_NAME_KEY: &str = "resume.job.name";

pub fn resume_job_key() -> JobKey {
	JobKey::system(RESUME_JOB_NAME)
}

/// System trigger that resumes `job_key` at `fire_at`. One per job.
pub fn resume_trigger(job_key: &JobKey, fire_at: DateTime<Utc>) -> OneShotTrigger {
	let mut data = DataMap::new();
	data.insert(RESUME_TARGET_GROUP_KEY.to_string(), job_key.group.clone());
	data.insert(RESUME_TARGET_NAME_KEY.to_string(), job_key.name.clone());
	OneShotTrigger {
		key: TriggerKey::system(format!("resume.{job_key}")),
		job_key: resume_job_key(),
		fire_at,
		data,
	}
}

/// Persisted breaker state of `job_key`, if any.
pub async fn read_breaker_state(
	store: &dyn JobDataStore,
	job_key: &JobKey,
) -> Result<Option<CircuitBreakerMetadata>> {
	let scope = DataScope::Job(job_key.clone());
	match store.get(&scope, CIRCUIT_BREAKER_DATA_KEY).await? {
		Some(blob) => Ok(Some(CircuitBreakerMetadata::from_blob(&blob)?)),
		None => Ok(None),
	}
}

pub struct JobCircuitBreaker {
	store: Arc<dyn JobDataStore>,
	runtime: Arc<dyn SchedulerRuntime>,
	audit: Arc<dyn JobAuditSink>,
	monitor: Monitor,
}

impl JobCircuitBreaker {
	pub fn new(
		store: Arc<dyn JobDataStore>,
		runtime: Arc<dyn SchedulerRuntime>,
		audit: Arc<dyn JobAuditSink>,
		monitor: Monitor,
	) -> Self {
		Self {
			store,
			runtime,
			audit,
			monitor,
		}
	}

	async fn load_metadata(
		&self,
		scope: &DataScope,
		settings: CircuitBreakerSettings,
	) -> Result<CircuitBreakerMetadata> {
		let Some(blob) = self.store.get(scope, CIRCUIT_BREAKER_DATA_KEY).await? else {
			return Ok(CircuitBreakerMetadata::new(settings));
		};

		match CircuitBreakerMetadata::from_blob(&blob) {
			Ok(metadata) => Ok(metadata.with_settings(settings)),
			Err(e) => {
				warn!(owner = %scope.owner(), error = %e, "unreadable circuit breaker metadata, starting from zero");
				Ok(CircuitBreakerMetadata::new(settings))
			}
		}
	}

	async fn trip(&self, job: &JobDetails, settings: CircuitBreakerSettings) -> Result<()> {
		let pause = chrono::Duration::from_std(settings.pause_span)
			.map_err(|e| JobError::Internal(format!("pause span out of range: {e}")))?;
		let resume_at = Utc::now() + pause;

		match self.runtime.schedule_one_shot(resume_trigger(&job.key, resume_at)).await {
			Ok(()) => {}
			Err(JobError::TriggerExists(trigger)) => {
				debug!(job_key = %job.key, trigger = %trigger, "resume trigger already scheduled");
			}
			Err(e) => return Err(e),
		}

		self.runtime.pause_job(&job.key).await?;
		warn!(
			job_key = %job.key,
			failure_threshold = settings.failure_threshold,
			pause_span_secs = settings.pause_span.as_secs(),
			resume_at = %resume_at,
			"circuit breaker tripped, job paused"
		);

		let record = JobAuditRecord::new(
			job.key.clone(),
			format!("Circuit breaker tripped for job {}", job.key),
			serde_json::json!({
				"job_description": job.description,
				"failure_threshold": settings.failure_threshold,
				"success_threshold": settings.success_threshold,
				"pause_span_secs": settings.pause_span.as_secs(),
				"resume_at": resume_at.to_rfc3339(),
			}),
		);
		if let Err(e) = self.audit.publish(&record).await {
			error!(sink = self.audit.name(), job_key = %job.key, error = %e, "failed to publish audit record");
		}

		self.monitor
			.raise(MonitorEvent::circuit_breaker_tripped(&job.key, &settings, resume_at))
			.await;
		Ok(())
	}
}

#[async_trait]
impl JobListener for JobCircuitBreaker {
	fn name(&self) -> &str {
		"circuit-breaker"
	}

	#[instrument(skip_all, fields(job_key = %firing.job.key, fire_instance_id = %firing.fire_instance_id))]
	async fn on_firing_completed(&self, firing: &CompletedFiring) -> Result<()> {
		if firing.job.key.is_system() {
			return Ok(());
		}
		let Some(settings) = firing.job.circuit_breaker else {
			return Ok(());
		};
		let succeeded = match firing.outcome {
			RunOutcome::Succeeded(_) => true,
			RunOutcome::Failed { .. } => false,
			RunOutcome::Cancelled => return Ok(()),
		};

		let scope = DataScope::Job(firing.job.key.clone());
		let mut metadata = self.load_metadata(&scope, settings).await?;
		let transition = if succeeded {
			metadata.record_success()
		} else {
			metadata.record_failure()
		};

		let tripped = match transition {
			BreakerTransition::Unchanged => return Ok(()),
			BreakerTransition::Counted => {
				debug!(
					fail_counter = metadata.fail_counter,
					success_counter = metadata.success_counter,
					"circuit breaker counted firing"
				);
				Ok(())
			}
			BreakerTransition::Recovered => {
				info!("circuit breaker recovered, counters reset");
				Ok(())
			}
			BreakerTransition::Tripped => self.trip(&firing.job, settings).await,
		};

		// Counters are persisted even when the trip fails part way.
		self.store
			.put(&scope, CIRCUIT_BREAKER_DATA_KEY, &metadata.to_blob()?)
			.await?;
		tripped
	}
}

/// System job fired by the resume trigger.
pub struct ResumeJob {
	runtime: Arc<dyn SchedulerRuntime>,
}

impl ResumeJob {
	pub fn new(runtime: Arc<dyn SchedulerRuntime>) -> Self {
		Self { runtime }
	}
}

#[async_trait]
impl Job for ResumeJob {
	async fn run(&self, ctx: &JobContext) -> std::result::Result<JobOutput, JobError> {
		let (Some(group), Some(name)) = (
			ctx.trigger_data.get(RESUME_TARGET_GROUP_KEY),
			ctx.trigger_data.get(RESUME_TARGET_NAME_KEY),
		) else {
			return Err(JobError::Failed {
				message: format!("resume trigger {} names no target job", ctx.trigger_key),
				retryable: false,
			});
		};

		let target = JobKey::new(group.clone(), name.clone());
		self.runtime.resume_job(&target).await?;
		info!(job_key = %target, "job resumed after circuit breaker pause");

		Ok(JobOutput {
			message: format!("resumed {target}"),
			metadata: None,
		})
	}
}
