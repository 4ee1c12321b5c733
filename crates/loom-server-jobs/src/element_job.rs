// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Jobs whose work is a batch of check or operation elements.

use async_trait::async_trait;
use loom_jobs_core::{
	CheckStatus, ElementSettings, ElementStatus, ExecutionPolicy, JobsCoreError, OperationStatus,
};
use serde::Serialize;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::context::JobContext;
use crate::error::{JobError, Result};
use crate::fail_span::FailSpanTracker;
use crate::invocation::{Element, ElementWork, InvocationEngine};
use crate::job::Job;
use crate::store::JobDataStore;
use crate::types::JobOutput;

pub struct ElementJob<S: ElementStatus> {
	policy: ExecutionPolicy,
	store: Arc<dyn JobDataStore>,
	elements: Vec<(ElementSettings, Arc<dyn ElementWork>)>,
	_status: PhantomData<fn() -> S>,
}

pub type CheckJob = ElementJob<CheckStatus>;
pub type OperationJob = ElementJob<OperationStatus>;

impl<S: ElementStatus> ElementJob<S> {
	pub fn new(policy: ExecutionPolicy, store: Arc<dyn JobDataStore>) -> Self {
		Self {
			policy,
			store,
			elements: Vec::new(),
			_status: PhantomData,
		}
	}

	pub fn with_element(mut self, settings: ElementSettings, work: Arc<dyn ElementWork>) -> Self {
		self.elements.push((settings, work));
		self
	}

	pub fn policy(&self) -> &ExecutionPolicy {
		&self.policy
	}

	/// Checks the policy, every element's settings and key uniqueness.
	pub fn validate(&self) -> Result<()> {
		self.policy.validate()?;

		let mut seen = HashSet::new();
		for (settings, _) in &self.elements {
			settings.validate()?;
			if !seen.insert(settings.key.as_str()) {
				return Err(JobsCoreError::Validation(format!(
					"duplicate element key '{}'",
					settings.key
				))
				.into());
			}
		}
		Ok(())
	}
}

#[async_trait]
impl<S> Job for ElementJob<S>
where
	S: ElementStatus + Serialize,
{
	#[instrument(skip_all, fields(job_key = %ctx.job_key, fire_instance_id = %ctx.fire_instance_id))]
	async fn run(&self, ctx: &JobContext) -> std::result::Result<JobOutput, JobError> {
		self.validate()?;

		if ctx.cancellation_token.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let elements = self
			.elements
			.iter()
			.map(|(settings, work)| Element::<S>::new(settings.clone(), Arc::clone(work)))
			.collect();

		let engine = InvocationEngine::<S>::new(
			self.policy,
			FailSpanTracker::new(Arc::clone(&self.store), &ctx.job_key),
		);
		let report = engine.run(elements, ctx).await;
		if ctx.cancellation_token.is_cancelled() {
			warn!(invoked = report.invoked(), "run cancelled, element results discarded");
			return Err(JobError::Cancelled);
		}

		let summary = report.summary();
		info!(
			total = summary.total(),
			success = summary.count(S::SUCCESS),
			exception = summary.count(S::EXCEPTION),
			ignored = summary.count(S::IGNORE),
			inactive = summary.count(S::INACTIVE),
			failures = report.failures.len(),
			"element batch finished"
		);

		let details = report.finalize(ctx)?;
		Ok(JobOutput {
			message: format!(
				"{} of {} elements invoked",
				details.effected_rows.unwrap_or(0),
				details.payload.len()
			),
			metadata: Some(serde_json::to_value(&details)?),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::InMemoryJobDataStore;
	use crate::testing::ScriptedWork;
	use crate::types::{JobKey, TriggerKey};

	fn store() -> Arc<dyn JobDataStore> {
		Arc::new(InMemoryJobDataStore::new())
	}

	fn ctx() -> JobContext {
		JobContext::new(JobKey::named("ops"), TriggerKey::named("nightly"))
	}

	#[tokio::test]
	async fn test_invalid_policy_is_fatal() {
		let job = OperationJob::new(ExecutionPolicy::parallel(1), store())
			.with_element(ElementSettings::new("a"), Arc::new(ScriptedWork::succeed()));

		let err = job.run(&ctx()).await.unwrap_err();
		assert!(matches!(err, JobError::Core(JobsCoreError::Validation(_))));
	}

	#[tokio::test]
	async fn test_duplicate_keys_rejected() {
		let job = CheckJob::new(ExecutionPolicy::default(), store())
			.with_element(ElementSettings::new("a"), Arc::new(ScriptedWork::succeed()))
			.with_element(ElementSettings::new("a"), Arc::new(ScriptedWork::succeed()));

		assert!(job.validate().is_err());
	}

	#[tokio::test]
	async fn test_successful_run_reports_details() {
		let job = OperationJob::new(ExecutionPolicy::sequential(false), store())
			.with_element(ElementSettings::new("a"), Arc::new(ScriptedWork::succeed()))
			.with_element(ElementSettings::new("b").inactive(), Arc::new(ScriptedWork::succeed()));

		let output = job.run(&ctx()).await.unwrap();
		assert_eq!(output.message, "1 of 2 elements invoked");
		let metadata = output.metadata.unwrap();
		assert_eq!(metadata["success"], true);
		assert_eq!(metadata["job_key"], "default.ops");
		assert_eq!(metadata["payload"][1]["status"], "inactive");
	}

	#[tokio::test]
	async fn test_cancelled_context_does_not_run() {
		let work = ScriptedWork::succeed();
		let calls = work.calls();
		let job = CheckJob::new(ExecutionPolicy::default(), store())
			.with_element(ElementSettings::new("a"), Arc::new(work));
		let context = ctx();
		context.cancellation_token.cancel();

		assert!(matches!(job.run(&context).await, Err(JobError::Cancelled)));
		assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_mid_retry_reports_cancelled() {
		let job = CheckJob::new(ExecutionPolicy::sequential(false), store()).with_element(
			ElementSettings::new("a").with_retry(5, std::time::Duration::from_secs(30)),
			Arc::new(ScriptedWork::always_declared("down")),
		);
		let context = ctx();
		let token = context.cancellation_token.clone();

		let (result, ()) = tokio::join!(job.run(&context), async {
			tokio::time::sleep(std::time::Duration::from_secs(1)).await;
			token.cancel();
		});

		assert!(matches!(result, Err(JobError::Cancelled)));
	}
}
