// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-element safe invocation.
//!
//! Every element of a run ends with exactly one terminal status. Failures
//! are classified at the element boundary and queued; they never unwind
//! into the batch. [`InvocationReport::finalize`] turns the queue into the
//! run result.

use async_trait::async_trait;
use futures::FutureExt;
use loom_jobs_core::{
	ElementFailure, ElementSettings, ElementStatus, ExecutionPolicy, FinalizeDetails, RunFailure,
	StatusSummary,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::concurrency::run_bounded;
use crate::context::JobContext;
use crate::error::{JobError, Result};
use crate::fail_span::FailSpanTracker;
use crate::retry::{execute_with_retry, RetryPolicy};

/// The unit of work behind an element.
#[async_trait]
pub trait ElementWork: Send + Sync {
	async fn run(
		&self,
		element: &ElementSettings,
		ctx: &JobContext,
	) -> std::result::Result<(), ElementFailure>;
}

/// [`ElementWork`] from an async closure.
pub struct FnWork<F>(F);

pub fn work_fn<F, Fut>(f: F) -> FnWork<F>
where
	F: Fn(ElementSettings, JobContext) -> Fut + Send + Sync,
	Fut: Future<Output = std::result::Result<(), ElementFailure>> + Send,
{
	FnWork(f)
}

#[async_trait]
impl<F, Fut> ElementWork for FnWork<F>
where
	F: Fn(ElementSettings, JobContext) -> Fut + Send + Sync,
	Fut: Future<Output = std::result::Result<(), ElementFailure>> + Send,
{
	async fn run(
		&self,
		element: &ElementSettings,
		ctx: &JobContext,
	) -> std::result::Result<(), ElementFailure> {
		(self.0)(element.clone(), ctx.clone()).await
	}
}

/// An element of one run: settings, work and the status it ended with.
pub struct Element<S: ElementStatus> {
	pub settings: ElementSettings,
	work: Arc<dyn ElementWork>,
	status: Option<S>,
	message: Option<String>,
}

impl<S: ElementStatus> Element<S> {
	pub fn new(settings: ElementSettings, work: Arc<dyn ElementWork>) -> Self {
		Self {
			settings,
			work,
			status: None,
			message: None,
		}
	}

	pub fn key(&self) -> &str {
		&self.settings.key
	}

	pub fn status(&self) -> Option<S> {
		self.status
	}

	fn complete(&mut self, status: S, message: Option<String>) {
		self.status = Some(status);
		self.message = message;
	}
}

/// Append-only queue of the failures of one run.
#[derive(Debug, Default)]
pub struct FailureQueue {
	failures: Mutex<Vec<RunFailure>>,
}

impl FailureQueue {
	pub fn push(&self, failure: RunFailure) {
		self.failures.lock().push(failure);
	}

	pub fn len(&self) -> usize {
		self.failures.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.failures.lock().is_empty()
	}

	pub fn drain(&self) -> Vec<RunFailure> {
		std::mem::take(&mut *self.failures.lock())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementResult<S> {
	pub key: String,
	pub status: S,
	pub message: Option<String>,
}

#[derive(Debug)]
pub struct InvocationReport<S: ElementStatus> {
	pub results: Vec<ElementResult<S>>,
	pub failures: Vec<RunFailure>,
}

impl<S: ElementStatus> InvocationReport<S> {
	fn new(elements: Vec<Element<S>>, failures: Vec<RunFailure>) -> Self {
		let results = elements
			.into_iter()
			.map(|element| ElementResult {
				status: element.status.unwrap_or(S::IGNORE),
				key: element.settings.key,
				message: element.message,
			})
			.collect();
		Self { results, failures }
	}

	pub fn summary(&self) -> StatusSummary<S> {
		StatusSummary::from_statuses(self.results.iter().map(|result| &result.status))
	}

	pub fn status_of(&self, key: &str) -> Option<S> {
		self.results
			.iter()
			.find(|result| result.key == key)
			.map(|result| result.status)
	}

	/// Elements whose work was called at least once.
	pub fn invoked(&self) -> usize {
		self.results
			.iter()
			.filter(|result| result.status != S::INACTIVE && result.status != S::IGNORE)
			.count()
	}

	/// No failures: success details. One: that failure. More: all of them.
	pub fn finalize(self, ctx: &JobContext) -> Result<FinalizeDetails<Vec<ElementResult<S>>>> {
		let invoked = self.invoked();
		let mut failures = self.failures;
		match failures.len() {
			0 => Ok(FinalizeDetails {
				job_key: ctx.job_key.to_string(),
				effected_rows: Some(invoked as i64),
				success: true,
				fire_instance_id: ctx.fire_instance_id.clone(),
				fire_time: ctx.fire_time,
				payload: self.results,
			}),
			1 => {
				let failure = failures.remove(0);
				Err(JobError::Failed {
					message: failure.to_string(),
					retryable: false,
				})
			}
			_ => Err(JobError::Aggregate(failures)),
		}
	}
}

/// Drives the elements of one run under an [`ExecutionPolicy`].
pub struct InvocationEngine<S: ElementStatus> {
	policy: ExecutionPolicy,
	tracker: FailSpanTracker,
	_status: PhantomData<fn() -> S>,
}

impl<S: ElementStatus> InvocationEngine<S> {
	pub fn new(policy: ExecutionPolicy, tracker: FailSpanTracker) -> Self {
		Self {
			policy,
			tracker,
			_status: PhantomData,
		}
	}

	#[instrument(skip_all, fields(job_key = %ctx.job_key, trigger_key = %ctx.trigger_key, elements = elements.len()))]
	pub async fn run(&self, mut elements: Vec<Element<S>>, ctx: &JobContext) -> InvocationReport<S> {
		let failures = Arc::new(FailureQueue::default());

		if self.policy.sequential_processing {
			self.run_sequential(&mut elements, ctx, &failures).await;
		} else {
			self.run_parallel(&mut elements, ctx, &failures).await;
		}

		InvocationReport::new(elements, failures.drain())
	}

	async fn run_sequential(
		&self,
		elements: &mut [Element<S>],
		ctx: &JobContext,
		failures: &Arc<FailureQueue>,
	) {
		let total = elements.len();
		if S::REPORTS_PROGRESS {
			ctx.progress.start(total);
		}

		let mut stopped_at = None;
		for (index, element) in elements.iter_mut().enumerate() {
			if ctx.cancellation_token.is_cancelled() {
				warn!(element_key = %element.settings.key, "run cancelled, batch stopped");
				stopped_at = Some(index);
				break;
			}

			let (status, message) =
				invoke_element::<S>(&element.settings, &element.work, ctx, &self.tracker, failures).await;
			element.complete(status, message);

			if S::REPORTS_PROGRESS {
				let current = ctx.progress.advance();
				debug!(current, total, "operation progress");
			}

			if self.policy.stop_running_on_fail && !status.is_valid() {
				warn!(element_key = %element.settings.key, %status, "stopping batch on failed element");
				failures.push(RunFailure::stop_running(element.settings.key.clone(), status));
				stopped_at = Some(index + 1);
				break;
			}
		}

		if let Some(index) = stopped_at {
			let reason = if ctx.cancellation_token.is_cancelled() {
				NOT_RUN_CANCELLED
			} else {
				"not run: batch stopped on failure"
			};
			for element in &mut elements[index..] {
				debug!(element_key = %element.settings.key, "not run after batch stopped");
				element.complete(S::IGNORE, Some(reason.to_string()));
			}
		}
	}

	async fn run_parallel(
		&self,
		elements: &mut [Element<S>],
		ctx: &JobContext,
		failures: &Arc<FailureQueue>,
	) {
		let actions: Vec<_> = elements
			.iter()
			.map(|element| {
				let settings = element.settings.clone();
				let work = Arc::clone(&element.work);
				let ctx = ctx.clone();
				let tracker = self.tracker.clone();
				let failures = Arc::clone(failures);
				move || async move {
					invoke_element::<S>(&settings, &work, &ctx, &tracker, &failures).await
				}
			})
			.collect();

		let results = run_bounded(actions, self.policy.max_degree_of_parallelism).await;

		for (element, result) in elements.iter_mut().zip(results) {
			match result {
				Ok((status, message)) => element.complete(status, message),
				Err(join_error) => {
					let message = format!("element task failed: {join_error}");
					error!(element_key = %element.settings.key, error = %join_error, "element task failed");
					failures.push(RunFailure::error(element.settings.key.clone(), message.clone()));
					element.complete(S::EXCEPTION, Some(message));
				}
			}
		}
	}
}

async fn invoke_element<S: ElementStatus>(
	settings: &ElementSettings,
	work: &Arc<dyn ElementWork>,
	ctx: &JobContext,
	tracker: &FailSpanTracker,
	failures: &FailureQueue,
) -> (S, Option<String>) {
	let key = settings.key.as_str();

	if ctx.cancellation_token.is_cancelled() {
		debug!(element_key = key, "run cancelled, element not started");
		return (S::IGNORE, Some(NOT_RUN_CANCELLED.to_string()));
	}

	if !settings.active {
		info!(element_key = key, "element inactive, skipping");
		return (S::INACTIVE, None);
	}

	if !settings.is_bound_to(&ctx.trigger_key.name, ctx.is_manual_or_system()) {
		info!(element_key = key, trigger_key = %ctx.trigger_key, "element not bound to firing trigger, ignoring");
		return (S::IGNORE, None);
	}

	if settings.veto {
		let reason = settings
			.veto_reason
			.clone()
			.unwrap_or_else(|| "vetoed".to_string());
		info!(element_key = key, reason = %reason, "element vetoed, ignoring");
		return (S::IGNORE, Some(reason));
	}

	let policy = RetryPolicy::new(settings.retry_count, settings.retry_interval);
	let result = execute_with_retry(policy, &ctx.cancellation_token, key, || async move {
		match AssertUnwindSafe(work.run(settings, ctx)).catch_unwind().await {
			Ok(result) => result,
			Err(panic) => Err(ElementFailure::defect(panic_message(panic))),
		}
	})
	.await;

	let retry_error = match result {
		Ok(()) => {
			if S::HONORS_FAIL_SPAN {
				if let Err(e) = tracker.reset_fail_span(key).await {
					warn!(element_key = key, error = %e, "failed to reset fail span");
				}
			}
			debug!(element_key = key, "element succeeded");
			return (S::SUCCESS, None);
		}
		Err(retry_error) => retry_error,
	};

	let attempts = retry_error.attempts();
	if retry_error.is_cancelled() {
		warn!(element_key = key, attempts, "run cancelled during retry wait, element abandoned");
		return (S::IGNORE, Some(NOT_RUN_CANCELLED.to_string()));
	}

	match retry_error.into_inner() {
		ElementFailure::Declared(message) => {
			let suppressed = if S::HONORS_FAIL_SPAN {
				tracker.is_span_valid(settings).await.unwrap_or_else(|e| {
					warn!(element_key = key, error = %e, "fail span lookup failed, escalating");
					false
				})
			} else {
				false
			};

			let status = S::declared_failure(suppressed);
			if suppressed {
				warn!(element_key = key, attempts, error = %message, "failure within allowed fail span, downgraded to warning");
			} else {
				warn!(element_key = key, attempts, %status, error = %message, "element failed");
				let failure = if status == S::EXCEPTION {
					RunFailure::error(key, message.clone())
				} else {
					RunFailure::check(key, message.clone())
				};
				failures.push(failure);
			}
			(status, Some(message))
		}
		ElementFailure::Defect(cause) => {
			error!(element_key = key, attempts, error = ?cause, "element raised an unexpected defect");
			let message = cause.to_string();
			failures.push(RunFailure::error(key, message.clone()));
			(S::EXCEPTION, Some(message))
		}
	}
}

const NOT_RUN_CANCELLED: &str = "abandoned: run cancelled";

fn panic_message(payload: Box<dyn Any + Send>) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		format!("panicked: {message}")
	} else if let Some(message) = payload.downcast_ref::<String>() {
		format!("panicked: {message}")
	} else {
		"panicked".to_string()
	}
}
