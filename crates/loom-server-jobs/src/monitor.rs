// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operator-facing monitoring events.
//!
//! Each event carries a message template with `{name}` placeholders and the
//! parameter map that fills them. Delivery (mail, chat, pager) belongs to the
//! sink; [`TracingMonitorSink`] only writes the rendered message to the log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loom_jobs_core::CircuitBreakerSettings;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, trace, warn};

use crate::types::{JobKey, TriggerKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorEventKind {
	CircuitBreakerTripped,
	RetryScheduled,
	LastRetryFailed,
	ExecutionStarted,
	ExecutionSucceeded,
	ExecutionFailed,
}

impl MonitorEventKind {
	pub fn is_alert(&self) -> bool {
		matches!(
			self,
			Self::CircuitBreakerTripped | Self::LastRetryFailed | Self::ExecutionFailed
		)
	}
}

impl fmt::Display for MonitorEventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::CircuitBreakerTripped => "circuit_breaker_tripped",
			Self::RetryScheduled => "retry_scheduled",
			Self::LastRetryFailed => "last_retry_failed",
			Self::ExecutionStarted => "execution_started",
			Self::ExecutionSucceeded => "execution_succeeded",
			Self::ExecutionFailed => "execution_failed",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorEvent {
	pub kind: MonitorEventKind,
	pub job_key: JobKey,
	pub template: String,
	pub params: BTreeMap<String, String>,
	pub raised_at: DateTime<Utc>,
}

impl MonitorEvent {
	pub fn new(kind: MonitorEventKind, job_key: JobKey, template: impl Into<String>) -> Self {
		let mut params = BTreeMap::new();
		params.insert("job".to_string(), job_key.to_string());
		Self {
			kind,
			job_key,
			template: template.into(),
			params,
			raised_at: Utc::now(),
		}
	}

	pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
		self.params.insert(name.into(), value.to_string());
		self
	}

	/// Fill `{name}` placeholders from the parameter map. Unknown
	/// placeholders are left as written.
	pub fn render(&self) -> String {
		let mut rendered = self.template.clone();
		for (name, value) in &self.params {
			rendered = rendered.replace(&format!("{{{name}}}"), value);
		}
		rendered
	}

	pub fn circuit_breaker_tripped(
		job_key: &JobKey,
		settings: &CircuitBreakerSettings,
		resume_at: DateTime<Utc>,
	) -> Self {
		Self::new(
			MonitorEventKind::CircuitBreakerTripped,
			job_key.clone(),
			"Circuit breaker tripped for job {job} after {failure_threshold} failed firings; \
			 paused for {pause_span_secs}s, resuming at {resume_at}",
		)
		.with_param("failure_threshold", settings.failure_threshold)
		.with_param("success_threshold", settings.success_threshold)
		.with_param("pause_span_secs", settings.pause_span.as_secs())
		.with_param("resume_at", resume_at.to_rfc3339())
	}

	pub fn retry_scheduled(
		job_key: &JobKey,
		retry_trigger: &TriggerKey,
		attempt: u32,
		max_retries: u32,
		fire_at: DateTime<Utc>,
	) -> Self {
		Self::new(
			MonitorEventKind::RetryScheduled,
			job_key.clone(),
			"Retry {attempt} of {max_retries} scheduled for job {job} at {fire_at} ({trigger})",
		)
		.with_param("attempt", attempt)
		.with_param("max_retries", max_retries)
		.with_param("fire_at", fire_at.to_rfc3339())
		.with_param("trigger", retry_trigger)
	}

	pub fn last_retry_failed(
		job_key: &JobKey,
		trigger_key: &TriggerKey,
		attempts: u32,
		max_retries: u32,
	) -> Self {
		Self::new(
			MonitorEventKind::LastRetryFailed,
			job_key.clone(),
			"Last retry failed for job {job} on trigger {trigger} after {attempts} of {max_retries} retries",
		)
		.with_param("trigger", trigger_key)
		.with_param("attempts", attempts)
		.with_param("max_retries", max_retries)
	}

	pub fn execution_started(job_key: &JobKey, trigger_key: &TriggerKey, fire_instance_id: &str) -> Self {
		Self::new(
			MonitorEventKind::ExecutionStarted,
			job_key.clone(),
			"Job {job} started by {trigger} ({fire_instance_id})",
		)
		.with_param("trigger", trigger_key)
		.with_param("fire_instance_id", fire_instance_id)
	}

	pub fn execution_succeeded(job_key: &JobKey, fire_instance_id: &str, message: &str) -> Self {
		Self::new(
			MonitorEventKind::ExecutionSucceeded,
			job_key.clone(),
			"Job {job} succeeded ({fire_instance_id}): {message}",
		)
		.with_param("fire_instance_id", fire_instance_id)
		.with_param("message", message)
	}

	pub fn execution_failed(job_key: &JobKey, fire_instance_id: &str, error: &str) -> Self {
		Self::new(
			MonitorEventKind::ExecutionFailed,
			job_key.clone(),
			"Job {job} failed ({fire_instance_id}): {error}",
		)
		.with_param("fire_instance_id", fire_instance_id)
		.with_param("error", error)
	}
}

#[async_trait]
pub trait MonitorSink: Send + Sync {
	fn name(&self) -> &str;

	async fn raise(&self, event: MonitorEvent);
}

/// Writes events to the log under the `loom_jobs::monitor` target.
#[derive(Debug, Default)]
pub struct TracingMonitorSink;

#[async_trait]
impl MonitorSink for TracingMonitorSink {
	fn name(&self) -> &str {
		"tracing"
	}

	async fn raise(&self, event: MonitorEvent) {
		let message = event.render();
		if event.kind.is_alert() {
			warn!(target: "loom_jobs::monitor", kind = %event.kind, job_key = %event.job_key, "{message}");
		} else {
			info!(target: "loom_jobs::monitor", kind = %event.kind, job_key = %event.job_key, "{message}");
		}
	}
}

/// Sink handle shared by the scheduler and listeners. Drops events when
/// monitoring is disabled in configuration.
#[derive(Clone)]
pub struct Monitor {
	sink: Arc<dyn MonitorSink>,
	enabled: bool,
}

impl Monitor {
	pub fn new(sink: Arc<dyn MonitorSink>, enabled: bool) -> Self {
		Self { sink, enabled }
	}

	pub async fn raise(&self, event: MonitorEvent) {
		if !self.enabled {
			trace!(kind = %event.kind, job_key = %event.job_key, "monitoring disabled, dropping event");
			return;
		}
		self.sink.raise(event).await;
	}
}

impl Default for Monitor {
	fn default() -> Self {
		Self::new(Arc::new(TracingMonitorSink), true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::RecordingMonitorSink;
	use std::time::Duration;

	#[test]
	fn test_render_fills_placeholders() {
		let event = MonitorEvent::new(
			MonitorEventKind::ExecutionFailed,
			JobKey::named("nightly"),
			"{job} failed: {error} {unknown}",
		)
		.with_param("error", "boom");
		assert_eq!(event.render(), "default.nightly failed: boom {unknown}");
	}

	#[test]
	fn test_tripped_event_names_thresholds() {
		let settings = CircuitBreakerSettings::new(3, 1, Duration::from_secs(300));
		let event = MonitorEvent::circuit_breaker_tripped(&JobKey::named("nightly"), &settings, Utc::now());
		assert_eq!(event.params["failure_threshold"], "3");
		assert_eq!(event.params["pause_span_secs"], "300");
		assert!(event.render().contains("default.nightly"));
	}

	#[tokio::test]
	async fn test_disabled_monitor_drops_events() {
		let sink = Arc::new(RecordingMonitorSink::new());
		let monitor = Monitor::new(sink.clone(), false);
		monitor
			.raise(MonitorEvent::execution_failed(&JobKey::named("j"), "f", "boom"))
			.await;
		assert!(sink.events().is_empty());

		let monitor = Monitor::new(sink.clone(), true);
		monitor
			.raise(MonitorEvent::execution_failed(&JobKey::named("j"), "f", "boom"))
			.await;
		assert_eq!(sink.count(MonitorEventKind::ExecutionFailed), 1);
	}
}
