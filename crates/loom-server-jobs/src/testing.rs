// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Recording doubles for the scheduler runtime, sinks and element work.

use async_trait::async_trait;
use loom_jobs_core::{ElementFailure, ElementSettings};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audit::{JobAuditRecord, JobAuditSink};
use crate::context::JobContext;
use crate::error::{JobError, Result};
use crate::invocation::ElementWork;
use crate::job::Job;
use crate::monitor::{MonitorEvent, MonitorEventKind, MonitorSink};
use crate::runtime::SchedulerRuntime;
use crate::types::{JobKey, JobOutput, OneShotTrigger, TriggerKey};

#[derive(Default)]
pub struct RecordingMonitorSink {
	events: Mutex<Vec<MonitorEvent>>,
}

impl RecordingMonitorSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<MonitorEvent> {
		self.events.lock().clone()
	}

	pub fn count(&self, kind: MonitorEventKind) -> usize {
		self.events
			.lock()
			.iter()
			.filter(|event| event.kind == kind)
			.count()
	}
}

#[async_trait]
impl MonitorSink for RecordingMonitorSink {
	fn name(&self) -> &str {
		"recording"
	}

	async fn raise(&self, event: MonitorEvent) {
		self.events.lock().push(event);
	}
}

#[derive(Default)]
pub struct RecordingAuditSink {
	records: Mutex<Vec<JobAuditRecord>>,
}

impl RecordingAuditSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn records(&self) -> Vec<JobAuditRecord> {
		self.records.lock().clone()
	}
}

#[async_trait]
impl JobAuditSink for RecordingAuditSink {
	fn name(&self) -> &str {
		"recording"
	}

	async fn publish(&self, record: &JobAuditRecord) -> Result<()> {
		self.records.lock().push(record.clone());
		Ok(())
	}
}

/// Records runtime calls without firing anything. Scheduled triggers stay
/// pending forever, so a second trigger with the same key is rejected.
#[derive(Default)]
pub struct RecordingRuntime {
	scheduled: Mutex<Vec<OneShotTrigger>>,
	paused: Mutex<Vec<JobKey>>,
	resumed: Mutex<Vec<JobKey>>,
}

impl RecordingRuntime {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn scheduled(&self) -> Vec<OneShotTrigger> {
		self.scheduled.lock().clone()
	}

	pub fn paused(&self) -> Vec<JobKey> {
		self.paused.lock().clone()
	}

	pub fn resumed(&self) -> Vec<JobKey> {
		self.resumed.lock().clone()
	}
}

#[async_trait]
impl SchedulerRuntime for RecordingRuntime {
	async fn schedule_one_shot(&self, trigger: OneShotTrigger) -> Result<()> {
		let mut scheduled = self.scheduled.lock();
		if scheduled.iter().any(|existing| existing.key == trigger.key) {
			return Err(JobError::TriggerExists(trigger.key.to_string()));
		}
		scheduled.push(trigger);
		Ok(())
	}

	async fn pause_job(&self, job_key: &JobKey) -> Result<()> {
		self.paused.lock().push(job_key.clone());
		Ok(())
	}

	async fn resume_job(&self, job_key: &JobKey) -> Result<()> {
		self.resumed.lock().push(job_key.clone());
		Ok(())
	}

	async fn trigger_exists(&self, trigger_key: &TriggerKey) -> Result<bool> {
		Ok(self
			.scheduled
			.lock()
			.iter()
			.any(|trigger| &trigger.key == trigger_key))
	}
}

enum Script {
	Succeed,
	Declared(String),
	Defect(String),
	Panic(String),
	FailTimes { times: usize, message: String },
}

/// Element work that follows a fixed script and counts its calls.
pub struct ScriptedWork {
	script: Script,
	calls: Arc<AtomicUsize>,
}

impl ScriptedWork {
	fn with_script(script: Script) -> Self {
		Self {
			script,
			calls: Arc::new(AtomicUsize::new(0)),
		}
	}

	pub fn succeed() -> Self {
		Self::with_script(Script::Succeed)
	}

	pub fn always_declared(message: impl Into<String>) -> Self {
		Self::with_script(Script::Declared(message.into()))
	}

	pub fn always_defect(message: impl Into<String>) -> Self {
		Self::with_script(Script::Defect(message.into()))
	}

	pub fn panics(message: impl Into<String>) -> Self {
		Self::with_script(Script::Panic(message.into()))
	}

	/// Declared failure for the first `times` calls, then success.
	pub fn fail_times(times: usize, message: impl Into<String>) -> Self {
		Self::with_script(Script::FailTimes {
			times,
			message: message.into(),
		})
	}

	pub fn calls(&self) -> Arc<AtomicUsize> {
		Arc::clone(&self.calls)
	}
}

#[async_trait]
impl ElementWork for ScriptedWork {
	async fn run(
		&self,
		_element: &ElementSettings,
		_ctx: &JobContext,
	) -> std::result::Result<(), ElementFailure> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
		match &self.script {
			Script::Succeed => Ok(()),
			Script::Declared(message) => Err(ElementFailure::declared(message.clone())),
			Script::Defect(message) => Err(ElementFailure::defect(message.clone())),
			Script::Panic(message) => panic!("{message}"),
			Script::FailTimes { times, message } => {
				if call <= *times {
					Err(ElementFailure::declared(message.clone()))
				} else {
					Ok(())
				}
			}
		}
	}
}

#[derive(Default)]
pub struct SucceedingJob {
	runs: AtomicUsize,
}

impl SucceedingJob {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn runs(&self) -> usize {
		self.runs.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Job for SucceedingJob {
	async fn run(&self, _ctx: &JobContext) -> std::result::Result<JobOutput, JobError> {
		self.runs.fetch_add(1, Ordering::SeqCst);
		Ok(JobOutput {
			message: "done".to_string(),
			metadata: None,
		})
	}
}

pub struct FailingJob {
	message: String,
	runs: AtomicUsize,
}

impl FailingJob {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			runs: AtomicUsize::new(0),
		}
	}

	pub fn runs(&self) -> usize {
		self.runs.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Job for FailingJob {
	async fn run(&self, _ctx: &JobContext) -> std::result::Result<JobOutput, JobError> {
		self.runs.fetch_add(1, Ordering::SeqCst);
		Err(JobError::Failed {
			message: self.message.clone(),
			retryable: false,
		})
	}
}
