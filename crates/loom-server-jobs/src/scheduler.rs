// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use loom_jobs_core::{CircuitBreakerSettings, DataMap, ExecutionPolicy};
use loom_server_config::JobsConfig;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::audit::JobAuditSink;
use crate::breaker::{read_breaker_state, resume_job_key, JobCircuitBreaker, ResumeJob};
use crate::context::{CancellationToken, JobContext};
use crate::error::{JobError, Result};
use crate::health::{determine_health_state, JobHealthStatus, JobsHealthStatus, LastRunInfo};
use crate::job::Job;
use crate::listener::{notify_listeners, CompletedFiring, JobListener};
use crate::monitor::{Monitor, MonitorEvent, MonitorSink};
use crate::rescheduler::RetryTriggerRescheduler;
use crate::runtime::SchedulerRuntime;
use crate::store::JobDataStore;
use crate::types::{JobDetails, JobKey, OneShotTrigger, PeriodicTrigger, RunOutcome, TriggerKey};

struct RegisteredJob {
	details: JobDetails,
	job: Arc<dyn Job>,
	/// Tokens of the firings in flight, keyed by fire instance id.
	active_runs: Mutex<HashMap<String, CancellationToken>>,
}

impl RegisteredJob {
	fn cancel_active_runs(&self) -> usize {
		let runs = self.active_runs.lock();
		for token in runs.values() {
			token.cancel();
		}
		runs.len()
	}
}

#[derive(Default)]
struct JobState {
	paused: bool,
	last_run: Option<LastRunInfo>,
	failure_streak: u32,
}

struct SchedulerInner {
	store: Arc<dyn JobDataStore>,
	monitor: Monitor,
	config: JobsConfig,
	jobs: RwLock<HashMap<JobKey, Arc<RegisteredJob>>>,
	states: Mutex<HashMap<JobKey, JobState>>,
	periodic: Mutex<Vec<PeriodicTrigger>>,
	one_shots: Mutex<HashMap<TriggerKey, OneShotTrigger>>,
	listeners: RwLock<Vec<Arc<dyn JobListener>>>,
	shutdown_tx: broadcast::Sender<()>,
	shutdown_token: CancellationToken,
	handles: AsyncMutex<Vec<JoinHandle<()>>>,
	started: AtomicBool,
	shutting_down: AtomicBool,
}

/// In-process scheduler: fires jobs from periodic, manual and one-shot
/// triggers and hands every completed firing to the registered listeners.
#[derive(Clone)]
pub struct JobScheduler {
	inner: Arc<SchedulerInner>,
}

/// Non-owning [`SchedulerRuntime`] handed to listeners and system jobs.
#[derive(Clone)]
pub struct SchedulerHandle {
	inner: Weak<SchedulerInner>,
}

impl SchedulerHandle {
	fn upgrade(&self) -> Result<Arc<SchedulerInner>> {
		self.inner.upgrade().ok_or(JobError::Shutdown)
	}
}

impl JobScheduler {
	/// Scheduler with no listeners. The system resume job is registered.
	pub fn new(store: Arc<dyn JobDataStore>, monitor_sink: Arc<dyn MonitorSink>, config: &JobsConfig) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		let inner = Arc::new(SchedulerInner {
			store,
			monitor: Monitor::new(monitor_sink, config.monitoring_enabled),
			config: config.clone(),
			jobs: RwLock::new(HashMap::new()),
			states: Mutex::new(HashMap::new()),
			periodic: Mutex::new(Vec::new()),
			one_shots: Mutex::new(HashMap::new()),
			listeners: RwLock::new(Vec::new()),
			shutdown_tx,
			shutdown_token: CancellationToken::new(),
			handles: AsyncMutex::new(Vec::new()),
			started: AtomicBool::new(false),
			shutting_down: AtomicBool::new(false),
		});

		let scheduler = Self { inner };
		let resume = ResumeJob::new(Arc::new(scheduler.handle()));
		scheduler.insert_job(
			JobDetails::new(resume_job_key(), "Resumes jobs paused by their circuit breaker"),
			Arc::new(resume),
		);
		scheduler
	}

	/// Scheduler with the circuit breaker and retry rescheduler listening.
	pub fn with_default_listeners(
		store: Arc<dyn JobDataStore>,
		monitor_sink: Arc<dyn MonitorSink>,
		audit: Arc<dyn JobAuditSink>,
		config: &JobsConfig,
	) -> Self {
		let scheduler = Self::new(Arc::clone(&store), monitor_sink, config);
		let runtime: Arc<dyn SchedulerRuntime> = Arc::new(scheduler.handle());
		let monitor = scheduler.inner.monitor.clone();

		scheduler.add_listener(Arc::new(JobCircuitBreaker::new(
			store,
			Arc::clone(&runtime),
			audit,
			monitor.clone(),
		)));
		scheduler.add_listener(Arc::new(RetryTriggerRescheduler::new(
			runtime,
			monitor,
			config.default_max_retries,
		)));
		scheduler
	}

	pub fn handle(&self) -> SchedulerHandle {
		SchedulerHandle {
			inner: Arc::downgrade(&self.inner),
		}
	}

	pub fn add_listener(&self, listener: Arc<dyn JobListener>) {
		debug!(listener = listener.name(), "job listener added");
		self.inner.listeners.write().push(listener);
	}

	/// Breaker settings built from the configured defaults.
	pub fn default_breaker_settings(&self) -> CircuitBreakerSettings {
		CircuitBreakerSettings::new(
			self.inner.config.breaker_failure_threshold,
			self.inner.config.breaker_success_threshold,
			Duration::from_secs(self.inner.config.breaker_pause_span_secs),
		)
	}

	/// Parallel execution policy with the configured degree of parallelism.
	pub fn default_execution_policy(&self) -> ExecutionPolicy {
		ExecutionPolicy::parallel(self.inner.config.default_max_degree_of_parallelism)
	}

	/// Register or replace a job.
	pub fn register_job(&self, details: JobDetails, job: Arc<dyn Job>) -> Result<()> {
		if let Some(settings) = &details.circuit_breaker {
			settings.validate()?;
		}
		self.insert_job(details, job);
		Ok(())
	}

	fn insert_job(&self, details: JobDetails, job: Arc<dyn Job>) {
		let key = details.key.clone();
		let registered = Arc::new(RegisteredJob {
			details,
			job,
			active_runs: Mutex::new(HashMap::new()),
		});
		if self.inner.jobs.write().insert(key.clone(), registered).is_some() {
			warn!(job_key = %key, "job re-registered, replacing previous registration");
		}
		self.inner.states.lock().entry(key).or_default();
	}

	/// Add a periodic trigger. Starts it right away when the scheduler is running.
	pub async fn register_periodic(&self, trigger: PeriodicTrigger) -> Result<()> {
		self.inner.job(&trigger.job_key)?;
		if self.inner.started.load(Ordering::SeqCst) {
			let handle = self.inner.spawn_periodic(trigger.clone());
			self.inner.handles.lock().await.push(handle);
		}
		self.inner.periodic.lock().push(trigger);
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<()> {
		if self.inner.started.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		let triggers = self.inner.periodic.lock().clone();
		let mut handles = self.inner.handles.lock().await;
		for trigger in triggers {
			handles.push(self.inner.spawn_periodic(trigger));
		}

		info!(
			job_count = self.inner.jobs.read().len(),
			trigger_count = handles.len(),
			"Job scheduler started"
		);
		Ok(())
	}

	/// Fire `job_key` now from a manual trigger.
	#[instrument(skip(self, data))]
	pub async fn trigger_job(&self, job_key: &JobKey, data: DataMap) -> Result<CompletedFiring> {
		self.inner
			.fire(job_key, TriggerKey::manual(job_key.name.clone()), data)
			.await
	}

	/// Cancel the firings of `job_key` that are running now. Later firings
	/// start with a fresh token.
	#[instrument(skip(self))]
	pub async fn cancel_job(&self, job_key: &JobKey) -> Result<()> {
		let registered = self.inner.job(job_key)?;
		let cancelled = registered.cancel_active_runs();
		info!(cancelled, "cancelled running firings");
		Ok(())
	}

	pub fn is_paused(&self, job_key: &JobKey) -> bool {
		self.inner.is_paused(job_key)
	}

	pub fn job_keys(&self) -> Vec<JobKey> {
		let mut keys: Vec<JobKey> = self.inner.jobs.read().keys().cloned().collect();
		keys.sort();
		keys
	}

	/// Keys of the one-shot triggers that have not fired yet.
	pub fn pending_triggers(&self) -> Vec<TriggerKey> {
		let mut keys: Vec<TriggerKey> = self.inner.one_shots.lock().keys().cloned().collect();
		keys.sort();
		keys
	}

	#[instrument(skip(self))]
	pub async fn job_status(&self, job_key: &JobKey) -> Option<JobHealthStatus> {
		let registered = self.inner.jobs.read().get(job_key).cloned()?;
		let (paused, last_run, streak) = {
			let states = self.inner.states.lock();
			let state = states.get(job_key);
			(
				state.map(|s| s.paused).unwrap_or(false),
				state.and_then(|s| s.last_run.clone()),
				state.map(|s| s.failure_streak).unwrap_or(0),
			)
		};

		let consecutive_failures = if registered.details.circuit_breaker.is_some() {
			match read_breaker_state(self.inner.store.as_ref(), job_key).await {
				Ok(Some(metadata)) => metadata.fail_counter,
				Ok(None) => 0,
				Err(e) => {
					warn!(job_key = %job_key, error = %e, "failed to read circuit breaker state");
					streak
				}
			}
		} else {
			streak
		};

		let status = determine_health_state(paused, last_run.as_ref(), consecutive_failures);

		Some(JobHealthStatus {
			job_key: job_key.clone(),
			description: registered.details.description.clone(),
			status,
			paused,
			last_run,
			consecutive_failures,
		})
	}

	/// Health of every non-system job, with the worst state on top.
	#[instrument(skip(self))]
	pub async fn health_status(&self) -> JobsHealthStatus {
		let mut jobs = Vec::new();
		for job_key in self.job_keys() {
			if job_key.is_system() {
				continue;
			}
			if let Some(status) = self.job_status(&job_key).await {
				jobs.push(status);
			}
		}
		JobsHealthStatus::from_jobs(jobs)
	}

	/// Stop triggers, cancel running jobs and wait for tasks to finish, up to
	/// the configured shutdown timeout.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		self.inner.shutting_down.store(true, Ordering::SeqCst);
		let _ = self.inner.shutdown_tx.send(());
		self.inner.shutdown_token.cancel();

		let handles: Vec<JoinHandle<()>> = self.inner.handles.lock().await.drain(..).collect();
		let aborts: Vec<_> = handles.iter().map(|handle| handle.abort_handle()).collect();
		let timeout = Duration::from_secs(self.inner.config.shutdown_timeout_secs);

		if tokio::time::timeout(timeout, futures::future::join_all(handles))
			.await
			.is_err()
		{
			warn!(
				timeout_secs = timeout.as_secs(),
				"timed out waiting for job tasks, aborting"
			);
			for abort in aborts {
				abort.abort();
			}
		}

		self.inner.one_shots.lock().clear();
		info!("Job scheduler shut down");
	}
}

impl SchedulerInner {
	fn job(&self, job_key: &JobKey) -> Result<Arc<RegisteredJob>> {
		self.jobs
			.read()
			.get(job_key)
			.cloned()
			.ok_or_else(|| JobError::NotFound(job_key.to_string()))
	}

	fn is_paused(&self, job_key: &JobKey) -> bool {
		self.states
			.lock()
			.get(job_key)
			.map(|state| state.paused)
			.unwrap_or(false)
	}

	fn set_paused(&self, job_key: &JobKey, paused: bool) -> Result<()> {
		self.job(job_key)?;
		self.states.lock().entry(job_key.clone()).or_default().paused = paused;
		Ok(())
	}

	fn spawn_periodic(self: &Arc<Self>, trigger: PeriodicTrigger) -> JoinHandle<()> {
		let inner = Arc::clone(self);
		let mut shutdown_rx = self.shutdown_tx.subscribe();

		tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = tokio::time::sleep(trigger.interval) => {
						match inner.fire(&trigger.job_key, trigger.key.clone(), trigger.data.clone()).await {
							Ok(_) => {}
							Err(JobError::Paused(_)) => {
								debug!(trigger_key = %trigger.key, "job paused, periodic firing skipped");
							}
							Err(e) => {
								warn!(trigger_key = %trigger.key, error = %e, "periodic firing skipped");
							}
						}
					}
					_ = shutdown_rx.recv() => {
						info!(trigger_key = %trigger.key, "Shutting down periodic trigger");
						break;
					}
				}
			}
		})
	}

	async fn schedule_one_shot(self: &Arc<Self>, trigger: OneShotTrigger) -> Result<()> {
		if self.shutting_down.load(Ordering::SeqCst) {
			return Err(JobError::Shutdown);
		}
		self.job(&trigger.job_key)?;

		{
			let mut pending = self.one_shots.lock();
			if pending.contains_key(&trigger.key) {
				return Err(JobError::TriggerExists(trigger.key.to_string()));
			}
			pending.insert(trigger.key.clone(), trigger.clone());
		}

		let delay = (trigger.fire_at - Utc::now())
			.to_std()
			.unwrap_or(Duration::ZERO);
		debug!(
			trigger_key = %trigger.key,
			job_key = %trigger.job_key,
			delay_ms = delay.as_millis() as u64,
			"one-shot trigger scheduled"
		);

		let inner = Arc::clone(self);
		let mut shutdown_rx = self.shutdown_tx.subscribe();
		let handle = tokio::spawn(async move {
			tokio::select! {
				_ = tokio::time::sleep(delay) => {
					inner.one_shots.lock().remove(&trigger.key);
					if let Err(e) = inner.fire(&trigger.job_key, trigger.key.clone(), trigger.data.clone()).await {
						warn!(trigger_key = %trigger.key, error = %e, "one-shot firing skipped");
					}
				}
				_ = shutdown_rx.recv() => {
					debug!(trigger_key = %trigger.key, "one-shot trigger dropped at shutdown");
				}
			}
		});

		let mut handles = self.handles.lock().await;
		handles.retain(|handle| !handle.is_finished());
		handles.push(handle);
		Ok(())
	}

	#[instrument(skip_all, fields(job_key = %job_key, trigger_key = %trigger_key))]
	async fn fire(
		&self,
		job_key: &JobKey,
		trigger_key: TriggerKey,
		data: DataMap,
	) -> Result<CompletedFiring> {
		if self.shutting_down.load(Ordering::SeqCst) {
			return Err(JobError::Shutdown);
		}
		let registered = self.job(job_key)?;
		if self.is_paused(job_key) {
			info!("job paused, firing skipped");
			return Err(JobError::Paused(job_key.to_string()));
		}

		let ctx = JobContext::new(job_key.clone(), trigger_key)
			.with_trigger_data(data)
			.with_cancellation_token(self.shutdown_token.child_token());
		registered
			.active_runs
			.lock()
			.insert(ctx.fire_instance_id.clone(), ctx.cancellation_token.clone());

		self.monitor
			.raise(MonitorEvent::execution_started(
				job_key,
				&ctx.trigger_key,
				&ctx.fire_instance_id,
			))
			.await;

		let started = tokio::time::Instant::now();
		let result = AssertUnwindSafe(registered.job.run(&ctx)).catch_unwind().await;
		let duration_ms = started.elapsed().as_millis() as i64;
		registered.active_runs.lock().remove(&ctx.fire_instance_id);

		let outcome = match result {
			Ok(Ok(output)) => {
				info!(fire_instance_id = %ctx.fire_instance_id, duration_ms, "Job completed successfully");
				self.monitor
					.raise(MonitorEvent::execution_succeeded(
						job_key,
						&ctx.fire_instance_id,
						&output.message,
					))
					.await;
				RunOutcome::Succeeded(output)
			}
			Ok(Err(JobError::Cancelled)) => {
				info!(fire_instance_id = %ctx.fire_instance_id, "Job cancelled");
				RunOutcome::Cancelled
			}
			Ok(Err(e)) => {
				let message = e.to_string();
				warn!(fire_instance_id = %ctx.fire_instance_id, error = %message, "Job failed");
				self.monitor
					.raise(MonitorEvent::execution_failed(
						job_key,
						&ctx.fire_instance_id,
						&message,
					))
					.await;
				RunOutcome::Failed { error: message }
			}
			Err(_) => {
				let message = "job panicked".to_string();
				error!(fire_instance_id = %ctx.fire_instance_id, "Job panicked");
				self.monitor
					.raise(MonitorEvent::execution_failed(
						job_key,
						&ctx.fire_instance_id,
						&message,
					))
					.await;
				RunOutcome::Failed { error: message }
			}
		};

		self.record_run(job_key, &ctx, &outcome, duration_ms);

		let firing = CompletedFiring {
			job: registered.details.clone(),
			trigger_key: ctx.trigger_key,
			trigger_data: ctx.trigger_data,
			fire_instance_id: ctx.fire_instance_id,
			fire_time: ctx.fire_time,
			outcome,
		};

		let listeners = self.listeners.read().clone();
		notify_listeners(&listeners, &firing).await;
		Ok(firing)
	}

	fn record_run(&self, job_key: &JobKey, ctx: &JobContext, outcome: &RunOutcome, duration_ms: i64) {
		if matches!(outcome, RunOutcome::Cancelled) {
			return;
		}
		let mut states = self.states.lock();
		let state = states.entry(job_key.clone()).or_default();
		if outcome.is_success() {
			state.failure_streak = 0;
		} else {
			state.failure_streak = state.failure_streak.saturating_add(1);
		}
		state.last_run = Some(LastRunInfo {
			fire_instance_id: ctx.fire_instance_id.clone(),
			succeeded: outcome.is_success(),
			fired_at: ctx.fire_time,
			duration_ms,
			error: outcome.error().map(str::to_string),
		});
	}

	fn trigger_exists(&self, trigger_key: &TriggerKey) -> bool {
		self.one_shots.lock().contains_key(trigger_key)
			|| self
				.periodic
				.lock()
				.iter()
				.any(|trigger| &trigger.key == trigger_key)
	}
}

#[async_trait]
impl SchedulerRuntime for SchedulerHandle {
	async fn schedule_one_shot(&self, trigger: OneShotTrigger) -> Result<()> {
		self.upgrade()?.schedule_one_shot(trigger).await
	}

	async fn pause_job(&self, job_key: &JobKey) -> Result<()> {
		self.upgrade()?.set_paused(job_key, true)
	}

	async fn resume_job(&self, job_key: &JobKey) -> Result<()> {
		self.upgrade()?.set_paused(job_key, false)
	}

	async fn trigger_exists(&self, trigger_key: &TriggerKey) -> Result<bool> {
		Ok(self.upgrade()?.trigger_exists(trigger_key))
	}
}

#[async_trait]
impl SchedulerRuntime for JobScheduler {
	async fn schedule_one_shot(&self, trigger: OneShotTrigger) -> Result<()> {
		self.inner.schedule_one_shot(trigger).await
	}

	#[instrument(skip(self))]
	async fn pause_job(&self, job_key: &JobKey) -> Result<()> {
		self.inner.set_paused(job_key, true)?;
		info!("job paused");
		Ok(())
	}

	#[instrument(skip(self))]
	async fn resume_job(&self, job_key: &JobKey) -> Result<()> {
		self.inner.set_paused(job_key, false)?;
		info!("job resumed");
		Ok(())
	}

	async fn trigger_exists(&self, trigger_key: &TriggerKey) -> Result<bool> {
		Ok(self.inner.trigger_exists(trigger_key))
	}
}
