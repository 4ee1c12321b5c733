// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resilient job execution for Loom server.
//!
//! Jobs made of check or operation elements run through an invocation
//! engine that retries, isolates and classifies every element failure.
//! Two listeners sit behind the scheduler: a per-job circuit breaker that
//! pauses a job after repeated failed firings, and a retry rescheduler that
//! re-fires failed triggers carrying retry settings. Durable state lives in
//! a [`JobDataStore`], backed by SQLite in production.

pub mod audit;
pub mod breaker;
pub mod concurrency;
pub mod context;
pub mod element_job;
pub mod error;
pub mod fail_span;
pub mod health;
pub mod invocation;
pub mod job;
pub mod listener;
pub mod monitor;
pub mod rescheduler;
pub mod retry;
pub mod runtime;
pub mod scheduler;
pub mod sqlite;
pub mod store;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use audit::{JobAuditRecord, JobAuditSink, TracingAuditSink};
pub use breaker::{JobCircuitBreaker, ResumeJob};
pub use concurrency::run_bounded;
pub use context::{CancellationToken, JobContext, RunProgress};
pub use element_job::{CheckJob, ElementJob, OperationJob};
pub use error::{JobError, Result};
pub use fail_span::FailSpanTracker;
pub use health::{HealthState, JobHealthStatus, JobsHealthStatus, LastRunInfo};
pub use invocation::{
	work_fn, Element, ElementResult, ElementWork, FailureQueue, InvocationEngine, InvocationReport,
};
pub use job::Job;
pub use listener::{CompletedFiring, JobListener};
pub use monitor::{Monitor, MonitorEvent, MonitorEventKind, MonitorSink, TracingMonitorSink};
pub use rescheduler::RetryTriggerRescheduler;
pub use retry::{execute_with_retry, RetryError, RetryPolicy};
pub use runtime::SchedulerRuntime;
pub use scheduler::{JobScheduler, SchedulerHandle};
pub use sqlite::SqliteJobDataStore;
pub use store::{DataScope, InMemoryJobDataStore, JobDataStore};
pub use telemetry::init_tracing;
pub use types::{
	JobDetails, JobKey, JobOutput, OneShotTrigger, PeriodicTrigger, RunOutcome, TriggerKey,
};
