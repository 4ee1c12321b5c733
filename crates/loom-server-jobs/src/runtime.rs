// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{JobKey, OneShotTrigger, TriggerKey};

/// The parts of the scheduler the resilience listeners drive.
#[async_trait]
pub trait SchedulerRuntime: Send + Sync {
	/// Schedule a one-shot trigger.
	///
	/// Fails with [`JobError::TriggerExists`](crate::JobError::TriggerExists)
	/// when a pending trigger already has the same key.
	async fn schedule_one_shot(&self, trigger: OneShotTrigger) -> Result<()>;

	async fn pause_job(&self, job_key: &JobKey) -> Result<()>;

	async fn resume_job(&self, job_key: &JobKey) -> Result<()>;

	async fn trigger_exists(&self, trigger_key: &TriggerKey) -> Result<bool>;
}
