// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::JobKey;

#[derive(Debug, Clone, Serialize)]
pub struct JobHealthStatus {
	pub job_key: JobKey,
	pub description: String,
	pub status: HealthState,
	pub paused: bool,
	pub last_run: Option<LastRunInfo>,
	pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRunInfo {
	pub fire_instance_id: String,
	pub succeeded: bool,
	pub fired_at: DateTime<Utc>,
	pub duration_ms: i64,
	pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	Healthy,
	Degraded,
	Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobsHealthStatus {
	pub status: HealthState,
	pub jobs: Vec<JobHealthStatus>,
}

impl JobsHealthStatus {
	/// Worst state across `jobs`. No jobs is healthy.
	pub fn from_jobs(jobs: Vec<JobHealthStatus>) -> Self {
		let mut worst_state = HealthState::Healthy;
		for job in &jobs {
			if job.status == HealthState::Unhealthy {
				worst_state = HealthState::Unhealthy;
			} else if job.status == HealthState::Degraded && worst_state != HealthState::Unhealthy {
				worst_state = HealthState::Degraded;
			}
		}
		Self {
			status: worst_state,
			jobs,
		}
	}
}

/// A paused job is unhealthy. Otherwise the last run and the failure streak decide.
pub fn determine_health_state(
	paused: bool,
	last_run: Option<&LastRunInfo>,
	consecutive_failures: u32,
) -> HealthState {
	if paused {
		return HealthState::Unhealthy;
	}
	match last_run {
		None => HealthState::Healthy,
		Some(run) if run.succeeded => HealthState::Healthy,
		Some(_) => {
			if consecutive_failures >= 3 {
				HealthState::Unhealthy
			} else if consecutive_failures >= 1 {
				HealthState::Degraded
			} else {
				HealthState::Healthy
			}
		}
	}
}
