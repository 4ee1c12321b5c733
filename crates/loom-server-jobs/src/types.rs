// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use loom_jobs_core::{CircuitBreakerSettings, DataMap, RETRY_TRIGGER_GROUP};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Group reserved for jobs and triggers owned by the scheduler itself.
pub const SYSTEM_GROUP: &str = "loom.system";
/// Group of the ad-hoc triggers created by manual firings.
pub const MANUAL_TRIGGER_GROUP: &str = "loom.manual";
pub const DEFAULT_GROUP: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
	pub group: String,
	pub name: String,
}

impl JobKey {
	pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			group: group.into(),
			name: name.into(),
		}
	}

	pub fn named(name: impl Into<String>) -> Self {
		Self::new(DEFAULT_GROUP, name)
	}

	pub fn system(name: impl Into<String>) -> Self {
		Self::new(SYSTEM_GROUP, name)
	}

	pub fn is_system(&self) -> bool {
		self.group == SYSTEM_GROUP
	}
}

impl fmt::Display for JobKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.group, self.name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerKey {
	pub group: String,
	pub name: String,
}

impl TriggerKey {
	pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			group: group.into(),
			name: name.into(),
		}
	}

	pub fn named(name: impl Into<String>) -> Self {
		Self::new(DEFAULT_GROUP, name)
	}

	pub fn system(name: impl Into<String>) -> Self {
		Self::new(SYSTEM_GROUP, name)
	}

	pub fn manual(name: impl Into<String>) -> Self {
		Self::new(MANUAL_TRIGGER_GROUP, name)
	}

	pub fn is_system(&self) -> bool {
		self.group == SYSTEM_GROUP
	}

	pub fn is_manual(&self) -> bool {
		self.group == MANUAL_TRIGGER_GROUP
	}

	pub fn is_retry(&self) -> bool {
		self.group == RETRY_TRIGGER_GROUP
	}
}

impl fmt::Display for TriggerKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.group, self.name)
	}
}

/// Registration record of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetails {
	pub key: JobKey,
	pub description: String,
	/// `None` disables circuit breaking for the job.
	#[serde(default)]
	pub circuit_breaker: Option<CircuitBreakerSettings>,
}

impl JobDetails {
	pub fn new(key: JobKey, description: impl Into<String>) -> Self {
		Self {
			key,
			description: description.into(),
			circuit_breaker: None,
		}
	}

	pub fn with_circuit_breaker(mut self, settings: CircuitBreakerSettings) -> Self {
		self.circuit_breaker = Some(settings);
		self
	}
}

/// Recurring trigger firing a job at a fixed interval.
#[derive(Debug, Clone)]
pub struct PeriodicTrigger {
	pub key: TriggerKey,
	pub job_key: JobKey,
	pub interval: Duration,
	pub data: DataMap,
}

impl PeriodicTrigger {
	pub fn new(key: TriggerKey, job_key: JobKey, interval: Duration) -> Self {
		Self {
			key,
			job_key,
			interval,
			data: DataMap::new(),
		}
	}

	pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.data.insert(key.into(), value.into());
		self
	}
}

/// Trigger firing a job once at `fire_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotTrigger {
	pub key: TriggerKey,
	pub job_key: JobKey,
	pub fire_at: DateTime<Utc>,
	pub data: DataMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutput {
	pub message: String,
	pub metadata: Option<serde_json::Value>,
}

/// How a firing ended, as seen by listeners.
#[derive(Debug, Clone)]
pub enum RunOutcome {
	Succeeded(JobOutput),
	Failed { error: String },
	Cancelled,
}

impl RunOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Succeeded(_))
	}

	pub fn is_failure(&self) -> bool {
		matches!(self, Self::Failed { .. })
	}

	pub fn error(&self) -> Option<&str> {
		match self {
			Self::Failed { error } => Some(error),
			_ => None,
		}
	}
}
