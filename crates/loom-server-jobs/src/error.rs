// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use loom_jobs_core::{JobsCoreError, RunFailure};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
	#[error("Job not found: {0}")]
	NotFound(String),

	#[error("Job was cancelled")]
	Cancelled,

	#[error("Job is paused: {0}")]
	Paused(String),

	#[error("Job failed: {message}")]
	Failed { message: String, retryable: bool },

	#[error("{}", format_aggregate(.0))]
	Aggregate(Vec<RunFailure>),

	#[error("Trigger already exists: {0}")]
	TriggerExists(String),

	#[error(transparent)]
	Core(#[from] JobsCoreError),

	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Scheduler is shutting down")]
	Shutdown,

	#[error("Internal error: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, JobError>;

fn format_aggregate(failures: &[RunFailure]) -> String {
	let messages: Vec<String> = failures.iter().map(ToString::to_string).collect();
	format!("{} failures: {}", failures.len(), messages.join("; "))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_aggregate_lists_every_message() {
		let err = JobError::Aggregate(vec![
			RunFailure::check("disk", "disk almost full"),
			RunFailure::error("db", "connection reset"),
		]);
		assert_eq!(
			err.to_string(),
			"2 failures: [disk] disk almost full; [db] connection reset"
		);
	}

	#[test]
	fn test_core_error_is_transparent() {
		let err: JobError = JobsCoreError::Validation("bad policy".to_string()).into();
		assert!(err.to_string().contains("bad policy"));
	}
}
