// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Failure classification for element invocations.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Outcome of a failed element invocation.
///
/// Declared failures are expected domain behaviour and carry a user-facing
/// message. Defects are anything else and are never suppressed.
#[derive(Debug, Error)]
pub enum ElementFailure {
	#[error("{0}")]
	Declared(String),

	#[error("unexpected defect: {0}")]
	Defect(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ElementFailure {
	pub fn declared(message: impl Into<String>) -> Self {
		Self::Declared(message.into())
	}

	pub fn defect(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
		Self::Defect(error.into())
	}

	pub fn is_declared(&self) -> bool {
		matches!(self, Self::Declared(_))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunFailureKind {
	/// An escalated declared failure.
	CheckException,
	/// An unexpected defect.
	Error,
	/// A sequential batch stopped early.
	StopRunning,
}

impl fmt::Display for RunFailureKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::CheckException => write!(f, "check_exception"),
			Self::Error => write!(f, "error"),
			Self::StopRunning => write!(f, "stop_running"),
		}
	}
}

/// A failure queued during one run and reported at finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
	pub kind: RunFailureKind,
	pub element_key: Option<String>,
	pub message: String,
}

impl RunFailure {
	pub fn check(element_key: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			kind: RunFailureKind::CheckException,
			element_key: Some(element_key.into()),
			message: message.into(),
		}
	}

	pub fn error(element_key: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			kind: RunFailureKind::Error,
			element_key: Some(element_key.into()),
			message: message.into(),
		}
	}

	pub fn stop_running(element_key: impl Into<String>, status: impl fmt::Display) -> Self {
		let element_key = element_key.into();
		Self {
			kind: RunFailureKind::StopRunning,
			message: format!(
				"stop running on fail: element '{}' ended with status {}",
				element_key, status
			),
			element_key: Some(element_key),
		}
	}
}

impl fmt::Display for RunFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.element_key {
			Some(key) if self.kind != RunFailureKind::StopRunning => {
				write!(f, "[{}] {}", key, self.message)
			}
			_ => write!(f, "{}", self.message),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_classification() {
		assert!(ElementFailure::declared("disk almost full").is_declared());
		let defect = ElementFailure::defect(std::io::Error::other("connection reset"));
		assert!(!defect.is_declared());
		assert!(defect.to_string().contains("connection reset"));
	}

	#[test]
	fn test_run_failure_display() {
		let failure = RunFailure::check("disk", "disk almost full");
		assert_eq!(failure.to_string(), "[disk] disk almost full");

		let stop = RunFailure::stop_running("disk", "check_error");
		assert_eq!(
			stop.to_string(),
			"stop running on fail: element 'disk' ended with status check_error"
		);
	}
}
