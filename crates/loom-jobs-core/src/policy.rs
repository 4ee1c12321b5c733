// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::error::{JobsCoreError, Result};

pub const MIN_DEGREE_OF_PARALLELISM: usize = 2;
pub const MAX_DEGREE_OF_PARALLELISM: usize = 100;
pub const DEFAULT_MAX_DEGREE_OF_PARALLELISM: usize = 10;

/// Per-job execution settings, loaded once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPolicy {
	#[serde(default = "default_max_degree_of_parallelism")]
	pub max_degree_of_parallelism: usize,
	#[serde(default)]
	pub sequential_processing: bool,
	#[serde(default)]
	pub stop_running_on_fail: bool,
}

impl ExecutionPolicy {
	pub fn sequential(stop_running_on_fail: bool) -> Self {
		Self {
			sequential_processing: true,
			stop_running_on_fail,
			..Default::default()
		}
	}

	pub fn parallel(max_degree_of_parallelism: usize) -> Self {
		Self {
			max_degree_of_parallelism,
			..Default::default()
		}
	}

	pub fn validate(&self) -> Result<()> {
		if !(MIN_DEGREE_OF_PARALLELISM..=MAX_DEGREE_OF_PARALLELISM)
			.contains(&self.max_degree_of_parallelism)
		{
			return Err(JobsCoreError::Validation(format!(
				"max_degree_of_parallelism must be between {} and {}, got {}",
				MIN_DEGREE_OF_PARALLELISM, MAX_DEGREE_OF_PARALLELISM, self.max_degree_of_parallelism
			)));
		}
		Ok(())
	}
}

impl Default for ExecutionPolicy {
	fn default() -> Self {
		Self {
			max_degree_of_parallelism: DEFAULT_MAX_DEGREE_OF_PARALLELISM,
			sequential_processing: false,
			stop_running_on_fail: false,
		}
	}
}

fn default_max_degree_of_parallelism() -> usize {
	DEFAULT_MAX_DEGREE_OF_PARALLELISM
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_is_valid() {
		let policy = ExecutionPolicy::default();
		assert!(policy.validate().is_ok());
		assert!(!policy.sequential_processing);
	}

	#[test]
	fn test_parallelism_bounds() {
		assert!(ExecutionPolicy::parallel(1).validate().is_err());
		assert!(ExecutionPolicy::parallel(2).validate().is_ok());
		assert!(ExecutionPolicy::parallel(100).validate().is_ok());
		assert!(ExecutionPolicy::parallel(101).validate().is_err());
	}

	#[test]
	fn test_deserialize_defaults() {
		let policy: ExecutionPolicy = serde_json::from_str("{}").unwrap();
		assert_eq!(policy, ExecutionPolicy::default());
	}
}
