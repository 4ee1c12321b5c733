// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persisted per-job circuit breaker state.
//!
//! The breaker is evaluated after every firing of a job. Counters live in the
//! job's durable data map as a single JSON blob under
//! [`CIRCUIT_BREAKER_DATA_KEY`], so they survive restarts and are shared by
//! every process that fires the job.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{JobsCoreError, Result};

/// Job data map key holding the serialized [`CircuitBreakerMetadata`].
pub const CIRCUIT_BREAKER_DATA_KEY: &str = "circuit.breaker";

/// Breaker configuration attached to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
	pub failure_threshold: u32,
	pub success_threshold: u32,
	#[serde(with = "crate::duration_secs")]
	pub pause_span: Duration,
}

impl CircuitBreakerSettings {
	pub fn new(failure_threshold: u32, success_threshold: u32, pause_span: Duration) -> Self {
		Self {
			failure_threshold,
			success_threshold,
			pause_span,
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.failure_threshold == 0 || self.success_threshold == 0 {
			return Err(JobsCoreError::Validation(
				"circuit breaker thresholds must be at least 1".to_string(),
			));
		}
		if self.pause_span.is_zero() {
			return Err(JobsCoreError::Validation(
				"circuit breaker pause span must be positive".to_string(),
			));
		}
		Ok(())
	}
}

/// What a single firing did to the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerTransition {
	/// Success with both counters already zero; nothing to persist.
	Unchanged,
	/// A counter moved but no threshold was reached.
	Counted,
	/// Success threshold reached; counters reset.
	Recovered,
	/// Failure threshold reached; the job must be paused and counters were reset.
	Tripped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerMetadata {
	pub success_counter: u32,
	pub fail_counter: u32,
	pub success_threshold: u32,
	pub failure_threshold: u32,
	#[serde(with = "crate::duration_secs")]
	pub pause_span: Duration,
}

impl CircuitBreakerMetadata {
	pub fn new(settings: CircuitBreakerSettings) -> Self {
		Self {
			success_counter: 0,
			fail_counter: 0,
			success_threshold: settings.success_threshold,
			failure_threshold: settings.failure_threshold,
			pause_span: settings.pause_span,
		}
	}

	/// Keep the counters but adopt the job's current thresholds.
	pub fn with_settings(mut self, settings: CircuitBreakerSettings) -> Self {
		self.success_threshold = settings.success_threshold;
		self.failure_threshold = settings.failure_threshold;
		self.pause_span = settings.pause_span;
		self
	}

	pub fn is_clear(&self) -> bool {
		self.success_counter == 0 && self.fail_counter == 0
	}

	pub fn record_success(&mut self) -> BreakerTransition {
		if self.is_clear() {
			return BreakerTransition::Unchanged;
		}
		self.success_counter = self.success_counter.saturating_add(1);
		if self.success_counter >= self.success_threshold {
			self.reset();
			BreakerTransition::Recovered
		} else {
			BreakerTransition::Counted
		}
	}

	pub fn record_failure(&mut self) -> BreakerTransition {
		self.fail_counter = self.fail_counter.saturating_add(1);
		if self.fail_counter >= self.failure_threshold {
			self.reset();
			BreakerTransition::Tripped
		} else {
			BreakerTransition::Counted
		}
	}

	pub fn reset(&mut self) {
		self.success_counter = 0;
		self.fail_counter = 0;
	}

	pub fn to_blob(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}

	pub fn from_blob(blob: &str) -> Result<Self> {
		Ok(serde_json::from_str(blob)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn settings(failure: u32, success: u32) -> CircuitBreakerSettings {
		CircuitBreakerSettings::new(failure, success, Duration::from_secs(300))
	}

	#[test]
	fn test_success_on_clear_breaker_is_noop() {
		let mut metadata = CircuitBreakerMetadata::new(settings(3, 2));
		assert_eq!(metadata.record_success(), BreakerTransition::Unchanged);
		assert!(metadata.is_clear());
	}

	#[test]
	fn test_trips_at_failure_threshold() {
		let mut metadata = CircuitBreakerMetadata::new(settings(3, 2));
		assert_eq!(metadata.record_failure(), BreakerTransition::Counted);
		assert_eq!(metadata.record_failure(), BreakerTransition::Counted);
		assert_eq!(metadata.fail_counter, 2);
		assert_eq!(metadata.record_failure(), BreakerTransition::Tripped);
		assert!(metadata.is_clear());
	}

	#[test]
	fn test_success_does_not_reset_failures_before_threshold() {
		let mut metadata = CircuitBreakerMetadata::new(settings(5, 2));
		metadata.record_failure();
		metadata.record_failure();
		assert_eq!(metadata.record_success(), BreakerTransition::Counted);
		assert_eq!(metadata.fail_counter, 2);
		assert_eq!(metadata.success_counter, 1);
		assert_eq!(metadata.record_success(), BreakerTransition::Recovered);
		assert!(metadata.is_clear());
	}

	#[test]
	fn test_with_settings_keeps_counters() {
		let mut metadata = CircuitBreakerMetadata::new(settings(5, 2));
		metadata.record_failure();
		let metadata = metadata.with_settings(settings(2, 1));
		assert_eq!(metadata.fail_counter, 1);
		assert_eq!(metadata.failure_threshold, 2);
	}

	#[test]
	fn test_settings_validation() {
		assert!(settings(0, 1).validate().is_err());
		assert!(settings(1, 0).validate().is_err());
		assert!(CircuitBreakerSettings::new(1, 1, Duration::ZERO)
			.validate()
			.is_err());
		assert!(settings(3, 1).validate().is_ok());
	}

	#[test]
	fn test_blob_shape() {
		let metadata = CircuitBreakerMetadata::new(settings(3, 2));
		let blob = metadata.to_blob().unwrap();
		let value: serde_json::Value = serde_json::from_str(&blob).unwrap();
		assert_eq!(value["pause_span"], 300);
		assert_eq!(value["failure_threshold"], 3);
	}

	#[test]
	fn test_corrupt_blob_is_error() {
		assert!(CircuitBreakerMetadata::from_blob("not json").is_err());
	}

	proptest! {
		#[test]
		fn blob_round_trip(
			success_counter in 0u32..1000,
			fail_counter in 0u32..1000,
			success_threshold in 1u32..1000,
			failure_threshold in 1u32..1000,
			pause in 1u64..1_000_000,
		) {
			let metadata = CircuitBreakerMetadata {
				success_counter,
				fail_counter,
				success_threshold,
				failure_threshold,
				pause_span: Duration::from_secs(pause),
			};
			let parsed = CircuitBreakerMetadata::from_blob(&metadata.to_blob().unwrap()).unwrap();
			prop_assert_eq!(parsed, metadata);
		}

		#[test]
		fn consecutive_failures_trip_exactly_at_threshold(threshold in 1u32..50) {
			let mut metadata = CircuitBreakerMetadata::new(settings(threshold, 1));
			for _ in 1..threshold {
				prop_assert_eq!(metadata.record_failure(), BreakerTransition::Counted);
			}
			prop_assert_eq!(metadata.record_failure(), BreakerTransition::Tripped);
			prop_assert!(metadata.is_clear());
		}

		#[test]
		fn successes_after_partial_streak_recover(failures in 1u32..10, threshold in 1u32..10) {
			let mut metadata = CircuitBreakerMetadata::new(settings(failures + 1, threshold));
			for _ in 0..failures {
				metadata.record_failure();
			}
			for _ in 1..threshold {
				prop_assert_eq!(metadata.record_success(), BreakerTransition::Counted);
				prop_assert_eq!(metadata.fail_counter, failures);
			}
			prop_assert_eq!(metadata.record_success(), BreakerTransition::Recovered);
			prop_assert!(metadata.is_clear());
		}
	}
}
