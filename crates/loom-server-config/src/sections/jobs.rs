// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Jobs configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobsConfigLayer {
	pub default_max_retries: Option<u32>,
	pub default_max_degree_of_parallelism: Option<usize>,
	pub breaker_failure_threshold: Option<u32>,
	pub breaker_success_threshold: Option<u32>,
	pub breaker_pause_span_secs: Option<u64>,
	pub monitoring_enabled: Option<bool>,
	pub shutdown_timeout_secs: Option<u64>,
}

impl JobsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.default_max_retries.is_some() {
			self.default_max_retries = other.default_max_retries;
		}
		if other.default_max_degree_of_parallelism.is_some() {
			self.default_max_degree_of_parallelism = other.default_max_degree_of_parallelism;
		}
		if other.breaker_failure_threshold.is_some() {
			self.breaker_failure_threshold = other.breaker_failure_threshold;
		}
		if other.breaker_success_threshold.is_some() {
			self.breaker_success_threshold = other.breaker_success_threshold;
		}
		if other.breaker_pause_span_secs.is_some() {
			self.breaker_pause_span_secs = other.breaker_pause_span_secs;
		}
		if other.monitoring_enabled.is_some() {
			self.monitoring_enabled = other.monitoring_enabled;
		}
		if other.shutdown_timeout_secs.is_some() {
			self.shutdown_timeout_secs = other.shutdown_timeout_secs;
		}
	}

	pub fn finalize(self) -> JobsConfig {
		let defaults = JobsConfig::default();
		JobsConfig {
			default_max_retries: self.default_max_retries.unwrap_or(defaults.default_max_retries),
			default_max_degree_of_parallelism: self
				.default_max_degree_of_parallelism
				.unwrap_or(defaults.default_max_degree_of_parallelism),
			breaker_failure_threshold: self
				.breaker_failure_threshold
				.unwrap_or(defaults.breaker_failure_threshold),
			breaker_success_threshold: self
				.breaker_success_threshold
				.unwrap_or(defaults.breaker_success_threshold),
			breaker_pause_span_secs: self
				.breaker_pause_span_secs
				.unwrap_or(defaults.breaker_pause_span_secs),
			monitoring_enabled: self.monitoring_enabled.unwrap_or(defaults.monitoring_enabled),
			shutdown_timeout_secs: self
				.shutdown_timeout_secs
				.unwrap_or(defaults.shutdown_timeout_secs),
		}
	}
}

/// Resilience defaults applied to jobs that do not carry their own settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
	/// Retry ceiling for retry triggers without a `retry.max` entry.
	pub default_max_retries: u32,
	pub default_max_degree_of_parallelism: usize,
	pub breaker_failure_threshold: u32,
	pub breaker_success_threshold: u32,
	pub breaker_pause_span_secs: u64,
	/// When false, monitor alerts are dropped instead of dispatched.
	pub monitoring_enabled: bool,
	pub shutdown_timeout_secs: u64,
}

impl Default for JobsConfig {
	fn default() -> Self {
		Self {
			default_max_retries: 3,
			default_max_degree_of_parallelism: 10,
			breaker_failure_threshold: 5,
			breaker_success_threshold: 1,
			breaker_pause_span_secs: 300, // 5 minutes
			monitoring_enabled: true,
			shutdown_timeout_secs: 5,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = JobsConfig::default();
		assert_eq!(config.default_max_retries, 3);
		assert_eq!(config.default_max_degree_of_parallelism, 10);
		assert_eq!(config.breaker_failure_threshold, 5);
		assert_eq!(config.breaker_success_threshold, 1);
		assert_eq!(config.breaker_pause_span_secs, 300);
		assert!(config.monitoring_enabled);
	}

	#[test]
	fn test_layer_finalize_defaults() {
		assert_eq!(JobsConfigLayer::default().finalize(), JobsConfig::default());
	}

	#[test]
	fn test_layer_finalize_with_values() {
		let layer = JobsConfigLayer {
			default_max_retries: Some(1),
			breaker_pause_span_secs: Some(30),
			monitoring_enabled: Some(false),
			..Default::default()
		};
		let config = layer.finalize();
		assert_eq!(config.default_max_retries, 1);
		assert_eq!(config.breaker_pause_span_secs, 30);
		assert!(!config.monitoring_enabled);
		assert_eq!(config.breaker_failure_threshold, 5);
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = JobsConfigLayer {
			default_max_retries: Some(3),
			breaker_failure_threshold: Some(5),
			..Default::default()
		};
		let overlay = JobsConfigLayer {
			default_max_retries: Some(6),
			breaker_failure_threshold: None,
			..Default::default()
		};
		base.merge(overlay);
		assert_eq!(base.default_max_retries, Some(6));
		assert_eq!(base.breaker_failure_threshold, Some(5));
	}

	#[test]
	fn test_serde_roundtrip() {
		let config = JobsConfig {
			default_max_retries: 7,
			breaker_pause_span_secs: 42,
			..Default::default()
		};
		let toml_str = toml::to_string(&config).unwrap();
		let parsed: JobsConfig = toml::from_str(&toml_str).unwrap();
		assert_eq!(config, parsed);
	}

	#[test]
	fn test_deserialize_layer_partial() {
		let toml_str = r#"
breaker_failure_threshold = 2
"#;
		let layer: JobsConfigLayer = toml::from_str(toml_str).unwrap();
		assert_eq!(layer.breaker_failure_threshold, Some(2));
		assert!(layer.default_max_retries.is_none());
	}
}
