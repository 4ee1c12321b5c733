// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Retry trigger conventions.
//!
//! A trigger opts into automatic retries by carrying [`RETRY_SPAN_KEY`] (and
//! optionally [`MAX_RETRIES_KEY`]) in its data map. Every retry is a one-shot
//! trigger in [`RETRY_TRIGGER_GROUP`] whose data map carries the attempt
//! number under [`RETRY_COUNTER_KEY`].

use std::time::Duration;

use crate::error::{JobsCoreError, Result};
use crate::DataMap;

pub const RETRY_TRIGGER_GROUP: &str = "loom.retry";
pub const RETRY_TRIGGER_PREFIX: &str = "retry";

/// Trigger-scoped identifier. Never copied onto a retry trigger.
pub const TRIGGER_ID_KEY: &str = "trigger.id";
/// Delay before the next attempt, in whole seconds.
pub const RETRY_SPAN_KEY: &str = "retry.span";
/// 1-based number of the attempt a retry trigger represents.
pub const RETRY_COUNTER_KEY: &str = "retry.counter";
pub const MAX_RETRIES_KEY: &str = "retry.max";

/// Retry settings read from a fired trigger's data map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTriggerConfig {
	pub retry_span: Option<Duration>,
	pub retry_counter: u32,
	pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPlan {
	/// The trigger carries retry settings but no usable span.
	NoRetrySpan,
	/// Every allowed attempt has been used.
	Exhausted { attempts: u32, max_retries: u32 },
	/// Schedule attempt number `attempt` after `retry_span`.
	Retry {
		attempt: u32,
		retry_span: Duration,
		max_retries: u32,
	},
}

impl RetryTriggerConfig {
	/// Read retry settings. Returns `None` when the trigger carries no retry keys at all.
	pub fn from_data(data: &DataMap) -> Result<Option<Self>> {
		let has_config = [RETRY_SPAN_KEY, RETRY_COUNTER_KEY, MAX_RETRIES_KEY]
			.iter()
			.any(|key| data.contains_key(*key));
		if !has_config {
			return Ok(None);
		}

		Ok(Some(Self {
			retry_span: parse_u64(data, RETRY_SPAN_KEY)?.map(Duration::from_secs),
			retry_counter: parse_u32(data, RETRY_COUNTER_KEY)?.unwrap_or(0),
			max_retries: parse_u32(data, MAX_RETRIES_KEY)?,
		}))
	}

	pub fn plan(&self, default_max_retries: u32) -> RetryPlan {
		let retry_span = match self.retry_span {
			Some(span) if !span.is_zero() => span,
			_ => return RetryPlan::NoRetrySpan,
		};
		let max_retries = self.max_retries.unwrap_or(default_max_retries);
		if self.retry_counter >= max_retries {
			return RetryPlan::Exhausted {
				attempts: self.retry_counter,
				max_retries,
			};
		}
		RetryPlan::Retry {
			attempt: self.retry_counter + 1,
			retry_span,
			max_retries,
		}
	}
}

/// Deterministic name for the retry trigger of `attempt`.
pub fn retry_trigger_name(attempt: u32, origin_id: &str) -> String {
	format!("{RETRY_TRIGGER_PREFIX}.{attempt}.{origin_id}")
}

/// Data map for a retry trigger: the original keys minus the original
/// trigger id, plus a fresh id and the retry bookkeeping.
pub fn build_retry_data(
	original: &DataMap,
	new_trigger_id: &str,
	attempt: u32,
	retry_span: Duration,
	max_retries: u32,
) -> DataMap {
	let mut data: DataMap = original
		.iter()
		.filter(|(key, _)| key.as_str() != TRIGGER_ID_KEY)
		.map(|(key, value)| (key.clone(), value.clone()))
		.collect();
	data.insert(TRIGGER_ID_KEY.to_string(), new_trigger_id.to_string());
	data.insert(
		RETRY_SPAN_KEY.to_string(),
		retry_span.as_secs().to_string(),
	);
	data.insert(RETRY_COUNTER_KEY.to_string(), attempt.to_string());
	data.insert(MAX_RETRIES_KEY.to_string(), max_retries.to_string());
	data
}

fn parse_u32(data: &DataMap, key: &str) -> Result<Option<u32>> {
	data
		.get(key)
		.map(|value| {
			value.trim().parse::<u32>().map_err(|_| JobsCoreError::InvalidData {
				key: key.to_string(),
				message: format!("expected a non-negative integer, got '{value}'"),
			})
		})
		.transpose()
}

fn parse_u64(data: &DataMap, key: &str) -> Result<Option<u64>> {
	data
		.get(key)
		.map(|value| {
			value.trim().parse::<u64>().map_err(|_| JobsCoreError::InvalidData {
				key: key.to_string(),
				message: format!("expected whole seconds, got '{value}'"),
			})
		})
		.transpose()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn data(pairs: &[(&str, &str)]) -> DataMap {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn test_no_retry_keys_is_none() {
		let config = RetryTriggerConfig::from_data(&data(&[("region", "eu")])).unwrap();
		assert!(config.is_none());
	}

	#[test]
	fn test_missing_span_plans_no_retry() {
		let config = RetryTriggerConfig::from_data(&data(&[(MAX_RETRIES_KEY, "3")]))
			.unwrap()
			.unwrap();
		assert_eq!(config.plan(5), RetryPlan::NoRetrySpan);

		let zero = RetryTriggerConfig::from_data(&data(&[(RETRY_SPAN_KEY, "0")]))
			.unwrap()
			.unwrap();
		assert_eq!(zero.plan(5), RetryPlan::NoRetrySpan);
	}

	#[test]
	fn test_first_retry_plan() {
		let config = RetryTriggerConfig::from_data(&data(&[
			(RETRY_SPAN_KEY, "30"),
			(MAX_RETRIES_KEY, "3"),
		]))
		.unwrap()
		.unwrap();
		assert_eq!(
			config.plan(5),
			RetryPlan::Retry {
				attempt: 1,
				retry_span: Duration::from_secs(30),
				max_retries: 3,
			}
		);
	}

	#[test]
	fn test_default_max_retries_applies() {
		let config = RetryTriggerConfig::from_data(&data(&[
			(RETRY_SPAN_KEY, "30"),
			(RETRY_COUNTER_KEY, "2"),
		]))
		.unwrap()
		.unwrap();
		assert_eq!(
			config.plan(2),
			RetryPlan::Exhausted {
				attempts: 2,
				max_retries: 2,
			}
		);
	}

	#[test]
	fn test_invalid_counter_is_error() {
		let err = RetryTriggerConfig::from_data(&data(&[(RETRY_COUNTER_KEY, "many")])).unwrap_err();
		assert!(err.to_string().contains(RETRY_COUNTER_KEY));
	}

	#[test]
	fn test_retry_trigger_name() {
		assert_eq!(retry_trigger_name(2, "abc"), "retry.2.abc");
	}

	#[test]
	fn test_build_retry_data_replaces_trigger_id() {
		let original = data(&[
			(TRIGGER_ID_KEY, "original-id"),
			(RETRY_SPAN_KEY, "30"),
			("region", "eu"),
		]);
		let built = build_retry_data(&original, "fresh-id", 1, Duration::from_secs(30), 3);
		assert_eq!(built.get(TRIGGER_ID_KEY).unwrap(), "fresh-id");
		assert_eq!(built.get(RETRY_COUNTER_KEY).unwrap(), "1");
		assert_eq!(built.get(MAX_RETRIES_KEY).unwrap(), "3");
		assert_eq!(built.get(RETRY_SPAN_KEY).unwrap(), "30");
		assert_eq!(built.get("region").unwrap(), "eu");
		assert!(!built.values().any(|v| v == "original-id"));
	}
}
