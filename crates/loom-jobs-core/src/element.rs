// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configured settings shared by check and operation elements.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{JobsCoreError, Result};

pub const MAX_RETRY_COUNT: u32 = 10;
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(59);

/// The shared base record of an element under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSettings {
	pub key: String,
	#[serde(default = "default_active")]
	pub active: bool,
	/// Grace window in which repeated declared failures are downgraded to warnings.
	#[serde(default, with = "crate::duration_secs::option")]
	pub allowed_fail_span: Option<Duration>,
	#[serde(default)]
	pub retry_count: u32,
	#[serde(default = "default_retry_interval", with = "crate::duration_secs")]
	pub retry_interval: Duration,
	/// Trigger names this element runs for. Empty means every trigger.
	#[serde(default)]
	pub bind_to_triggers: Vec<String>,
	#[serde(default)]
	pub veto: bool,
	#[serde(default)]
	pub veto_reason: Option<String>,
}

impl ElementSettings {
	pub fn new(key: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			active: true,
			allowed_fail_span: None,
			retry_count: 0,
			retry_interval: default_retry_interval(),
			bind_to_triggers: Vec::new(),
			veto: false,
			veto_reason: None,
		}
	}

	pub fn inactive(mut self) -> Self {
		self.active = false;
		self
	}

	pub fn with_fail_span(mut self, span: Duration) -> Self {
		self.allowed_fail_span = Some(span);
		self
	}

	pub fn with_retry(mut self, count: u32, interval: Duration) -> Self {
		self.retry_count = count;
		self.retry_interval = interval;
		self
	}

	pub fn bound_to<I, T>(mut self, triggers: I) -> Self
	where
		I: IntoIterator<Item = T>,
		T: Into<String>,
	{
		self.bind_to_triggers = triggers.into_iter().map(Into::into).collect();
		self
	}

	pub fn vetoed(mut self, reason: impl Into<String>) -> Self {
		self.veto = true;
		self.veto_reason = Some(reason.into());
		self
	}

	/// The non-zero fail span, if any.
	pub fn span(&self) -> Option<Duration> {
		self.allowed_fail_span.filter(|span| !span.is_zero())
	}

	/// Whether this element runs for a firing of `trigger_name`.
	///
	/// Manual and system firings bypass the bind list.
	pub fn is_bound_to(&self, trigger_name: &str, manual_or_system: bool) -> bool {
		self.bind_to_triggers.is_empty()
			|| manual_or_system
			|| self
				.bind_to_triggers
				.iter()
				.any(|bound| bound.eq_ignore_ascii_case(trigger_name))
	}

	pub fn validate(&self) -> Result<()> {
		if self.key.trim().is_empty() {
			return Err(JobsCoreError::Validation(
				"element key must not be empty".to_string(),
			));
		}
		if self.retry_count > MAX_RETRY_COUNT {
			return Err(JobsCoreError::Validation(format!(
				"element '{}': retry_count {} exceeds maximum of {}",
				self.key, self.retry_count, MAX_RETRY_COUNT
			)));
		}
		if self.retry_count > 0
			&& (self.retry_interval < MIN_RETRY_INTERVAL || self.retry_interval > MAX_RETRY_INTERVAL)
		{
			return Err(JobsCoreError::Validation(format!(
				"element '{}': retry_interval must be between {} and {} seconds",
				self.key,
				MIN_RETRY_INTERVAL.as_secs(),
				MAX_RETRY_INTERVAL.as_secs()
			)));
		}
		Ok(())
	}
}

fn default_active() -> bool {
	true
}

fn default_retry_interval() -> Duration {
	MIN_RETRY_INTERVAL
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let settings = ElementSettings::new("disk-space");
		assert!(settings.active);
		assert_eq!(settings.retry_count, 0);
		assert_eq!(settings.retry_interval, Duration::from_secs(1));
		assert!(settings.span().is_none());
		assert!(settings.validate().is_ok());
	}

	#[test]
	fn test_zero_span_is_no_span() {
		let settings = ElementSettings::new("x").with_fail_span(Duration::ZERO);
		assert!(settings.span().is_none());
	}

	#[test]
	fn test_bind_to_triggers() {
		let settings = ElementSettings::new("x").bound_to(["nightly", "Hourly"]);
		assert!(settings.is_bound_to("nightly", false));
		assert!(settings.is_bound_to("hourly", false));
		assert!(!settings.is_bound_to("weekly", false));
		assert!(settings.is_bound_to("weekly", true));

		let unbound = ElementSettings::new("y");
		assert!(unbound.is_bound_to("anything", false));
	}

	#[test]
	fn test_validate_retry_count_limit() {
		let settings = ElementSettings::new("x").with_retry(11, Duration::from_secs(5));
		let err = settings.validate().unwrap_err();
		assert!(err.to_string().contains("retry_count"));
	}

	#[test]
	fn test_validate_retry_interval_range() {
		let too_long = ElementSettings::new("x").with_retry(2, Duration::from_secs(60));
		assert!(too_long.validate().is_err());

		let too_short = ElementSettings::new("x").with_retry(2, Duration::from_millis(500));
		assert!(too_short.validate().is_err());

		let ok = ElementSettings::new("x").with_retry(10, Duration::from_secs(59));
		assert!(ok.validate().is_ok());
	}

	#[test]
	fn test_validate_empty_key() {
		assert!(ElementSettings::new("  ").validate().is_err());
	}

	#[test]
	fn test_deserialize_minimal() {
		let settings: ElementSettings = serde_json::from_str(r#"{"key":"db-ping"}"#).unwrap();
		assert_eq!(settings, ElementSettings::new("db-ping"));
	}

	#[test]
	fn test_deserialize_full() {
		let json = r#"{
			"key": "db-ping",
			"active": false,
			"allowed_fail_span": 600,
			"retry_count": 3,
			"retry_interval": 10,
			"bind_to_triggers": ["nightly"],
			"veto": true,
			"veto_reason": "maintenance"
		}"#;
		let settings: ElementSettings = serde_json::from_str(json).unwrap();
		assert!(!settings.active);
		assert_eq!(settings.allowed_fail_span, Some(Duration::from_secs(600)));
		assert_eq!(settings.retry_interval, Duration::from_secs(10));
		assert_eq!(settings.veto_reason.as_deref(), Some("maintenance"));
	}
}
