// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fail-span suppression.
//!
//! A declared failure inside an element's allowed fail span is downgraded to
//! a warning. The last failure time is kept in the job's data map under
//! `last.fail.<element key>`. Reading it when absent records "now", so the
//! first failure of an element with a positive span is always suppressed;
//! only failures that keep happening past the span escalate.

use chrono::{DateTime, Utc};
use loom_jobs_core::{fail_span_key, is_within_span, ElementSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::{DataScope, JobDataStore};
use crate::types::JobKey;

#[derive(Clone)]
pub struct FailSpanTracker {
	store: Arc<dyn JobDataStore>,
	scope: DataScope,
}

impl FailSpanTracker {
	pub fn new(store: Arc<dyn JobDataStore>, job_key: &JobKey) -> Self {
		Self {
			store,
			scope: DataScope::Job(job_key.clone()),
		}
	}

	/// Whether a failure of `element` right now falls inside its allowed span.
	pub async fn is_span_valid(&self, element: &ElementSettings) -> Result<bool> {
		let Some(span) = element.span() else {
			return Ok(false);
		};

		let last_failure = self.last_failure(&element.key).await?;
		let elapsed = (Utc::now() - last_failure).to_std().unwrap_or(Duration::ZERO);
		let valid = is_within_span(Some(span), elapsed);

		debug!(
			element_key = %element.key,
			span_secs = span.as_secs(),
			elapsed_secs = elapsed.as_secs(),
			valid,
			"evaluated fail span"
		);
		Ok(valid)
	}

	/// Last recorded failure of `element_key`, recording now when there is none.
	pub async fn last_failure(&self, element_key: &str) -> Result<DateTime<Utc>> {
		let key = fail_span_key(element_key);
		if let Some(raw) = self.store.get(&self.scope, &key).await? {
			match DateTime::parse_from_rfc3339(&raw) {
				Ok(parsed) => return Ok(parsed.with_timezone(&Utc)),
				Err(e) => {
					warn!(element_key, value = %raw, error = %e, "unreadable fail span timestamp, starting a new span");
				}
			}
		}

		let now = Utc::now();
		self.store.put(&self.scope, &key, &now.to_rfc3339()).await?;
		Ok(now)
	}

	pub async fn reset_fail_span(&self, element_key: &str) -> Result<()> {
		self.store
			.remove(&self.scope, &fail_span_key(element_key))
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::InMemoryJobDataStore;

	fn tracker() -> (FailSpanTracker, Arc<InMemoryJobDataStore>) {
		let store = Arc::new(InMemoryJobDataStore::new());
		(
			FailSpanTracker::new(store.clone(), &JobKey::named("checks")),
			store,
		)
	}

	fn scope() -> DataScope {
		DataScope::Job(JobKey::named("checks"))
	}

	#[tokio::test]
	async fn test_first_failure_is_suppressed_and_recorded() {
		let (tracker, store) = tracker();
		let element = ElementSettings::new("disk").with_fail_span(Duration::from_secs(600));

		assert!(tracker.is_span_valid(&element).await.unwrap());
		assert!(store
			.get(&scope(), "last.fail.disk")
			.await
			.unwrap()
			.is_some());
	}

	#[tokio::test]
	async fn test_expired_span_escalates() {
		let (tracker, store) = tracker();
		let element = ElementSettings::new("disk").with_fail_span(Duration::from_secs(60));
		let long_ago = Utc::now() - chrono::Duration::seconds(120);
		store
			.put(&scope(), "last.fail.disk", &long_ago.to_rfc3339())
			.await
			.unwrap();

		assert!(!tracker.is_span_valid(&element).await.unwrap());
	}

	#[tokio::test]
	async fn test_recent_failure_stays_suppressed() {
		let (tracker, store) = tracker();
		let element = ElementSettings::new("disk").with_fail_span(Duration::from_secs(600));
		let recent = Utc::now() - chrono::Duration::seconds(30);
		store
			.put(&scope(), "last.fail.disk", &recent.to_rfc3339())
			.await
			.unwrap();

		assert!(tracker.is_span_valid(&element).await.unwrap());
		// The stored timestamp is not refreshed by a suppressed failure.
		let stored = store.get(&scope(), "last.fail.disk").await.unwrap().unwrap();
		assert_eq!(stored, recent.to_rfc3339());
	}

	#[tokio::test]
	async fn test_no_span_is_never_valid_and_writes_nothing() {
		let (tracker, store) = tracker();
		let element = ElementSettings::new("disk");

		assert!(!tracker.is_span_valid(&element).await.unwrap());
		assert!(store.load(&scope()).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_reset_clears_record() {
		let (tracker, store) = tracker();
		let element = ElementSettings::new("disk").with_fail_span(Duration::from_secs(600));
		tracker.is_span_valid(&element).await.unwrap();

		tracker.reset_fail_span("disk").await.unwrap();
		assert!(store
			.get(&scope(), "last.fail.disk")
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn test_corrupt_timestamp_starts_new_span() {
		let (tracker, store) = tracker();
		store
			.put(&scope(), "last.fail.disk", "yesterday-ish")
			.await
			.unwrap();
		let element = ElementSettings::new("disk").with_fail_span(Duration::from_secs(60));

		assert!(tracker.is_span_valid(&element).await.unwrap());
	}
}
