// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;

use crate::sections::{DatabaseConfigLayer, JobsConfigLayer, LoggingConfigLayer};

/// Partial server configuration produced by a single source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub jobs: Option<JobsConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl ServerConfigLayer {
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.jobs, other.jobs, JobsConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(existing), Some(incoming)) => merge(existing, incoming),
		(None, Some(incoming)) => *base = Some(incoming),
		(_, None) => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_fills_missing_sections() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: Some("sqlite::memory:".to_string()),
				max_connections: None,
			}),
			..Default::default()
		});
		assert_eq!(
			base.database.unwrap().url.as_deref(),
			Some("sqlite::memory:")
		);
		assert!(base.jobs.is_none());
	}

	#[test]
	fn test_merge_overlays_fields() {
		let mut base = ServerConfigLayer {
			jobs: Some(JobsConfigLayer {
				default_max_retries: Some(3),
				breaker_failure_threshold: Some(5),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(ServerConfigLayer {
			jobs: Some(JobsConfigLayer {
				default_max_retries: Some(7),
				..Default::default()
			}),
			..Default::default()
		});
		let jobs = base.jobs.unwrap();
		assert_eq!(jobs.default_max_retries, Some(7));
		assert_eq!(jobs.breaker_failure_threshold, Some(5));
	}
}
