// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::types::JobKey;

/// One audit entry, written per circuit breaker trip.
#[derive(Debug, Clone, Serialize)]
pub struct JobAuditRecord {
	pub job_key: JobKey,
	pub description: String,
	pub info: serde_json::Value,
	pub recorded_at: DateTime<Utc>,
}

impl JobAuditRecord {
	pub fn new(job_key: JobKey, description: impl Into<String>, info: serde_json::Value) -> Self {
		Self {
			job_key,
			description: description.into(),
			info,
			recorded_at: Utc::now(),
		}
	}
}

#[async_trait]
pub trait JobAuditSink: Send + Sync {
	fn name(&self) -> &str;

	async fn publish(&self, record: &JobAuditRecord) -> Result<()>;
}

/// Writes audit records to the log under the `loom_jobs::audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl JobAuditSink for TracingAuditSink {
	fn name(&self) -> &str {
		"tracing"
	}

	async fn publish(&self, record: &JobAuditRecord) -> Result<()> {
		let info = serde_json::to_string(&record.info)?;
		info!(
			target: "loom_jobs::audit",
			job_key = %record.job_key,
			recorded_at = %record.recorded_at,
			info = %info,
			"{}",
			record.description
		);
		Ok(())
	}
}
