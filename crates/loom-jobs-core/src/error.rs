// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for job resilience primitives.

use thiserror::Error;

/// Result type for core job operations.
pub type Result<T> = std::result::Result<T, JobsCoreError>;

/// Errors raised by the core types.
#[derive(Debug, Error)]
pub enum JobsCoreError {
	/// Configuration rejected at job start; no element runs.
	#[error("validation failed: {0}")]
	Validation(String),

	#[error("invalid data map value for '{key}': {message}")]
	InvalidData { key: String, message: String },

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}
