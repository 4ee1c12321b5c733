// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary reported for a run that finished without queued failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeDetails<T> {
	pub job_key: String,
	pub effected_rows: Option<i64>,
	pub success: bool,
	pub fire_instance_id: String,
	pub fire_time: DateTime<Utc>,
	pub payload: T,
}
