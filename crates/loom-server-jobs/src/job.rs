// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::context::JobContext;
use crate::error::JobError;
use crate::types::JobOutput;
use async_trait::async_trait;

#[async_trait]
pub trait Job: Send + Sync {
	async fn run(&self, ctx: &JobContext) -> std::result::Result<JobOutput, JobError>;
}
