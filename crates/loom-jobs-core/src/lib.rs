// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom resilient job-execution layer.
//!
//! This crate holds the I/O-free half of the job resilience machinery:
//!
//! - [`ElementSettings`] and the two status domains ([`CheckStatus`],
//!   [`OperationStatus`]) behind the [`ElementStatus`] trait
//! - [`ElementFailure`]: declared check failures vs unexpected defects
//! - [`ExecutionPolicy`]: per-job parallelism and stop-on-fail settings
//! - [`CircuitBreakerMetadata`]: the persisted per-job breaker state machine
//! - [`RetryTriggerConfig`]: retry trigger data-map conventions and planning
//! - Fail-span key and window helpers
//!
//! The async engine, listeners and stores live in `loom-server-jobs`.

pub mod breaker;
pub mod element;
pub mod error;
pub mod fail_span;
pub mod failure;
pub mod finalize;
pub mod policy;
pub mod retry;
pub mod status;

mod duration_secs;

use std::collections::BTreeMap;

pub use breaker::{
	BreakerTransition, CircuitBreakerMetadata, CircuitBreakerSettings, CIRCUIT_BREAKER_DATA_KEY,
};
pub use element::{ElementSettings, MAX_RETRY_COUNT, MAX_RETRY_INTERVAL, MIN_RETRY_INTERVAL};
pub use error::{JobsCoreError, Result};
pub use fail_span::{fail_span_key, is_within_span, FAIL_SPAN_KEY_PREFIX};
pub use failure::{ElementFailure, RunFailure, RunFailureKind};
pub use finalize::FinalizeDetails;
pub use policy::{
	ExecutionPolicy, DEFAULT_MAX_DEGREE_OF_PARALLELISM, MAX_DEGREE_OF_PARALLELISM,
	MIN_DEGREE_OF_PARALLELISM,
};
pub use retry::{
	build_retry_data, retry_trigger_name, RetryPlan, RetryTriggerConfig, MAX_RETRIES_KEY,
	RETRY_COUNTER_KEY, RETRY_SPAN_KEY, RETRY_TRIGGER_GROUP, RETRY_TRIGGER_PREFIX, TRIGGER_ID_KEY,
};
pub use status::{CheckStatus, ElementStatus, OperationStatus, StatusSummary};

/// String-keyed data map attached to a job or trigger. Values round-trip as text.
pub type DataMap = BTreeMap<String, String>;
