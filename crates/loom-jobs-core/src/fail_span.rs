// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fail-span conventions shared by the tracker and its tests.

use std::time::Duration;

pub const FAIL_SPAN_KEY_PREFIX: &str = "last.fail.";

/// Job data map key holding the last failure timestamp of an element.
pub fn fail_span_key(element_key: &str) -> String {
	format!("{FAIL_SPAN_KEY_PREFIX}{element_key}")
}

/// True iff `span` is non-zero and strictly greater than `elapsed`.
pub fn is_within_span(span: Option<Duration>, elapsed: Duration) -> bool {
	match span {
		Some(span) if !span.is_zero() => span > elapsed,
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_fail_span_key() {
		assert_eq!(fail_span_key("db-ping"), "last.fail.db-ping");
	}

	#[test]
	fn test_first_failure_is_within_positive_span() {
		assert!(is_within_span(Some(Duration::from_secs(1)), Duration::ZERO));
	}

	#[test]
	fn test_no_span_never_suppresses() {
		assert!(!is_within_span(None, Duration::ZERO));
		assert!(!is_within_span(Some(Duration::ZERO), Duration::ZERO));
	}

	#[test]
	fn test_boundary_is_not_within_span() {
		let span = Duration::from_secs(60);
		assert!(!is_within_span(Some(span), span));
	}

	proptest! {
		#[test]
		fn elapsed_beyond_span_escalates(span in 1u64..10_000, extra in 0u64..10_000) {
			let span = Duration::from_secs(span);
			let elapsed = span + Duration::from_secs(extra);
			prop_assert!(!is_within_span(Some(span), elapsed));
		}

		#[test]
		fn elapsed_inside_span_suppresses(span in 1u64..10_000, fraction in 0.0f64..1.0) {
			let span = Duration::from_secs(span);
			let elapsed = span.mul_f64(fraction);
			prop_assume!(elapsed < span);
			prop_assert!(is_within_span(Some(span), elapsed));
		}
	}
}
