// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Terminal statuses for check and operation elements.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// Behaviour shared by the two element status domains.
///
/// The invocation engine is generic over this trait so that checks and
/// operations share one state machine while keeping distinct status enums.
pub trait ElementStatus:
	Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
	const INACTIVE: Self;
	const IGNORE: Self;
	const SUCCESS: Self;
	const EXCEPTION: Self;

	/// Whether declared failures of this element kind consult the fail-span tracker.
	const HONORS_FAIL_SPAN: bool;

	/// Whether sequential batches publish progress after each element.
	const REPORTS_PROGRESS: bool;

	/// Status for a declared failure. `suppressed` is true when the failure
	/// fell inside the element's allowed fail span.
	fn declared_failure(suppressed: bool) -> Self;

	/// A valid status does not stop a sequential batch running with stop-on-fail.
	fn is_valid(&self) -> bool;
}

/// Status domain for check elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
	Inactive,
	Ignore,
	Success,
	/// Declared failure inside the allowed fail span.
	CheckWarning,
	/// Declared failure outside the allowed fail span.
	CheckError,
	/// Unexpected defect.
	Exception,
}

impl ElementStatus for CheckStatus {
	const INACTIVE: Self = Self::Inactive;
	const IGNORE: Self = Self::Ignore;
	const SUCCESS: Self = Self::Success;
	const EXCEPTION: Self = Self::Exception;
	const HONORS_FAIL_SPAN: bool = true;
	const REPORTS_PROGRESS: bool = false;

	fn declared_failure(suppressed: bool) -> Self {
		if suppressed {
			Self::CheckWarning
		} else {
			Self::CheckError
		}
	}

	fn is_valid(&self) -> bool {
		matches!(
			self,
			Self::Success | Self::Inactive | Self::Ignore | Self::CheckWarning
		)
	}
}

impl fmt::Display for CheckStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Inactive => write!(f, "inactive"),
			Self::Ignore => write!(f, "ignore"),
			Self::Success => write!(f, "success"),
			Self::CheckWarning => write!(f, "check_warning"),
			Self::CheckError => write!(f, "check_error"),
			Self::Exception => write!(f, "exception"),
		}
	}
}

impl FromStr for CheckStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"inactive" => Ok(Self::Inactive),
			"ignore" => Ok(Self::Ignore),
			"success" => Ok(Self::Success),
			"check_warning" => Ok(Self::CheckWarning),
			"check_error" => Ok(Self::CheckError),
			"exception" => Ok(Self::Exception),
			_ => Err(format!("unknown check status: {}", s)),
		}
	}
}

/// Status domain for operation elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
	Inactive,
	Ignore,
	Success,
	Exception,
}

impl ElementStatus for OperationStatus {
	const INACTIVE: Self = Self::Inactive;
	const IGNORE: Self = Self::Ignore;
	const SUCCESS: Self = Self::Success;
	const EXCEPTION: Self = Self::Exception;
	const HONORS_FAIL_SPAN: bool = false;
	const REPORTS_PROGRESS: bool = true;

	fn declared_failure(_suppressed: bool) -> Self {
		Self::Exception
	}

	fn is_valid(&self) -> bool {
		matches!(self, Self::Success | Self::Inactive | Self::Ignore)
	}
}

impl fmt::Display for OperationStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Inactive => write!(f, "inactive"),
			Self::Ignore => write!(f, "ignore"),
			Self::Success => write!(f, "success"),
			Self::Exception => write!(f, "exception"),
		}
	}
}

impl FromStr for OperationStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"inactive" => Ok(Self::Inactive),
			"ignore" => Ok(Self::Ignore),
			"success" => Ok(Self::Success),
			"exception" => Ok(Self::Exception),
			_ => Err(format!("unknown operation status: {}", s)),
		}
	}
}

/// Count of terminal statuses produced by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary<S: ElementStatus> {
	counts: HashMap<S, usize>,
}

impl<S: ElementStatus> StatusSummary<S> {
	pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a S>) -> Self {
		let mut counts = HashMap::new();
		for status in statuses {
			*counts.entry(*status).or_insert(0) += 1;
		}
		Self { counts }
	}

	pub fn count(&self, status: S) -> usize {
		self.counts.get(&status).copied().unwrap_or(0)
	}

	pub fn total(&self) -> usize {
		self.counts.values().sum()
	}
}

impl<S: ElementStatus> Default for StatusSummary<S> {
	fn default() -> Self {
		Self {
			counts: HashMap::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_check_status_validity() {
		assert!(CheckStatus::Success.is_valid());
		assert!(CheckStatus::Inactive.is_valid());
		assert!(CheckStatus::Ignore.is_valid());
		assert!(CheckStatus::CheckWarning.is_valid());
		assert!(!CheckStatus::CheckError.is_valid());
		assert!(!CheckStatus::Exception.is_valid());
	}

	#[test]
	fn test_operation_status_validity() {
		assert!(OperationStatus::Success.is_valid());
		assert!(OperationStatus::Inactive.is_valid());
		assert!(OperationStatus::Ignore.is_valid());
		assert!(!OperationStatus::Exception.is_valid());
	}

	#[test]
	fn test_declared_failure_mapping() {
		assert_eq!(CheckStatus::declared_failure(true), CheckStatus::CheckWarning);
		assert_eq!(CheckStatus::declared_failure(false), CheckStatus::CheckError);
		assert_eq!(
			OperationStatus::declared_failure(true),
			OperationStatus::Exception
		);
	}

	#[test]
	fn test_status_display_parse() {
		for status in [
			CheckStatus::Inactive,
			CheckStatus::Ignore,
			CheckStatus::Success,
			CheckStatus::CheckWarning,
			CheckStatus::CheckError,
			CheckStatus::Exception,
		] {
			assert_eq!(status.to_string().parse::<CheckStatus>().unwrap(), status);
		}
		assert!("bogus".parse::<OperationStatus>().is_err());
	}

	#[test]
	fn test_status_summary_counts() {
		let statuses = [
			CheckStatus::Inactive,
			CheckStatus::Inactive,
			CheckStatus::Success,
			CheckStatus::CheckError,
		];
		let summary = StatusSummary::from_statuses(statuses.iter());
		assert_eq!(summary.count(CheckStatus::Inactive), 2);
		assert_eq!(summary.count(CheckStatus::Success), 1);
		assert_eq!(summary.count(CheckStatus::CheckWarning), 0);
		assert_eq!(summary.total(), 4);
	}
}
