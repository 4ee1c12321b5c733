// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use loom_server_config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{JobError, Result};

/// `RUST_LOG` when set, otherwise the configured level.
pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for_level(&config.level))
}

fn filter_for_level(level: &str) -> EnvFilter {
	EnvFilter::new(level)
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
	tracing_subscriber::registry()
		.with(build_env_filter(config))
		.with(config.json.then(|| tracing_subscriber::fmt::layer().json()))
		.with((!config.json).then(|| tracing_subscriber::fmt::layer()))
		.try_init()
		.map_err(|e| JobError::Internal(format!("failed to install tracing subscriber: {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;
	use tracing_subscriber::filter::LevelFilter;

	#[test]
	fn test_level_filter() {
		assert_eq!(filter_for_level("debug").max_level_hint(), Some(LevelFilter::DEBUG));
		assert_eq!(filter_for_level("warn").max_level_hint(), Some(LevelFilter::WARN));
	}

	#[test]
	fn test_directive_filter() {
		let filter = filter_for_level("info,loom_server_jobs=trace");
		assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
	}
}
