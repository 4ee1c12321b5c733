// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the Loom job resilience service.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Validation of resilience defaults before any job is scheduled
//! - Consistent environment variable naming (`LOOM_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use loom_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("default retries: {}", config.jobs.default_max_retries);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::path::PathBuf;

use tracing::{debug, info};

const MIN_DEGREE_OF_PARALLELISM: usize = 2;
const MAX_DEGREE_OF_PARALLELISM: usize = 100;

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub database: DatabaseConfig,
	pub jobs: JobsConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`LOOM_SERVER_*`)
/// 2. Config file (`/etc/loom/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<ServerConfig, ConfigError> {
	let mut merged = ServerConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let database = layer.database.unwrap_or_default().finalize();
	let jobs = layer.jobs.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&database, &jobs)?;

	info!(
		database = %database.url,
		default_max_retries = jobs.default_max_retries,
		default_max_degree_of_parallelism = jobs.default_max_degree_of_parallelism,
		breaker_failure_threshold = jobs.breaker_failure_threshold,
		breaker_pause_span_secs = jobs.breaker_pause_span_secs,
		monitoring_enabled = jobs.monitoring_enabled,
		log_level = %logging.level,
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		database,
		jobs,
		logging,
	})
}

/// Validate cross-field configuration rules.
pub fn validate_config(database: &DatabaseConfig, jobs: &JobsConfig) -> Result<(), ConfigError> {
	if database.url.trim().is_empty() {
		return Err(ConfigError::Validation(
			"LOOM_SERVER_DATABASE_URL must not be empty".to_string(),
		));
	}
	if database.max_connections == 0 {
		return Err(ConfigError::InvalidValue {
			key: "database.max_connections".to_string(),
			message: "must be at least 1".to_string(),
		});
	}
	if jobs.breaker_failure_threshold == 0 || jobs.breaker_success_threshold == 0 {
		return Err(ConfigError::Validation(
			"circuit breaker thresholds must be at least 1".to_string(),
		));
	}
	if jobs.breaker_pause_span_secs == 0 {
		return Err(ConfigError::InvalidValue {
			key: "jobs.breaker_pause_span_secs".to_string(),
			message: "must be positive".to_string(),
		});
	}
	let dop = jobs.default_max_degree_of_parallelism;
	if !(MIN_DEGREE_OF_PARALLELISM..=MAX_DEGREE_OF_PARALLELISM).contains(&dop) {
		return Err(ConfigError::InvalidValue {
			key: "jobs.default_max_degree_of_parallelism".to_string(),
			message: format!(
				"{dop} is outside {MIN_DEGREE_OF_PARALLELISM}..={MAX_DEGREE_OF_PARALLELISM}"
			),
		});
	}

	Ok(())
}
