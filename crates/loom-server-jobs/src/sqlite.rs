// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use loom_jobs_core::DataMap;
use loom_server_config::DatabaseConfig;
use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;

use crate::error::{JobError, Result};
use crate::store::{DataScope, JobDataStore};

/// Create a SqlitePool with WAL mode and common settings.
///
/// # Errors
/// Returns `JobError::Internal` if the URL is invalid, or `JobError::Database`
/// if the connection fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| JobError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(max_connections)
		.connect_with(options)
		.await?;

	tracing::debug!(max_connections, "database pool created");
	Ok(pool)
}

/// [`JobDataStore`] backed by a `job_data` table.
#[derive(Clone)]
pub struct SqliteJobDataStore {
	pool: SqlitePool,
}

impl SqliteJobDataStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Open the configured database and make sure the schema exists.
	pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
		let pool = create_pool(&config.url, config.max_connections).await?;
		let store = Self::new(pool);
		store.migrate().await?;
		Ok(store)
	}

	#[tracing::instrument(skip(self))]
	pub async fn migrate(&self) -> Result<()> {
		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS job_data (
				scope TEXT NOT NULL,
				owner TEXT NOT NULL,
				key TEXT NOT NULL,
				value TEXT NOT NULL,
				updated_at TEXT NOT NULL,
				PRIMARY KEY (scope, owner, key)
			)
			"#,
		)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}

fn now_rfc3339() -> String {
	Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[async_trait]
impl JobDataStore for SqliteJobDataStore {
	#[tracing::instrument(skip(self), fields(scope = scope.kind(), owner = %scope.owner()))]
	async fn get(&self, scope: &DataScope, key: &str) -> Result<Option<String>> {
		let value = sqlx::query_scalar::<_, String>(
			"SELECT value FROM job_data WHERE scope = ? AND owner = ? AND key = ?",
		)
		.bind(scope.kind())
		.bind(scope.owner())
		.bind(key)
		.fetch_optional(&self.pool)
		.await?;

		Ok(value)
	}

	#[tracing::instrument(skip(self, value), fields(scope = scope.kind(), owner = %scope.owner()))]
	async fn put(&self, scope: &DataScope, key: &str, value: &str) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO job_data (scope, owner, key, value, updated_at)
			VALUES (?, ?, ?, ?, ?)
			ON CONFLICT(scope, owner, key) DO UPDATE SET
				value = excluded.value,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(scope.kind())
		.bind(scope.owner())
		.bind(key)
		.bind(value)
		.bind(now_rfc3339())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self), fields(scope = scope.kind(), owner = %scope.owner()))]
	async fn remove(&self, scope: &DataScope, key: &str) -> Result<()> {
		sqlx::query("DELETE FROM job_data WHERE scope = ? AND owner = ? AND key = ?")
			.bind(scope.kind())
			.bind(scope.owner())
			.bind(key)
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self), fields(scope = scope.kind(), owner = %scope.owner()))]
	async fn load(&self, scope: &DataScope) -> Result<DataMap> {
		let rows = sqlx::query_as::<_, (String, String)>(
			"SELECT key, value FROM job_data WHERE scope = ? AND owner = ?",
		)
		.bind(scope.kind())
		.bind(scope.owner())
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().collect())
	}

	#[tracing::instrument(skip(self, data), fields(scope = scope.kind(), owner = %scope.owner(), keys = data.len()))]
	async fn replace(&self, scope: &DataScope, data: &DataMap) -> Result<()> {
		let now = now_rfc3339();
		let mut tx = self.pool.begin().await?;

		sqlx::query("DELETE FROM job_data WHERE scope = ? AND owner = ?")
			.bind(scope.kind())
			.bind(scope.owner())
			.execute(&mut *tx)
			.await?;

		for (key, value) in data {
			sqlx::query(
				"INSERT INTO job_data (scope, owner, key, value, updated_at) VALUES (?, ?, ?, ?, ?)",
			)
			.bind(scope.kind())
			.bind(scope.owner())
			.bind(key)
			.bind(value)
			.bind(&now)
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{JobKey, TriggerKey};

	async fn setup_store() -> SqliteJobDataStore {
		let pool = create_pool("sqlite::memory:", 1).await.unwrap();
		let store = SqliteJobDataStore::new(pool);
		store.migrate().await.unwrap();
		store
	}

	#[tokio::test]
	async fn test_put_overwrites() {
		let store = setup_store().await;
		let scope = DataScope::Job(JobKey::named("nightly"));

		store.put(&scope, "circuit.breaker", "{}").await.unwrap();
		store.put(&scope, "circuit.breaker", "{\"a\":1}").await.unwrap();

		assert_eq!(
			store.get(&scope, "circuit.breaker").await.unwrap().as_deref(),
			Some("{\"a\":1}")
		);
	}

	#[tokio::test]
	async fn test_remove_missing_key_is_ok() {
		let store = setup_store().await;
		let scope = DataScope::Job(JobKey::named("nightly"));
		store.remove(&scope, "last.fail.disk").await.unwrap();
		assert_eq!(store.get(&scope, "last.fail.disk").await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_scopes_do_not_collide() {
		let store = setup_store().await;
		let job = DataScope::Job(JobKey::named("same"));
		let trigger = DataScope::Trigger(TriggerKey::named("same"));

		store.put(&job, "k", "job").await.unwrap();
		store.put(&trigger, "k", "trigger").await.unwrap();

		assert_eq!(store.get(&job, "k").await.unwrap().as_deref(), Some("job"));
		assert_eq!(
			store.get(&trigger, "k").await.unwrap().as_deref(),
			Some("trigger")
		);
	}

	#[tokio::test]
	async fn test_replace_and_load() {
		let store = setup_store().await;
		let scope = DataScope::Trigger(TriggerKey::named("nightly"));
		store.put(&scope, "stale", "1").await.unwrap();

		let mut data = DataMap::new();
		data.insert("retry.span".to_string(), "30".to_string());
		data.insert("retry.max".to_string(), "3".to_string());
		store.replace(&scope, &data).await.unwrap();

		assert_eq!(store.load(&scope).await.unwrap(), data);
	}

	#[tokio::test]
	async fn test_migrate_is_idempotent() {
		let store = setup_store().await;
		store.migrate().await.unwrap();
	}
}
