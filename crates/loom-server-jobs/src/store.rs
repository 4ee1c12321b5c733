// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable string-keyed data maps attached to jobs and triggers.
//!
//! Circuit breaker metadata and fail-span timestamps live here. Writes are
//! last-writer-wins; concurrent firings of one job may race on a key.

use async_trait::async_trait;
use loom_jobs_core::DataMap;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::Result;
use crate::types::{JobKey, TriggerKey};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataScope {
	Job(JobKey),
	Trigger(TriggerKey),
}

impl DataScope {
	pub fn kind(&self) -> &'static str {
		match self {
			DataScope::Job(_) => "job",
			DataScope::Trigger(_) => "trigger",
		}
	}

	pub fn owner(&self) -> String {
		match self {
			DataScope::Job(key) => key.to_string(),
			DataScope::Trigger(key) => key.to_string(),
		}
	}
}

#[async_trait]
pub trait JobDataStore: Send + Sync {
	async fn get(&self, scope: &DataScope, key: &str) -> Result<Option<String>>;

	async fn put(&self, scope: &DataScope, key: &str, value: &str) -> Result<()>;

	async fn remove(&self, scope: &DataScope, key: &str) -> Result<()>;

	async fn load(&self, scope: &DataScope) -> Result<DataMap>;

	/// Replace the whole map of `scope` with `data`.
	async fn replace(&self, scope: &DataScope, data: &DataMap) -> Result<()>;
}

/// Process-local store for tests and single-node deployments without a database.
#[derive(Default)]
pub struct InMemoryJobDataStore {
	maps: RwLock<HashMap<DataScope, DataMap>>,
}

impl InMemoryJobDataStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl JobDataStore for InMemoryJobDataStore {
	async fn get(&self, scope: &DataScope, key: &str) -> Result<Option<String>> {
		Ok(self
			.maps
			.read()
			.get(scope)
			.and_then(|map| map.get(key).cloned()))
	}

	async fn put(&self, scope: &DataScope, key: &str, value: &str) -> Result<()> {
		self
			.maps
			.write()
			.entry(scope.clone())
			.or_default()
			.insert(key.to_string(), value.to_string());
		Ok(())
	}

	async fn remove(&self, scope: &DataScope, key: &str) -> Result<()> {
		if let Some(map) = self.maps.write().get_mut(scope) {
			map.remove(key);
		}
		Ok(())
	}

	async fn load(&self, scope: &DataScope) -> Result<DataMap> {
		Ok(self.maps.read().get(scope).cloned().unwrap_or_default())
	}

	async fn replace(&self, scope: &DataScope, data: &DataMap) -> Result<()> {
		self.maps.write().insert(scope.clone(), data.clone());
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn job_scope() -> DataScope {
		DataScope::Job(JobKey::named("nightly"))
	}

	#[tokio::test]
	async fn test_put_get_remove() {
		let store = InMemoryJobDataStore::new();
		let scope = job_scope();
		assert_eq!(store.get(&scope, "a").await.unwrap(), None);

		store.put(&scope, "a", "1").await.unwrap();
		assert_eq!(store.get(&scope, "a").await.unwrap().as_deref(), Some("1"));

		store.remove(&scope, "a").await.unwrap();
		assert_eq!(store.get(&scope, "a").await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_scopes_are_isolated() {
		let store = InMemoryJobDataStore::new();
		let job = job_scope();
		let trigger = DataScope::Trigger(TriggerKey::named("nightly"));

		store.put(&job, "k", "job").await.unwrap();
		store.put(&trigger, "k", "trigger").await.unwrap();

		assert_eq!(store.get(&job, "k").await.unwrap().as_deref(), Some("job"));
		assert_eq!(
			store.get(&trigger, "k").await.unwrap().as_deref(),
			Some("trigger")
		);
	}

	#[tokio::test]
	async fn test_replace_drops_old_keys() {
		let store = InMemoryJobDataStore::new();
		let scope = job_scope();
		store.put(&scope, "old", "x").await.unwrap();

		let mut data = DataMap::new();
		data.insert("new".to_string(), "y".to_string());
		store.replace(&scope, &data).await.unwrap();

		assert_eq!(store.load(&scope).await.unwrap(), data);
	}
}
