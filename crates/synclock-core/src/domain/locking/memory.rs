//! In-process lock store
//!
//! Reference implementation of [`LockStore`] backed by a mutex-guarded map.
//! Every operation runs inside one critical section, so two callers can never
//! both observe "no holder" and both succeed. Used by tests and by the CLI
//! simulator; it is not persistent.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::context::RequestContext;
use super::store::LockStore;
use super::types::{LockRecord, LockResult, validate_key};

/// How `release` treats the caller's identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePolicy {
    /// Only the recorded holder may clear the lock
    #[default]
    VerifyHolder,
    /// Clear by key, whoever asks
    KeyOnly,
}

/// In-memory lock store
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    locks: Mutex<HashMap<String, LockRecord>>,
    min_steal_age: Duration,
    release_policy: ReleasePolicy,
}

impl InMemoryLockStore {
    /// Create an empty store that honours every steal and verifies holders on release
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse steals of locks younger than `age`
    pub fn with_min_steal_age(mut self, age: Duration) -> Self {
        self.min_steal_age = age;
        self
    }

    /// Set the release policy
    pub fn with_release_policy(mut self, policy: ReleasePolicy) -> Self {
        self.release_policy = policy;
        self
    }

    /// Current holder of a task type
    pub async fn holder(&self, task_type: &str) -> Option<String> {
        self.locks
            .lock()
            .await
            .get(task_type)
            .map(|record| record.holder_identity.clone())
    }

    /// Full record for a task type
    pub async fn record(&self, task_type: &str) -> Option<LockRecord> {
        self.locks.lock().await.get(task_type).cloned()
    }

    /// Number of held locks
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Whether no lock is held
    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn acquire(
        &self,
        _ctx: &RequestContext,
        task_type: &str,
        holder: &str,
    ) -> LockResult<bool> {
        validate_key("task type", task_type)?;
        validate_key("holder identity", holder)?;

        let mut locks = self.locks.lock().await;
        if let Some(existing) = locks.get(task_type) {
            debug!(
                task_type = %task_type,
                holder = %holder,
                current = %existing.holder_identity,
                "Lock already held"
            );
            return Ok(false);
        }

        locks.insert(task_type.to_string(), LockRecord::new(task_type, holder));
        debug!(task_type = %task_type, holder = %holder, "Lock record created");
        Ok(true)
    }

    async fn steal(&self, _ctx: &RequestContext, task_type: &str, holder: &str) -> LockResult<bool> {
        validate_key("task type", task_type)?;
        validate_key("holder identity", holder)?;

        let mut locks = self.locks.lock().await;
        if let Some(existing) = locks.get(task_type) {
            let age = existing.age();
            if age < self.min_steal_age {
                debug!(
                    task_type = %task_type,
                    holder = %holder,
                    current = %existing.holder_identity,
                    age_ms = age.as_millis(),
                    "Steal refused, lock is not stale"
                );
                return Ok(false);
            }
            debug!(
                task_type = %task_type,
                holder = %holder,
                previous = %existing.holder_identity,
                "Lock stolen"
            );
        }

        locks.insert(task_type.to_string(), LockRecord::new(task_type, holder));
        Ok(true)
    }

    async fn release(
        &self,
        _ctx: &RequestContext,
        task_type: &str,
        holder: &str,
    ) -> LockResult<bool> {
        validate_key("task type", task_type)?;

        let mut locks = self.locks.lock().await;
        let Some(existing) = locks.get(task_type) else {
            debug!(task_type = %task_type, holder = %holder, "Release of unheld lock");
            return Ok(false);
        };

        if self.release_policy == ReleasePolicy::VerifyHolder && !existing.is_held_by(holder) {
            debug!(
                task_type = %task_type,
                holder = %holder,
                current = %existing.holder_identity,
                "Release refused, caller is not the holder"
            );
            return Ok(false);
        }

        locks.remove(task_type);
        debug!(task_type = %task_type, holder = %holder, "Lock record removed");
        Ok(true)
    }
}
