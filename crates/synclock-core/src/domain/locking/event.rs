//! Locking domain events
//!
//! Events for tracking each step of the acquire and release protocols.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::AcquireReason;
use crate::domain::events::DomainEvent;

/// Type of lock event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEventType {
    /// First acquire attempt is about to be made
    AcquireAttempt,
    /// A retry attempt is about to be made
    AcquireRetry,
    /// Forced takeover is about to be attempted
    StealAttempt,
    /// The lock was obtained (by acquire or steal)
    LockAcquired,
    /// Retries exhausted (or steal refused) without obtaining the lock
    AcquireFailed,
    /// The request was cancelled while waiting to retry
    AcquireCancelled,
    /// A release is about to be made
    Releasing,
}

impl LockEventType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AcquireAttempt => "acquire_attempt",
            Self::AcquireRetry => "acquire_retry",
            Self::StealAttempt => "steal_attempt",
            Self::LockAcquired => "lock_acquired",
            Self::AcquireFailed => "acquire_failed",
            Self::AcquireCancelled => "acquire_cancelled",
            Self::Releasing => "releasing",
        }
    }
}

impl std::fmt::Display for LockEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A locking domain event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEvent {
    /// Unique event identifier
    pub id: Uuid,
    /// Request this event belongs to
    pub request_id: Uuid,
    /// The task type being locked
    pub task_type: String,
    /// Type of event
    pub event_type: LockEventType,
    /// Event data
    pub data: Option<serde_json::Value>,
    /// When the event occurred
    pub created_at: DateTime<Utc>,
}

impl LockEvent {
    /// Create a new lock event
    pub fn new(
        request_id: Uuid,
        task_type: &str,
        event_type: LockEventType,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            task_type: task_type.to_string(),
            event_type,
            data,
            created_at: Utc::now(),
        }
    }

    /// Create an acquire attempt event
    pub fn acquire_attempt(request_id: Uuid, task_type: &str, holder: &str, forced: bool) -> Self {
        let data = serde_json::json!({
            "request_id": request_id,
            "holder": holder,
            "forced": forced,
        });
        Self::new(request_id, task_type, LockEventType::AcquireAttempt, Some(data))
    }

    /// Create a retry event
    pub fn acquire_retry(
        request_id: Uuid,
        task_type: &str,
        holder: &str,
        attempt: u32,
        retries_left: u32,
    ) -> Self {
        let data = serde_json::json!({
            "request_id": request_id,
            "holder": holder,
            "attempt": attempt,
            "retries_left": retries_left,
        });
        Self::new(request_id, task_type, LockEventType::AcquireRetry, Some(data))
    }

    /// Create a steal attempt event
    pub fn steal_attempt(request_id: Uuid, task_type: &str, holder: &str) -> Self {
        let data = serde_json::json!({
            "request_id": request_id,
            "holder": holder,
        });
        Self::new(request_id, task_type, LockEventType::StealAttempt, Some(data))
    }

    /// Create a lock acquired event
    pub fn lock_acquired(
        request_id: Uuid,
        task_type: &str,
        holder: &str,
        reason: AcquireReason,
    ) -> Self {
        let data = serde_json::json!({
            "request_id": request_id,
            "holder": holder,
            "reason": reason.as_str(),
        });
        Self::new(request_id, task_type, LockEventType::LockAcquired, Some(data))
    }

    /// Create an acquire failed event
    pub fn acquire_failed(
        request_id: Uuid,
        task_type: &str,
        holder: &str,
        reason: AcquireReason,
        attempts: u32,
    ) -> Self {
        let data = serde_json::json!({
            "request_id": request_id,
            "holder": holder,
            "reason": reason.as_str(),
            "attempts": attempts,
        });
        Self::new(request_id, task_type, LockEventType::AcquireFailed, Some(data))
    }

    /// Create an acquire cancelled event
    pub fn acquire_cancelled(request_id: Uuid, task_type: &str, holder: &str, attempts: u32) -> Self {
        let data = serde_json::json!({
            "request_id": request_id,
            "holder": holder,
            "attempts": attempts,
        });
        Self::new(request_id, task_type, LockEventType::AcquireCancelled, Some(data))
    }

    /// Create a releasing event
    pub fn releasing(request_id: Uuid, task_type: &str, holder: &str) -> Self {
        let data = serde_json::json!({
            "request_id": request_id,
            "holder": holder,
        });
        Self::new(request_id, task_type, LockEventType::Releasing, Some(data))
    }
}

impl DomainEvent for LockEvent {
    fn event_type(&self) -> &str {
        self.event_type.as_str()
    }

    fn aggregate_key(&self) -> &str {
        &self.task_type
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}
