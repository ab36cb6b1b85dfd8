//! Lock types and error definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::LockConfig;

/// Result type for lock operations
pub type LockResult<T> = std::result::Result<T, LockError>;

/// Lock errors
///
/// Contention is never an error: a lock held by someone else surfaces as an
/// unsuccessful [`AcquireOutcome`]. These variants are reserved for bad input
/// and for infrastructure failures of the lock store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The acquire or release request was malformed
    #[error("Invalid lock request: {0}")]
    InvalidRequest(String),

    /// The lock store could not be reached
    #[error("Lock store unavailable: {0}")]
    StoreUnavailable(String),

    /// The lock store was reached but the operation failed
    #[error("Lock store {operation} failed for task '{task_type}': {message}")]
    StoreFailure {
        operation: StoreOperation,
        task_type: String,
        message: String,
    },
}

impl LockError {
    /// Get error code for this lock error
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "E310",
            Self::StoreUnavailable(_) => "E311",
            Self::StoreFailure { .. } => "E312",
        }
    }

    /// Whether the failure originated in the store (as opposed to the caller)
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::StoreFailure { .. })
    }
}

/// Store operation named in errors and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    Acquire,
    Steal,
    Release,
}

impl StoreOperation {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Steal => "steal",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request to become the exclusive holder of a task type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireRequest {
    /// Identity of the calling engine instance
    pub holder_identity: String,

    /// Key naming the protected scope
    pub task_type: String,

    /// Escalate to a steal once retries are exhausted
    pub forced: bool,
}

impl AcquireRequest {
    /// Create a non-forced request
    pub fn new(holder_identity: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            holder_identity: holder_identity.into(),
            task_type: task_type.into(),
            forced: false,
        }
    }

    /// Set whether the request may steal the lock after retries
    pub fn forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }

    /// Reject empty identities and task types
    pub fn validate(&self) -> LockResult<()> {
        validate_key("holder identity", &self.holder_identity)?;
        validate_key("task type", &self.task_type)
    }
}

pub(crate) fn validate_key(what: &str, value: &str) -> LockResult<()> {
    if value.trim().is_empty() {
        return Err(LockError::InvalidRequest(format!("{} must not be empty", what)));
    }
    Ok(())
}

/// Default number of retries after the first failed attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default wait between attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Bounded-attempts-with-fixed-interval policy for the acquire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the initial failed acquire
    pub max_retries: u32,

    /// Wait between attempts
    pub retry_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_retries: u32, retry_interval: Duration) -> Self {
        Self {
            max_retries,
            retry_interval,
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Set the retry count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the retry interval
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Upper bound on store calls one acquire may issue
    pub fn max_store_calls(&self, forced: bool) -> u32 {
        self.max_retries
            .saturating_add(1)
            .saturating_add(u32::from(forced))
    }
}

impl From<&LockConfig> for RetryPolicy {
    fn from(config: &LockConfig) -> Self {
        Self::new(
            config.lock_retry_times,
            Duration::from_secs(config.lock_retry_interval),
        )
    }
}

/// Why an acquire call ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireReason {
    /// First attempt succeeded
    Acquired,
    /// A retry succeeded
    AcquiredOnRetry,
    /// Forced takeover succeeded
    Stolen,
    /// Retries exhausted and takeover not requested
    Contended,
    /// Takeover was refused by the store
    StealRejected,
    /// The request context was cancelled while waiting
    Cancelled,
}

impl AcquireReason {
    /// Whether this reason means the caller now holds the lock
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired | Self::AcquiredOnRetry | Self::Stolen)
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquired => "acquired",
            Self::AcquiredOnRetry => "acquired_on_retry",
            Self::Stolen => "stolen",
            Self::Contended => "contended",
            Self::StealRejected => "steal_rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AcquireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured result of one acquire call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireOutcome {
    /// Whether the caller now holds the lock
    pub acquired: bool,

    /// How the call ended
    pub reason: AcquireReason,

    /// Number of store `acquire` calls made
    pub acquire_attempts: u32,

    /// Whether a store `steal` call was made
    pub steal_attempted: bool,
}

impl AcquireOutcome {
    pub(crate) fn new(reason: AcquireReason, acquire_attempts: u32, steal_attempted: bool) -> Self {
        Self {
            acquired: reason.is_acquired(),
            reason,
            acquire_attempts,
            steal_attempted,
        }
    }

    /// Total store calls made by the acquire protocol
    pub fn store_calls(&self) -> u32 {
        self.acquire_attempts + u32::from(self.steal_attempted)
    }
}

/// A lock as recorded by a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Key naming the protected scope
    pub task_type: String,

    /// Engine currently owning the lock
    pub holder_identity: String,

    /// When the current holder obtained the lock
    pub acquired_at: DateTime<Utc>,
}

impl LockRecord {
    /// Create a record acquired now
    pub fn new(task_type: impl Into<String>, holder_identity: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            holder_identity: holder_identity.into(),
            acquired_at: Utc::now(),
        }
    }

    /// How long the current holder has owned the lock
    pub fn age(&self) -> Duration {
        (Utc::now() - self.acquired_at).to_std().unwrap_or_default()
    }

    /// Check if the record is held by the given engine
    pub fn is_held_by(&self, holder_identity: &str) -> bool {
        self.holder_identity == holder_identity
    }
}

/// Build a holder identity for the current process
///
/// Format: `<hostname>:<pid>:<8 hex chars>`. The random suffix keeps two
/// coordinators in the same process distinct.
pub fn local_holder_identity() -> String {
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}:{}:{}", host, std::process::id(), &suffix[..8])
}
