//! Distributed task-type locking
//!
//! Cooperating engine processes use this module to serialize work that is
//! scoped by a task type (e.g. a per-tenant quota sync). At most one engine
//! holds the lock for a task type at a time; a holder that died without
//! releasing can be displaced by a forced takeover.
//!
//! # Architecture
//!
//! - **Coordinator**: `LockCoordinator` runs the acquire protocol (attempt,
//!   bounded retries at a fixed interval, optional steal) and release
//! - **Store contract**: `LockStore`, the atomic acquire/steal/release
//!   register the coordinator depends on
//! - **In-memory store**: `InMemoryLockStore`, a reference `LockStore`
//! - **Context**: `RequestContext` carries request id, store session and
//!   cancellation
//!
//! # Example
//!
//! ```ignore
//! use synclock_core::domain::locking::{
//!     AcquireRequest, InMemoryLockStore, LockCoordinator, RequestContext, RetryPolicy,
//! };
//!
//! let coordinator = LockCoordinator::new(Arc::new(InMemoryLockStore::new()), RetryPolicy::default());
//! let ctx = RequestContext::new();
//!
//! let request = AcquireRequest::new(engine_id, "quota_sync").forced(true);
//! if coordinator.acquire_lock(&ctx, &request).await?.acquired {
//!     // ... run the job ...
//!     coordinator.release_lock(&ctx, engine_id, "quota_sync").await?;
//! }
//! ```

pub mod context;
pub mod coordinator;
pub mod event;
pub mod memory;
pub mod store;
pub mod types;

// Re-export main types
pub use context::RequestContext;
pub use coordinator::LockCoordinator;
pub use event::{LockEvent, LockEventType};
pub use memory::{InMemoryLockStore, ReleasePolicy};
pub use store::LockStore;
pub use types::{
    AcquireOutcome, AcquireReason, AcquireRequest, LockError, LockRecord, LockResult,
    RetryPolicy, StoreOperation, local_holder_identity,
};
