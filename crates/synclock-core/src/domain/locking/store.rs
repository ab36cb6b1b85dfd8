//! Lock store contract
//!
//! The coordinator never decides ownership itself. Every transition goes
//! through one of the three atomic operations below, keyed by task type, and
//! the boolean they return is authoritative.
//!
//! Return conventions shared by all operations:
//! - `Ok(true)` - the transition happened
//! - `Ok(false)` - contention, or the store's own policy refused it
//! - `Err(_)` - the store is unreachable or its transaction failed
//!
//! Implementations must be safe to call concurrently from many coordinators
//! without external locking, and a failed call must not leave the store
//! recording the caller as owner.

use async_trait::async_trait;

use super::context::RequestContext;
use super::types::LockResult;

/// Durable keyed register of lock holders
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Install `holder` as owner of `task_type` iff there is no current owner
    async fn acquire(&self, ctx: &RequestContext, task_type: &str, holder: &str)
    -> LockResult<bool>;

    /// Reassign `task_type` to `holder` regardless of the current owner
    ///
    /// The store may apply staleness checks (e.g. minimum lock age) and
    /// return `Ok(false)` when they fail.
    async fn steal(&self, ctx: &RequestContext, task_type: &str, holder: &str)
    -> LockResult<bool>;

    /// Clear the record for `task_type`
    ///
    /// `holder` is the caller's identity so the store can verify ownership.
    /// Must be safe when nothing is held.
    async fn release(&self, ctx: &RequestContext, task_type: &str, holder: &str)
    -> LockResult<bool>;
}
