//! Lock coordinator
//!
//! Drives the acquire protocol against a [`LockStore`]:
//! 1. one immediate attempt
//! 2. up to `max_retries` further attempts, each after a fixed, cancellable wait
//! 3. optionally a single forced takeover once retries are exhausted
//!
//! Contention is reported through [`AcquireOutcome`]; only store failures
//! and malformed requests are errors. Store failures are never retried here.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::context::RequestContext;
use super::event::LockEvent;
use super::store::LockStore;
use super::types::{
    AcquireOutcome, AcquireReason, AcquireRequest, LockError, LockResult, RetryPolicy,
    StoreOperation, validate_key,
};
use crate::config::LockConfig;
use crate::domain::events::EventPublisher;

/// Coordinates lock acquisition and release for one engine process
#[derive(Clone)]
pub struct LockCoordinator {
    /// Store holding the authoritative lock records
    store: Arc<dyn LockStore>,

    /// Policy used when the caller does not pass one
    policy: RetryPolicy,

    /// Optional sink for protocol events
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("policy", &self.policy)
            .field("publisher", &self.publisher.is_some())
            .finish_non_exhaustive()
    }
}

impl LockCoordinator {
    /// Create a coordinator with an explicit retry policy
    pub fn new(store: Arc<dyn LockStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            publisher: None,
        }
    }

    /// Create a coordinator whose policy comes from the `[locks]` config section
    pub fn from_config(store: Arc<dyn LockStore>, config: &LockConfig) -> Self {
        Self::new(store, RetryPolicy::from(config))
    }

    /// Publish protocol events to `publisher`
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Default retry policy
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    /// Acquire a lock using the coordinator's retry policy
    pub async fn acquire_lock(
        &self,
        ctx: &RequestContext,
        request: &AcquireRequest,
    ) -> LockResult<AcquireOutcome> {
        self.acquire_lock_with_policy(ctx, request, self.policy).await
    }

    /// Make exactly one acquire attempt: no retries, no takeover
    pub async fn try_acquire_lock(
        &self,
        ctx: &RequestContext,
        holder_identity: &str,
        task_type: &str,
    ) -> LockResult<AcquireOutcome> {
        let request = AcquireRequest::new(holder_identity, task_type);
        self.acquire_lock_with_policy(ctx, &request, RetryPolicy::no_retry())
            .await
    }

    /// Acquire a lock with a per-call retry policy
    ///
    /// Issues at most `policy.max_store_calls(request.forced)` store calls.
    pub async fn acquire_lock_with_policy(
        &self,
        ctx: &RequestContext,
        request: &AcquireRequest,
        policy: RetryPolicy,
    ) -> LockResult<AcquireOutcome> {
        request.validate()?;

        let holder = request.holder_identity.as_str();
        let task_type = request.task_type.as_str();
        let request_id = ctx.request_id();

        info!(
            holder = %holder,
            task_type = %task_type,
            forced = request.forced,
            %request_id,
            "Trying to acquire lock"
        );
        self.emit(LockEvent::acquire_attempt(request_id, task_type, holder, request.forced))
            .await;

        let mut attempts = 1;
        if self.store_acquire(ctx, task_type, holder).await? {
            return Ok(self
                .finish_acquired(ctx, request, AcquireReason::Acquired, attempts, false)
                .await);
        }

        let mut retries_left = policy.max_retries;
        while retries_left > 0 {
            if !wait_for_retry(ctx, policy.retry_interval).await {
                return Ok(self.finish_cancelled(ctx, request, attempts).await);
            }

            retries_left -= 1;
            attempts = attempts.saturating_add(1);
            info!(
                holder = %holder,
                task_type = %task_type,
                attempt = attempts,
                retries_left,
                "Retrying lock acquire"
            );
            self.emit(LockEvent::acquire_retry(
                request_id,
                task_type,
                holder,
                attempts,
                retries_left,
            ))
            .await;

            if self.store_acquire(ctx, task_type, holder).await? {
                return Ok(self
                    .finish_acquired(ctx, request, AcquireReason::AcquiredOnRetry, attempts, false)
                    .await);
            }
        }

        if !request.forced {
            return Ok(self
                .finish_failed(ctx, request, AcquireReason::Contended, attempts, false)
                .await);
        }

        // Cancellation also covers the takeover step
        if ctx.is_cancelled() {
            return Ok(self.finish_cancelled(ctx, request, attempts).await);
        }

        warn!(
            holder = %holder,
            task_type = %task_type,
            attempts,
            "Retries exhausted, attempting forced takeover"
        );
        self.emit(LockEvent::steal_attempt(request_id, task_type, holder))
            .await;

        let stolen = self
            .store
            .steal(ctx, task_type, holder)
            .await
            .inspect_err(|e| log_store_error(StoreOperation::Steal, task_type, holder, e))?;

        if stolen {
            Ok(self
                .finish_acquired(ctx, request, AcquireReason::Stolen, attempts, true)
                .await)
        } else {
            Ok(self
                .finish_failed(ctx, request, AcquireReason::StealRejected, attempts, true)
                .await)
        }
    }

    /// Release a lock
    ///
    /// A single call-through to the store; its answer is returned unchanged.
    /// Ownership is not checked here, the store receives the holder and
    /// decides.
    pub async fn release_lock(
        &self,
        ctx: &RequestContext,
        holder_identity: &str,
        task_type: &str,
    ) -> LockResult<bool> {
        validate_key("holder identity", holder_identity)?;
        validate_key("task type", task_type)?;

        info!(
            holder = %holder_identity,
            task_type = %task_type,
            request_id = %ctx.request_id(),
            "Releasing acquired lock"
        );
        self.emit(LockEvent::releasing(ctx.request_id(), task_type, holder_identity))
            .await;

        let released = self
            .store
            .release(ctx, task_type, holder_identity)
            .await
            .inspect_err(|e| {
                log_store_error(StoreOperation::Release, task_type, holder_identity, e)
            })?;

        if !released {
            debug!(
                holder = %holder_identity,
                task_type = %task_type,
                "Store released nothing"
            );
        }
        Ok(released)
    }

    // ========== Internal Methods ==========

    async fn store_acquire(
        &self,
        ctx: &RequestContext,
        task_type: &str,
        holder: &str,
    ) -> LockResult<bool> {
        self.store
            .acquire(ctx, task_type, holder)
            .await
            .inspect_err(|e| log_store_error(StoreOperation::Acquire, task_type, holder, e))
    }

    async fn finish_acquired(
        &self,
        ctx: &RequestContext,
        request: &AcquireRequest,
        reason: AcquireReason,
        attempts: u32,
        steal_attempted: bool,
    ) -> AcquireOutcome {
        info!(
            holder = %request.holder_identity,
            task_type = %request.task_type,
            reason = %reason,
            attempts,
            "Lock acquired"
        );
        self.emit(LockEvent::lock_acquired(
            ctx.request_id(),
            &request.task_type,
            &request.holder_identity,
            reason,
        ))
        .await;
        AcquireOutcome::new(reason, attempts, steal_attempted)
    }

    async fn finish_failed(
        &self,
        ctx: &RequestContext,
        request: &AcquireRequest,
        reason: AcquireReason,
        attempts: u32,
        steal_attempted: bool,
    ) -> AcquireOutcome {
        error!(
            holder = %request.holder_identity,
            task_type = %request.task_type,
            reason = %reason,
            attempts,
            "Not able to acquire lock with retry"
        );
        self.emit(LockEvent::acquire_failed(
            ctx.request_id(),
            &request.task_type,
            &request.holder_identity,
            reason,
            attempts,
        ))
        .await;
        AcquireOutcome::new(reason, attempts, steal_attempted)
    }

    async fn finish_cancelled(
        &self,
        ctx: &RequestContext,
        request: &AcquireRequest,
        attempts: u32,
    ) -> AcquireOutcome {
        warn!(
            holder = %request.holder_identity,
            task_type = %request.task_type,
            attempts,
            "Lock acquire cancelled"
        );
        self.emit(LockEvent::acquire_cancelled(
            ctx.request_id(),
            &request.task_type,
            &request.holder_identity,
            attempts,
        ))
        .await;
        AcquireOutcome::new(AcquireReason::Cancelled, attempts, false)
    }

    async fn emit(&self, event: LockEvent) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        if let Err(e) = publisher.publish(&event).await {
            warn!(
                event_type = %event.event_type,
                task_type = %event.task_type,
                error = %e,
                "Failed to publish lock event"
            );
        }
    }
}

/// Wait out one retry interval
///
/// Returns `false` if the context is (or becomes) cancelled first.
async fn wait_for_retry(ctx: &RequestContext, interval: Duration) -> bool {
    let token = ctx.cancellation_token();
    if token.is_cancelled() {
        return false;
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = sleep(interval) => true,
    }
}

fn log_store_error(operation: StoreOperation, task_type: &str, holder: &str, e: &LockError) {
    error!(
        operation = %operation,
        task_type = %task_type,
        holder = %holder,
        code = e.code(),
        error = %e,
        "Lock store call failed"
    );
}
