//! Request-scoped context passed through to the lock store

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Request-scoped data for one acquire or release call
///
/// The coordinator only looks at the cancellation token; the request id and
/// session token are for the store (tracing, transaction handles).
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    session: Option<String>,
    cancel: CancellationToken,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Create a context with a fresh request id and its own cancellation token
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            session: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a context that is cancelled whenever `parent` is
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            cancel: parent.child_token(),
            ..Self::new()
        }
    }

    /// Attach a store session token
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Request id for correlating store calls
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Store session token, if any
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Cancellation token observed during retry waits
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel this context (and any children)
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check whether the context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_defaults() {
        let ctx = RequestContext::new();
        assert!(ctx.session().is_none());
        assert!(!ctx.is_cancelled());
        assert_ne!(ctx.request_id(), RequestContext::new().request_id());
    }

    #[test]
    fn test_context_session() {
        let ctx = RequestContext::new().with_session("txn-42");
        assert_eq!(ctx.session(), Some("txn-42"));
    }

    #[test]
    fn test_child_context_follows_parent() {
        let shutdown = CancellationToken::new();
        let ctx = RequestContext::child_of(&shutdown);
        assert!(!ctx.is_cancelled());

        shutdown.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_cancelling_child_leaves_parent() {
        let shutdown = CancellationToken::new();
        let ctx = RequestContext::child_of(&shutdown);
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert!(!shutdown.is_cancelled());
    }

    #[test]
    fn test_clones_share_cancellation() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();
        ctx.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(ctx.request_id(), clone.request_id());
    }
}
