//! Synclock Core Library
//!
//! This crate provides the core functionality for Synclock, including:
//! - Lock coordinator (acquire with bounded retries and forced takeover, release)
//! - Lock store contract and an in-memory reference store
//! - Lock protocol events
//! - Configuration (`[locks]` retry settings)

pub mod config;
pub mod domain;
pub mod error;


pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::locking::{
        AcquireOutcome, AcquireReason, AcquireRequest, InMemoryLockStore, LockCoordinator,
        LockError, LockStore, RequestContext, RetryPolicy,
    };
    pub use crate::error::{Error, Result};
}
