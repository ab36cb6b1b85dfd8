//! Domain layer
//!
//! Contains the lock protocol and the event infrastructure it reports through.

pub mod events;
pub mod locking;
