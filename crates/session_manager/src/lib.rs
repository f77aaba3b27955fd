//! # Session Manager
//!
//! Keeps one conversational session per user: current state, variable
//! bindings, flagged error conditions and last activity. Sessions live in a
//! sharded in-memory store with a lock per user, are evicted by a periodic
//! sweep once idle for too long, and can optionally be mirrored to a
//! [`SessionStorage`] backend.

pub mod error;
pub mod storage;
pub mod store;
pub mod structs;
pub mod sweeper;

// Re-exports
pub use error::SessionError;
pub use storage::{FileSessionStorage, SessionStorage};
pub use store::{SessionHandle, SessionStore};
pub use structs::{UserSession, VariableMap};
pub use sweeper::spawn_sweeper;
