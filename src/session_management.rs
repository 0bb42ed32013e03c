//! Session management core module.
//!
//! This module provides the session identifier and record types together with
//! the session store contract and its backends.

/// Submodule for the file-backed session store.
pub mod file_store;
/// Submodule for the in-memory session store.
pub mod memory_store;
/// Submodule for the Redis-backed session store.
pub mod redis_store;
/// Submodule for session data structures and utilities.
pub mod session;
/// Submodule for the session store contract.
pub mod session_store;

pub use file_store::FileSessionStore;
pub use memory_store::MemorySessionStore;
pub use redis_store::RedisSessionStore;
pub use session::{SessionId, SessionRecord};
pub use session_store::SessionStore;
