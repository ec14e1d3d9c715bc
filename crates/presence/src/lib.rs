//! Presence directory: which live connections each user currently has.
//!
//! A user is present while they hold at least one registered handle. The
//! directory reports the present/absent transitions so callers can announce
//! `user joined` / `user left` exactly once per transition, even when the
//! same user connects from several devices or server instances.

mod counter;
mod directory;
mod memory;
mod redis_store;

pub use counter::PresenceCounter;
pub use directory::{PresenceDirectory, PresenceError, Transition};
pub use memory::MemoryPresenceDirectory;
pub use redis_store::RedisPresenceDirectory;
