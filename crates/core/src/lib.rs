//! Domain building blocks for the bazaar chat backbone.
//!
//! This crate has no infrastructure dependencies so that the store, presence,
//! backplane, and API crates can all share the same identities, room keys,
//! and wire protocol.

pub mod error;
pub mod protocol;
pub mod room;
pub mod types;
