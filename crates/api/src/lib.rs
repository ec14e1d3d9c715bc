//! Bazaar chat server library.
//!
//! Exposes the building blocks (config, state, error handling, routes, the
//! chat event router and WebSocket infrastructure) so integration tests and
//! the binary entrypoint can both access them.

pub mod chat;
pub mod config;
pub mod error;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
