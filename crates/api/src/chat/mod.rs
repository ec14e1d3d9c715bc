//! Chat event routing: per-connection sessions and the orchestrator that
//! validates inbound events, updates presence and storage, and publishes
//! outbound events through the backplane.

mod router;
mod session;

pub use router::EventRouter;
pub use session::{ChatSession, Identity, SessionState};
