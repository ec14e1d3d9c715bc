//! Real-time delivery plumbing.
//!
//! - [`TopicHub`]: this process's live connections and their topics.
//! - [`Backplane`]: cross-process topic fan-out ([`LocalBackplane`],
//!   [`RedisBackplane`]).
//! - [`EventBus`]: in-process bus for operational [`SystemEvent`]s.

pub mod backplane;
pub mod bus;
pub mod hub;
pub mod topic;

pub use backplane::{Backplane, BackplaneError, LocalBackplane, RedisBackplane};
pub use bus::{EventBus, SystemEvent};
pub use hub::{Frame, FrameReceiver, FrameSender, TopicHub};
pub use topic::{Envelope, OutboundEvent, Topic};
