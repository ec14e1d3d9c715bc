pub mod message;
pub mod room;

pub use message::Message;
pub use room::{NewRoom, Room};
