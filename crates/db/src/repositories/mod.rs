pub mod message_repo;
pub mod room_repo;

pub use message_repo::MessageRepo;
pub use room_repo::RoomRepo;
