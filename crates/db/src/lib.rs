//! Durable storage for rooms and messages.
//!
//! - [`ChatStore`]: the keyed store contract the services are written
//!   against, with [`PgChatStore`] (Postgres via sqlx) and
//!   [`MemoryChatStore`] implementations.
//! - [`RoomStore`]: idempotent room creation and counter updates.
//! - [`MessageStore`]: message insert plus room bookkeeping.

pub mod memory;
pub mod messages;
pub mod models;
pub mod pg;
pub mod repositories;
pub mod rooms;
pub mod store;

use sqlx::postgres::PgPoolOptions;

pub use memory::MemoryChatStore;
pub use messages::{MessageStore, PersistOutcome};
pub use pg::PgChatStore;
pub use rooms::RoomStore;
pub use store::{ChatStore, StoreError};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
