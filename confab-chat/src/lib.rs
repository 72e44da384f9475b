mod auth;
mod db;
mod events;
mod registry;
mod util;

pub mod protocol;

use std::sync::Arc;

pub use auth::*;
pub use db::*;
pub use events::*;
pub use registry::*;
pub use util::Id;

/// The confab chat system, facilitating accounts, message history, and live
/// room traffic.
pub struct Chat {
    database: Arc<dyn Database>,

    pub auth: Auth,
    pub registry: Arc<RoomRegistry>,
}

impl Chat {
    /// The fixed amount of messages returned when fetching a room's history.
    pub const HISTORY_LIMIT: usize = 50;

    pub fn new<Db>(database: Db) -> Self
    where
        Db: Database + 'static,
    {
        let database: Arc<dyn Database> = Arc::new(database);

        Self {
            auth: Auth::new(&database),
            registry: RoomRegistry::new(&database),
            database,
        }
    }

    /// Returns the most recent messages of a room, oldest first, with each
    /// sender resolved.
    pub async fn room_history(&self, room: &str) -> Result<Vec<MessageData>> {
        self.database
            .recent_messages(room, Self::HISTORY_LIMIT)
            .await
    }
}
