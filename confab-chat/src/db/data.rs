use chrono::{DateTime, Utc};

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A confab account
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    pub email: String,
    /// The argon2 hash, never the plain text
    pub password: String,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// A chat message, bound by name to the room it was sent in
#[derive(Debug, Clone)]
pub struct MessageData {
    pub id: PrimaryKey,
    pub room: String,
    pub text: String,
    /// Client-chosen reconciliation id, echoed back in the relay so the
    /// sender can match it against its optimistic copy
    pub nonce: Option<String>,
    /// Assigned when the server processes the send, not when the client
    /// composed the message
    pub sent_at: DateTime<Utc>,
    pub sender: UserData,
}

#[cfg(test)]
impl UserData {
    pub fn mock(id: PrimaryKey, username: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "hash".to_string(),
        }
    }
}
