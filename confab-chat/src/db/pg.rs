use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, query, query_as, Error as SqlxError, FromRow, PgPool};

use crate::{
    Database, DatabaseError, DatabaseResult, IntoDatabaseError, MessageData, NewMessage,
    NewSession, NewUser, PrimaryKey, Result, SessionData, UserData,
};

/// A postgres database implementation for confab
pub struct PgDatabase {
    pool: PgPool,
}

/// Queries are bound at runtime so the crate builds without a live database.
/// Each row type mirrors the columns its query selects.
#[derive(FromRow)]
struct UserRow {
    id: PrimaryKey,
    username: String,
    email: String,
    password: String,
}

#[derive(FromRow)]
struct SessionRow {
    id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    email: String,
    password: String,
}

#[derive(FromRow)]
struct MessageRow {
    id: PrimaryKey,
    room: String,
    text: String,
    nonce: Option<String>,
    sent_at: DateTime<Utc>,
    sender_id: PrimaryKey,
    username: String,
    email: String,
    password: String,
}

impl From<UserRow> for UserData {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password: row.password,
        }
    }
}

impl From<SessionRow> for SessionData {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: UserData {
                id: row.user_id,
                username: row.username,
                email: row.email,
                password: row.password,
            },
        }
    }
}

impl From<MessageRow> for MessageData {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            room: row.room,
            text: row.text,
            nonce: row.nonce,
            sent_at: row.sent_at,
            sender: UserData {
                id: row.sender_id,
                username: row.username,
                email: row.email,
                password: row.password,
            },
        }
    }
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    async fn message_by_id(&self, message_id: PrimaryKey) -> Result<MessageData> {
        let row: MessageRow = query_as(
            "SELECT
                messages.id,
                messages.room,
                messages.text,
                messages.nonce,
                messages.sent_at,
                messages.sender_id,
                users.username,
                users.email,
                users.password
            FROM messages
                INNER JOIN users ON messages.sender_id = users.id
            WHERE messages.id = $1",
        )
        .bind(message_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("message", "id"))?;

        Ok(row.into())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        let row: UserRow = query_as("SELECT id, username, email, password FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))?;

        Ok(row.into())
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        let row: UserRow =
            query_as("SELECT id, username, email, password FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| e.not_found_or("user", "email"))?;

        Ok(row.into())
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        let row: UserRow =
            query_as("SELECT id, username, email, password FROM users WHERE username = $1")
                .bind(username)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| e.not_found_or("user", "username"))?;

        Ok(row.into())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;

        self.user_by_email(&new_user.email)
            .await
            .conflict_or_ok("user", "email", &new_user.email)?;

        let row: UserRow = query_as(
            "INSERT INTO users (username, email, password)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password",
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(row.into())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row: SessionRow = query_as(
            "SELECT
                sessions.id,
                sessions.token,
                sessions.expires_at,
                sessions.user_id,
                users.username,
                users.email,
                users.password
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "token"))?;

        Ok(row.into())
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        let record: (String,) = query_as(
            "INSERT INTO sessions (token, user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING token",
        )
        .bind(&new_session.token)
        .bind(new_session.user_id)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.session_by_token(&record.0).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        // Ensure session exists
        let _ = self.session_by_token(token).await?;

        query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        query("DELETE FROM sessions WHERE now() > expires_at")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData> {
        // Ensure the sender exists before inserting
        let _ = self.user_by_id(new_message.sender_id).await?;

        let record: (PrimaryKey,) = query_as(
            "INSERT INTO messages (room, text, nonce, sender_id, sent_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id",
        )
        .bind(&new_message.room)
        .bind(&new_message.text)
        .bind(&new_message.nonce)
        .bind(new_message.sender_id)
        .bind(new_message.sent_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.message_by_id(record.0).await
    }

    async fn recent_messages(&self, room: &str, limit: usize) -> Result<Vec<MessageData>> {
        let rows: Vec<MessageRow> = query_as(
            "SELECT
                messages.id,
                messages.room,
                messages.text,
                messages.nonce,
                messages.sent_at,
                messages.sender_id,
                users.username,
                users.email,
                users.password
            FROM messages
                INNER JOIN users ON messages.sender_id = users.id
            WHERE messages.room = $1
            ORDER BY messages.sent_at DESC, messages.id DESC
            LIMIT $2",
        )
        .bind(room)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let mut messages: Vec<MessageData> = rows.into_iter().map(Into::into).collect();
        messages.reverse();

        Ok(messages)
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
