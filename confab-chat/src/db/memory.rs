//! An in-memory [Database] used to exercise auth and the registry in tests
//! without a running postgres instance.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{
    Database, DatabaseError, DatabaseResult, MessageData, NewMessage, NewSession, NewUser,
    PrimaryKey, Result, SessionData, UserData,
};

#[derive(Default)]
pub struct MemoryDatabase {
    users: Mutex<Vec<UserData>>,
    sessions: Mutex<Vec<(PrimaryKey, String, chrono::DateTime<Utc>, PrimaryKey)>>,
    messages: Mutex<Vec<MessageData>>,
    next_id: Mutex<PrimaryKey>,
    /// When set, message writes fail as if the store was unavailable
    message_failure: AtomicBool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_message_writes(&self, fail: bool) {
        self.message_failure.store(fail, Ordering::SeqCst);
    }

    fn next_id(&self) -> PrimaryKey {
        let mut next_id = self.next_id.lock();
        *next_id += 1;
        *next_id
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.users
            .lock()
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        self.users
            .lock()
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "email",
            })
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        self.users
            .lock()
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "username",
            })
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;

        self.user_by_email(&new_user.email)
            .await
            .conflict_or_ok("user", "email", &new_user.email)?;

        let user = UserData {
            id: self.next_id(),
            username: new_user.username,
            email: new_user.email,
            password: new_user.password,
        };

        self.users.lock().push(user.clone());
        Ok(user)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let session = self
            .sessions
            .lock()
            .iter()
            .find(|(_, t, _, _)| t == token)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })?;

        let (id, token, expires_at, user_id) = session;
        let user = self.user_by_id(user_id).await?;

        Ok(SessionData {
            id,
            token,
            expires_at,
            user,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        let id = self.next_id();

        self.sessions.lock().push((
            id,
            new_session.token.clone(),
            new_session.expires_at,
            new_session.user_id,
        ));

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let _ = self.session_by_token(token).await?;
        self.sessions.lock().retain(|(_, t, _, _)| t != token);
        Ok(())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();
        self.sessions.lock().retain(|(_, _, expires_at, _)| *expires_at > now);
        Ok(())
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData> {
        if self.message_failure.load(Ordering::SeqCst) {
            return Err(DatabaseError::Internal("message store is unavailable".into()));
        }

        let sender = self.user_by_id(new_message.sender_id).await?;

        let message = MessageData {
            id: self.next_id(),
            room: new_message.room,
            text: new_message.text,
            nonce: new_message.nonce,
            sent_at: new_message.sent_at,
            sender,
        };

        self.messages.lock().push(message.clone());
        Ok(message)
    }

    async fn recent_messages(&self, room: &str, limit: usize) -> Result<Vec<MessageData>> {
        let mut messages: Vec<_> = self
            .messages
            .lock()
            .iter()
            .filter(|m| m.room == room)
            .cloned()
            .collect();

        messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then(a.id.cmp(&b.id)));

        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }
}
