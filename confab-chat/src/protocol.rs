//! The wire format spoken between the gateway and clients.
//!
//! Events are tagged JSON objects. Payloads that don't match a known tag are
//! rejected at the boundary, the connection itself stays up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChatEvent, MessageData, UserData};

/// A user as exposed over the wire. The password hash never leaves the
/// server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub username: String,
}

/// A persisted message, as relayed to room members and returned from the
/// history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i32,
    pub room: String,
    pub text: String,
    /// Present when the sender attached a reconciliation id to its send
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub sender: User,
}

/// Events a client may send to the gateway.
///
/// The sender's identity is never part of a payload. The gateway is
/// authenticated, so the session decides who is typing or sending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ClientEvent {
    JoinRoom { room: String },
    LeaveRoom { room: String },
    Typing { room: String, typing: bool },
    SendMessage { room: String, text: String, nonce: String },
}

/// Events the gateway pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ServerEvent {
    ReceiveMessage { message: Message },
    UserTyping { room: String, users: Vec<String> },
}

impl From<UserData> for User {
    fn from(value: UserData) -> Self {
        Self {
            id: value.id,
            username: value.username,
        }
    }
}

impl From<MessageData> for Message {
    fn from(value: MessageData) -> Self {
        Self {
            id: value.id,
            room: value.room,
            text: value.text,
            nonce: value.nonce,
            timestamp: value.sent_at,
            sender: value.sender.into(),
        }
    }
}

impl From<ChatEvent> for ServerEvent {
    fn from(value: ChatEvent) -> Self {
        match value {
            ChatEvent::MessageSent { message } => Self::ReceiveMessage {
                message: message.into(),
            },
            ChatEvent::TypingChanged { room, users } => Self::UserTyping { room, users },
        }
    }
}
