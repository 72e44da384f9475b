use crate::MessageData;

/// Events delivered to live gateway connections.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A message was persisted and is being relayed to its room
    MessageSent { message: MessageData },
    /// The set of users currently typing in a room changed
    TypingChanged { room: String, users: Vec<String> },
}
