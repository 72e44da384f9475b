use chrono::Utc;
use confab_chat::protocol::{ClientEvent, Message, ServerEvent, User};
use rand::{distributions::Alphanumeric, thread_rng, Rng};

/// Local state for the room the client is looking at.
///
/// Sends show up immediately as pending entries, the server's echo confirms
/// them by nonce instead of appearing a second time.
pub struct RoomView {
    room: String,
    viewer: User,
    messages: Vec<ViewMessage>,
    typing: Vec<String>,
}

/// A displayed message, either confirmed by the server or still waiting for
/// its echo
#[derive(Debug, Clone)]
pub struct ViewMessage {
    pub message: Message,
    pub pending: bool,
}

impl RoomView {
    pub fn new(room: &str, viewer: User) -> Self {
        Self {
            room: room.to_string(),
            viewer,
            messages: Vec::new(),
            typing: Vec::new(),
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn messages(&self) -> &[ViewMessage] {
        &self.messages
    }

    pub fn typing(&self) -> &[String] {
        &self.typing
    }

    /// Seeds the view from a history fetch
    pub fn load_history(&mut self, history: Vec<Message>) {
        self.messages = history
            .into_iter()
            .map(|message| ViewMessage {
                message,
                pending: false,
            })
            .collect();
    }

    /// Appends an optimistic entry so the sender sees their message without
    /// waiting for the server, returning the event to emit
    pub fn push_local(&mut self, text: &str) -> ClientEvent {
        let nonce = nonce();

        self.messages.push(ViewMessage {
            message: Message {
                // The real id arrives with the echo
                id: 0,
                room: self.room.clone(),
                text: text.to_string(),
                nonce: Some(nonce.clone()),
                timestamp: Utc::now(),
                sender: self.viewer.clone(),
            },
            pending: true,
        });

        ClientEvent::SendMessage {
            room: self.room.clone(),
            text: text.to_string(),
            nonce,
        }
    }

    /// Applies a server event to the view
    pub fn apply(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ReceiveMessage { message } => {
                if message.room != self.room {
                    return;
                }

                // The echo of our own send confirms the optimistic entry
                if let Some(nonce) = message.nonce.as_deref() {
                    let pending = self
                        .messages
                        .iter_mut()
                        .find(|m| m.pending && m.message.nonce.as_deref() == Some(nonce));

                    if let Some(entry) = pending {
                        entry.message = message;
                        entry.pending = false;
                        return;
                    }
                }

                self.messages.push(ViewMessage {
                    message,
                    pending: false,
                });
            }
            ServerEvent::UserTyping { room, users } => {
                if room != self.room {
                    return;
                }

                // Never show the viewer their own name
                self.typing = users
                    .into_iter()
                    .filter(|u| u != &self.viewer.username)
                    .collect();
            }
        }
    }

    /// The "x is typing..." line, or None when nobody is
    pub fn typing_notice(&self) -> Option<String> {
        match self.typing.as_slice() {
            [] => None,
            [user] => Some(format!("{user} is typing...")),
            users => Some(format!("{} are typing...", users.join(", "))),
        }
    }
}

fn nonce() -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(16)
        .collect()
}
