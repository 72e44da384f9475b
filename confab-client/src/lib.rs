mod api;
mod gateway;
mod room;
mod session;
mod typing;

pub use api::*;
pub use gateway::*;
pub use room::*;
pub use session::*;
pub use typing::*;

use confab_chat::protocol::{ClientEvent, User};
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never made it to the server or back
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Gateway(#[from] tokio_tungstenite::tungstenite::Error),
    /// The server refused the request
    #[error("Request was refused with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("The gateway connection is closed")]
    Closed,
}

/// A confab client: one gateway connection, one active room.
///
/// The embedding UI reads the [RoomView] for rendering and reports
/// keystrokes and submits here.
pub struct ChatClient {
    api: Api,
    gateway: Gateway,
    view: RoomView,
    tracker: TypingTracker,
    user: User,
}

impl ChatClient {
    /// Connects to the gateway and enters a room, fetching its history.
    pub async fn connect(
        base_url: &str,
        gateway_url: &str,
        auth: AuthSession,
        room: &str,
    ) -> Result<Self, ClientError> {
        let api = Api::with_token(base_url, auth.token.clone());
        let mut gateway = Gateway::connect(gateway_url, &auth.token).await?;

        gateway
            .send(&ClientEvent::JoinRoom {
                room: room.to_string(),
            })
            .await?;

        let history = api.messages(room).await?;

        let mut view = RoomView::new(room, auth.user.clone());
        view.load_history(history);

        Ok(Self {
            api,
            gateway,
            view,
            tracker: TypingTracker::new(),
            user: auth.user,
        })
    }

    pub fn view(&self) -> &RoomView {
        &self.view
    }

    /// Switches to another room, leaving the current one first.
    pub async fn switch_room(&mut self, room: &str) -> Result<(), ClientError> {
        if self.view.room() == room {
            return Ok(());
        }

        // End any typing state before walking out
        if self.tracker.submit() {
            self.send_typing(false).await?;
        }

        self.gateway
            .send(&ClientEvent::LeaveRoom {
                room: self.view.room().to_string(),
            })
            .await?;

        self.gateway
            .send(&ClientEvent::JoinRoom {
                room: room.to_string(),
            })
            .await?;

        let history = self.api.messages(room).await?;

        self.view = RoomView::new(room, self.user.clone());
        self.view.load_history(history);

        Ok(())
    }

    /// Sends a message, showing it locally right away.
    pub async fn send_message(&mut self, text: &str) -> Result<(), ClientError> {
        let event = self.view.push_local(text);
        self.gateway.send(&event).await?;

        // Submitting ends the typing state immediately
        if self.tracker.submit() {
            self.send_typing(false).await?;
        }

        Ok(())
    }

    /// Reports a keystroke in the message input.
    pub async fn keystroke(&mut self) -> Result<(), ClientError> {
        if self.tracker.keystroke(Instant::now()) {
            self.send_typing(true).await?;
        }

        Ok(())
    }

    /// Drives the connection: applies the next server event to the view, or
    /// fires the typing idle deadline, whichever comes first.
    pub async fn poll(&mut self) -> Result<(), ClientError> {
        let arrived = match self.tracker.deadline() {
            Some(deadline) => {
                tokio::select! {
                    event = self.gateway.next_event() => Some(event),
                    _ = tokio::time::sleep_until(deadline) => None,
                }
            }
            None => Some(self.gateway.next_event().await),
        };

        match arrived {
            Some(Some(event)) => self.view.apply(event),
            Some(None) => return Err(ClientError::Closed),
            // The deadline won the race
            None => {
                if self.tracker.idle_elapsed(Instant::now()) {
                    self.send_typing(false).await?;
                }
            }
        }

        Ok(())
    }

    async fn send_typing(&mut self, typing: bool) -> Result<(), ClientError> {
        let room = self.view.room().to_string();

        self.gateway
            .send(&ClientEvent::Typing { room, typing })
            .await
    }
}
