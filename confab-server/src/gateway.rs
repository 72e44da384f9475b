use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use log::warn;

use confab_chat::{
    protocol::{ClientEvent, ServerEvent},
    ConnectionId, RoomRegistry, UserData,
};

use crate::{
    auth::Session,
    context::{Context, ServerContext},
    Router,
};

/// The most text a single message may carry
const MAX_MESSAGE_LENGTH: usize = 2048;

#[debug_handler(state = ServerContext)]
async fn gateway(session: Session, State(context): Context, ws: WebSocketUpgrade) -> Response {
    let registry = context.chat.registry.clone();
    let user = session.user();

    ws.on_upgrade(move |socket| handle_socket(socket, registry, user))
}

async fn handle_socket(socket: WebSocket, registry: Arc<RoomRegistry>, user: UserData) {
    let mut handle = registry.connect(user);
    let id = handle.id();

    let (mut sink, mut stream) = socket.split();

    // The outbound task is wired up before the first inbound event is
    // handled, so nothing routed to this connection can slip past it
    let outbound = tokio::spawn(async move {
        while let Some(event) = handle.next().await {
            let event: ServerEvent = event.into();
            let text = serde_json::to_string(&event).expect("server events serialize");

            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            WsMessage::Text(text) => match serde_json::from_str(&text) {
                Ok(event) => dispatch(&registry, id, event).await,
                Err(e) => warn!("Discarding malformed gateway event: {e}"),
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    // Aborting drops the handle, which disconnects the registry entry
    outbound.abort();
}

async fn dispatch(registry: &RoomRegistry, id: ConnectionId, event: ClientEvent) {
    match event {
        ClientEvent::JoinRoom { room } => {
            if room.is_empty() {
                warn!("Discarding join for a nameless room");
                return;
            }

            registry.join(id, &room)
        }
        ClientEvent::LeaveRoom { room } => registry.leave(id, &room),
        ClientEvent::Typing { typing, .. } => registry.set_typing(id, typing),
        ClientEvent::SendMessage { text, nonce, .. } => {
            if text.trim().is_empty() || text.len() > MAX_MESSAGE_LENGTH {
                warn!("Discarding message with unacceptable length");
                return;
            }

            // A message that fails to persist is never relayed
            if let Err(e) = registry.send_message(id, text, Some(nonce)).await {
                warn!("Dropped a send-message event: {e}");
            }
        }
    }
}

pub fn router() -> Router {
    Router::new().route("/gateway", get(gateway))
}
