use axum::{
    debug_handler,
    extract::{Path, State},
    routing::get,
    Json,
};
use confab_chat::protocol;

use crate::{
    auth::Session,
    context::{Context, ServerContext},
    errors::ServerResult,
    serialized::ToSerialized,
    Router,
};

/// A room's recent history, oldest first, senders resolved
#[debug_handler(state = ServerContext)]
async fn room_history(
    _session: Session,
    State(context): Context,
    Path(room): Path<String>,
) -> ServerResult<Json<Vec<protocol::Message>>> {
    let messages = context.chat.room_history(&room).await?;

    Ok(Json(messages.to_serialized()))
}

pub fn router() -> Router {
    Router::new().route("/:room", get(room_history))
}
