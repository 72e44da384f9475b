use std::sync::Arc;

use axum::extract::{FromRef, State};
use confab_chat::Chat;

/// State shared by every handler
#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub chat: Arc<Chat>,
}

pub type Context = State<ServerContext>;
