use axum::{
    async_trait, debug_handler,
    extract::{FromRef, FromRequestParts, Query, State},
    http::{header, request::Parts, StatusCode},
    routing::{get, post},
    Json, RequestPartsExt,
};
use confab_chat::{protocol, Credentials, NewAccount, SessionData, UserData};
use serde::Deserialize;

use crate::{
    context::{Context, ServerContext},
    errors::ServerResult,
    schemas::{LoginSchema, RegisterSchema, ValidatedJson},
    serialized::{AuthResult, ToSerialized},
    Router,
};

/// Wraps [SessionData] so [FromRequestParts] can be implemented for it
pub struct Session(SessionData);

impl Session {
    /// Returns the user of the session
    pub fn user(&self) -> UserData {
        self.0.user.clone()
    }

    pub fn token(&self) -> &str {
        &self.0.token
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    ServerContext: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);

        // Browsers can't set headers on a WebSocket upgrade, so the gateway
        // passes its token as a query parameter instead
        let in_query = parts
            .extract::<Query<TokenQuery>>()
            .await
            .ok()
            .map(|x| format!("Bearer {}", x.token));

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|x| x.to_str().ok())
            .or(in_query.as_deref())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing authorization"))?;

        let parts: Vec<_> = token.split_ascii_whitespace().collect();

        if parts.first() != Some(&"Bearer") {
            return Err((StatusCode::BAD_REQUEST, "Authorization must be Bearer"));
        }

        let token = parts.last().cloned().unwrap_or_default();

        let session = context
            .chat
            .auth
            .session(token)
            .await
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Session does not exist"))?;

        Ok(Self(session))
    }
}

#[debug_handler(state = ServerContext)]
async fn register(
    State(context): Context,
    ValidatedJson(body): ValidatedJson<RegisterSchema>,
) -> ServerResult<(StatusCode, Json<AuthResult>)> {
    let session = context
        .chat
        .auth
        .register(NewAccount {
            username: body.username,
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(session.to_serialized())))
}

#[debug_handler(state = ServerContext)]
async fn login(
    State(context): Context,
    ValidatedJson(body): ValidatedJson<LoginSchema>,
) -> ServerResult<Json<AuthResult>> {
    let session = context
        .chat
        .auth
        .login(Credentials {
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok(Json(session.to_serialized()))
}

#[debug_handler(state = ServerContext)]
async fn user(session: Session) -> Json<protocol::User> {
    Json(session.user().to_serialized())
}

#[debug_handler(state = ServerContext)]
async fn logout(State(context): Context, session: Session) -> ServerResult<StatusCode> {
    context.chat.auth.logout(session.token()).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/user", get(user))
        .route("/logout", post(logout))
}
