mod auth;
mod context;
mod errors;
mod gateway;
mod messages;
mod schemas;
mod serialized;

pub mod logging;

pub use context::ServerContext;
pub use errors::{ServerError, ServerResult};

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
};

use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 5000;

pub type Router = axum::Router<ServerContext>;

/// Starts the confab server
pub async fn run_server(context: ServerContext) {
    let port = env::var("CONFAB_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let root_router = axum::Router::new()
        .nest("/api/auth", auth::router())
        .nest("/api/messages", messages::router())
        .merge(gateway::router())
        .layer(cors_layer())
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    axum::serve(listener, root_router.into_make_service())
        .await
        .unwrap();
}

/// Restricts cross-origin requests to the origins in CONFAB_ALLOWED_ORIGINS,
/// a comma-separated list. Stays permissive when the variable is unset.
fn cors_layer() -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    match env::var("CONFAB_ALLOWED_ORIGINS") {
        Ok(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .map(|origin| {
                    origin
                        .trim()
                        .parse()
                        .expect("Origins must be valid header values")
                })
                .collect();

            cors.allow_origin(AllowOrigin::list(origins))
        }
        Err(_) => cors.allow_origin(Any),
    }
}
