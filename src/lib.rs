use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use integration::Env;
use state::AppState;

pub mod auth;
pub mod chat;
pub mod conversation;
mod error;
pub mod event;
pub mod integration;
pub mod message;
mod schema;
pub mod session;
pub mod state;
pub mod sync;
pub mod user;

#[cfg(test)]
mod testing;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub fn app(s: AppState, env: &Env) -> Router {
    let api = Router::new()
        .merge(conversation::api(s.clone()))
        .merge(message::api(s.clone()));

    let protected = Router::new()
        .nest("/api", api)
        .merge(chat::ws(s.clone()))
        .route_layer(from_fn_with_state(s, auth::middleware::authorize));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(env.allow_origin())
                .allow_methods(env.allow_methods())
                .allow_headers(env.allow_headers()),
        )
}
