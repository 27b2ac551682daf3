use axum::{Router, http::StatusCode, routing::get};

use crate::{conversation, message, state::AppState};

mod handler;
pub mod model;
pub mod scope;

pub use scope::Scope;

pub(crate) type Result<T> = std::result::Result<T, Error>;

pub fn ws<S>(s: AppState) -> Router<S> {
    Router::new().route("/ws", get(handler::ws)).with_state(s)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Please sign in to chat.")]
    NotAuthenticated,

    #[error(transparent)]
    _Conversation(#[from] conversation::Error),
    #[error(transparent)]
    _Message(#[from] message::Error),
}

impl Error {
    /// Text shown to the user. Server-side causes are not disclosed.
    pub fn notice(&self) -> String {
        let status = match self {
            Error::NotAuthenticated => return self.to_string(),
            Error::_Conversation(e) => StatusCode::from(e),
            Error::_Message(e) => StatusCode::from(e),
        };

        if status.is_server_error() {
            String::from("Something went wrong")
        } else {
            self.to_string()
        }
    }
}
