use std::fmt;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{event, state::AppState};

mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub(crate) type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn repository::ConversationRepository + Send + Sync>;
pub type Service = Arc<dyn service::ConversationService + Send + Sync>;

/// Seller id reserved for demo listings.
pub const SYSTEM_SELLER: &str = "system";
const DEMO_LISTING_PREFIX: &str = "dummy-";

pub fn api<S>(s: AppState) -> Router<S> {
    Router::new()
        .route("/conversations", post(handler::api::contact_seller))
        .route("/conversations", get(handler::api::find_all))
        .with_state(s)
}

#[derive(Clone, Debug, Deserialize, Serialize, Hash, PartialEq, Eq)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn get(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("This is a demo item. You cannot chat with the system.")]
    DemoItem,
    #[error("listing has no seller to contact")]
    MissingCounterpart,
    #[error("you cannot start a conversation with yourself")]
    SelfContact,
    #[error("not a participant of this conversation")]
    NotMember,
    #[error("conversation not found: {0}")]
    NotFound(Id),
    #[error("malformed conversation {0}: {1}")]
    Malformed(Id, String),

    #[error(transparent)]
    _Event(#[from] event::Error),
    #[error(transparent)]
    _R2d2(#[from] r2d2::Error),
    #[error(transparent)]
    _Diesel(#[from] diesel::result::Error),
    #[error(transparent)]
    _Join(#[from] tokio::task::JoinError),
}
