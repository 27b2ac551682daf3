use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::{conversation, message, user};

pub mod service;

pub(crate) type Result<T> = std::result::Result<T, Error>;
pub type Service = Arc<dyn service::EventService + Send + Sync>;
pub type NotificationStream = BoxStream<'static, Notification>;

/// Change-feed channels: one per user for the conversation list,
/// one per conversation for its messages.
pub enum Subject<'a> {
    Conversations(&'a user::Id),
    Messages(&'a conversation::Id),
}

impl fmt::Display for Subject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Conversations(user) => write!(f, "conversations.{user}"),
            Subject::Messages(id) => write!(f, "messages.{id}"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    ConversationChanged {
        id: conversation::Id,
    },
    MessageAppended {
        conversation_id: conversation::Id,
        id: message::Id,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    _Subscribe(#[from] async_nats::SubscribeError),
    #[error(transparent)]
    _ParseJson(#[from] serde_json::Error),
}
