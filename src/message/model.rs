use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{conversation, user};

use super::Id;

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    id: Id,
    conversation_id: conversation::Id,
    sender_id: user::Id,
    text: String,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: Id,
        conversation_id: conversation::Id,
        sender_id: user::Id,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id,
            text: text.into(),
            created_at,
        }
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub const fn conversation_id(&self) -> &conversation::Id {
        &self.conversation_id
    }

    pub const fn sender_id(&self) -> &user::Id {
        &self.sender_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub const fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }
}

pub struct NewMessage {
    id: Id,
    conversation_id: conversation::Id,
    sender_id: user::Id,
    text: String,
}

impl NewMessage {
    pub fn new(conversation_id: &conversation::Id, sender_id: &user::Id, text: &str) -> Self {
        Self {
            id: Id::random(),
            conversation_id: conversation_id.clone(),
            sender_id: sender_id.clone(),
            text: text.to_owned(),
        }
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub const fn conversation_id(&self) -> &conversation::Id {
        &self.conversation_id
    }

    pub const fn sender_id(&self) -> &user::Id {
        &self.sender_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Text being composed. Cleared only once its message is stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Draft(String);

impl Draft {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.0 = text.into();
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct MessageDto {
    id: Id,
    sender_id: user::Id,
    text: String,
    created_at: DateTime<Utc>,
    own: bool,
}

impl MessageDto {
    pub fn new(m: &Message, me: &user::Id) -> Self {
        Self {
            id: m.id().clone(),
            sender_id: m.sender_id().clone(),
            text: m.text().to_owned(),
            created_at: m.created_at,
            own: m.sender_id() == me,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub const fn own(&self) -> bool {
        self.own
    }
}
