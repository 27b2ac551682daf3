use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{auth, user};

use super::{DEMO_LISTING_PREFIX, Id, SYSTEM_SELLER};

const ME: &str = "Me";
const SELLER: &str = "Seller";
const UNKNOWN: &str = "User";

#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    id: Id,
    participants: [user::Id; 2],
    participant_names: HashMap<user::Id, String>,
    last_message: Option<String>,
    last_message_time: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(
        id: Id,
        participants: [user::Id; 2],
        participant_names: HashMap<user::Id, String>,
        last_message: Option<String>,
        last_message_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            participants,
            participant_names,
            last_message,
            last_message_time,
        }
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub const fn participants(&self) -> &[user::Id; 2] {
        &self.participants
    }

    pub fn participant_names(&self) -> &HashMap<user::Id, String> {
        &self.participant_names
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub const fn last_message_time(&self) -> Option<&DateTime<Utc>> {
        self.last_message_time.as_ref()
    }

    pub fn involves(&self, user: &user::Id) -> bool {
        self.participants.contains(user)
    }

    /// The participant that is not `me`.
    pub fn counterpart(&self, me: &user::Id) -> Option<&user::Id> {
        if !self.involves(me) {
            return None;
        }
        self.participants.iter().find(|p| *p != me)
    }

    /// Name of the counterpart as captured at creation, `"User"` when unknown.
    pub fn display_name(&self, me: &user::Id) -> &str {
        self.counterpart(me)
            .and_then(|c| self.participant_names.get(c))
            .map(String::as_str)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(UNKNOWN)
    }
}

pub struct NewConversation {
    id: Id,
    participants: [user::Id; 2],
    participant_names: HashMap<user::Id, String>,
    last_message: String,
}

impl NewConversation {
    pub fn new(me: &auth::User, seller: &user::Id, inquiry: &Inquiry) -> Self {
        let participant_names = HashMap::from([
            (me.id().clone(), me.name().unwrap_or(ME).to_owned()),
            (
                seller.clone(),
                inquiry.seller_name().unwrap_or(SELLER).to_owned(),
            ),
        ]);

        Self {
            id: Id::random(),
            participants: [me.id().clone(), seller.clone()],
            participant_names,
            last_message: format!("Inquired about: {}", inquiry.title()),
        }
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub const fn participants(&self) -> &[user::Id; 2] {
        &self.participants
    }

    pub fn participant_names(&self) -> &HashMap<user::Id, String> {
        &self.participant_names
    }

    pub fn last_message(&self) -> &str {
        &self.last_message
    }
}

/// Listing context a buyer starts a conversation from.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Inquiry {
    listing_id: String,
    title: String,
    #[serde(default)]
    seller_id: Option<user::Id>,
    #[serde(default)]
    seller_name: Option<String>,
}

impl Inquiry {
    pub fn new(
        listing_id: impl Into<String>,
        title: impl Into<String>,
        seller_id: Option<user::Id>,
        seller_name: Option<&str>,
    ) -> Self {
        Self {
            listing_id: listing_id.into(),
            title: title.into(),
            seller_id,
            seller_name: seller_name.map(String::from),
        }
    }

    pub fn listing_id(&self) -> &str {
        &self.listing_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub const fn seller_id(&self) -> Option<&user::Id> {
        self.seller_id.as_ref()
    }

    pub fn seller_name(&self) -> Option<&str> {
        self.seller_name.as_deref().filter(|n| !n.trim().is_empty())
    }

    pub fn is_demo(&self) -> bool {
        self.listing_id.starts_with(DEMO_LISTING_PREFIX)
            || self
                .seller_id
                .as_ref()
                .is_some_and(|s| s.as_str() == SYSTEM_SELLER)
    }
}

/// Denormalised last-message preview of a conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    text: String,
    time: DateTime<Utc>,
}

impl Summary {
    pub fn new(text: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            time,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub const fn time(&self) -> &DateTime<Utc> {
        &self.time
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ConversationDto {
    id: Id,
    name: String,
    last_message: Option<String>,
    last_message_time: Option<DateTime<Utc>>,
}

impl ConversationDto {
    pub fn new(c: &Conversation, me: &user::Id) -> Self {
        Self {
            id: c.id().clone(),
            name: c.display_name(me).to_owned(),
            last_message: c.last_message.clone(),
            last_message_time: c.last_message_time,
        }
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    /// Case-insensitive match on name or preview. A blank query matches all.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }

        self.name.to_lowercase().contains(&query)
            || self
                .last_message
                .as_ref()
                .is_some_and(|m| m.to_lowercase().contains(&query))
    }
}

/// Most recent first. Conversations without a time go last, keeping their
/// relative order.
pub fn sort_by_recency(items: &mut [ConversationDto]) {
    // `None` orders below any time, so undated conversations sink.
    items.sort_by_key(|c| Reverse(c.last_message_time));
}

/// Projects a live result set into what a user sees in the list.
pub fn project(conversations: &[Conversation], me: &user::Id) -> Vec<ConversationDto> {
    let mut items = conversations
        .iter()
        .map(|c| ConversationDto::new(c, me))
        .collect::<Vec<_>>();
    sort_by_recency(&mut items);
    items
}
