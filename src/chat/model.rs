use serde::{Deserialize, Serialize};

use crate::conversation::{
    self,
    model::{ConversationDto, Inquiry},
};
use crate::message::model::MessageDto;
use crate::sync::{conversations::ConversationListState, messages::MessageStreamState};
use crate::user;

const UNKNOWN: &str = "User";

#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    OpenChatList,
    SelectConversation { id: conversation::Id },
    CloseConversation,
    SendMessage { text: String },
    ContactSeller { inquiry: Inquiry },
    Search { query: String },
    /// Re-authenticates a long-lived socket, e.g. with a refreshed token.
    SignIn { token: String },
    SignOut,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Conversations {
        loading: bool,
        items: Vec<ConversationDto>,
    },
    Messages {
        conversation_id: conversation::Id,
        name: String,
        items: Vec<MessageDto>,
        scroll_to_latest: bool,
    },
    Selected {
        id: conversation::Id,
    },
    Closed,
    MessageSent,
    SendFailed {
        draft: String,
    },
    Notice {
        text: String,
    },
    SignedOut,
}

impl Event {
    pub fn conversations(state: &ConversationListState) -> Self {
        Self::Conversations {
            loading: state.loading(),
            items: state.visible(),
        }
    }

    /// `None` while no conversation is active. The header name comes from
    /// the conversation list, `"User"` until the list knows it.
    pub fn messages(
        state: &MessageStreamState,
        list: &ConversationListState,
        me: Option<&user::Id>,
    ) -> Option<Self> {
        let id = state.conversation_id()?;
        let name = list.name_of(id).unwrap_or(UNKNOWN).to_owned();
        let items = match me {
            Some(me) => state
                .messages()
                .iter()
                .map(|m| MessageDto::new(m, me))
                .collect(),
            None => Vec::new(),
        };

        Some(Self::Messages {
            conversation_id: id.clone(),
            name,
            items,
            scroll_to_latest: state.scroll_to_latest(),
        })
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::Notice { text: text.into() }
    }
}

/// What the client was last shown of the active conversation, so the
/// message view is re-sent once its header name becomes known.
#[derive(Default)]
pub struct View {
    header: Option<(conversation::Id, String)>,
}

impl View {
    pub fn on_conversations(
        &mut self,
        list: &ConversationListState,
        stream: &MessageStreamState,
        me: Option<&user::Id>,
    ) -> Vec<Event> {
        let mut events = vec![Event::conversations(list)];

        let messages = Event::messages(stream, list, me);
        let shown = messages.as_ref().and_then(header);
        if shown.is_some() && shown != self.header {
            self.header = shown;
            events.extend(messages);
        }

        events
    }

    pub fn on_messages(
        &mut self,
        stream: &MessageStreamState,
        list: &ConversationListState,
        me: Option<&user::Id>,
    ) -> Option<Event> {
        let messages = Event::messages(stream, list, me);
        self.header = messages.as_ref().and_then(header);
        messages
    }
}

fn header(event: &Event) -> Option<(conversation::Id, String)> {
    match event {
        Event::Messages {
            conversation_id,
            name,
            ..
        } => Some((conversation_id.clone(), name.clone())),
        _ => None,
    }
}
