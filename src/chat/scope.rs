use std::sync::Arc;

use log::{debug, error};
use tokio::sync::{Mutex, watch};

use crate::auth;
use crate::conversation::{self, model::Inquiry, service::ConversationService};
use crate::message::{
    self,
    model::{Draft, Message},
    service::MessageService,
};
use crate::session::Session;
use crate::sync::{
    self, Registry,
    conversations::{ConversationList, ConversationListState},
    messages::{MessageStream, MessageStreamState},
};

use super::Error;
use super::model::{Command, Event};

struct Inner {
    registry: Registry,
    conversations: ConversationList,
    messages: MessageStream,
    draft: Draft,
}

/// Chat state of one connected client: the session, its live
/// subscriptions and the draft being composed.
#[derive(Clone)]
pub struct Scope {
    session: Session,
    verifier: auth::Verifier,
    inner: Arc<Mutex<Inner>>,
    conversation_service: conversation::Service,
    message_service: message::Service,
}

impl Scope {
    pub fn new(
        session: Session,
        verifier: auth::Verifier,
        conversation_service: conversation::Service,
        message_service: message::Service,
        retry: sync::Config,
    ) -> Self {
        let inner = Inner {
            registry: Registry::new(),
            conversations: ConversationList::new(conversation_service.clone(), retry),
            messages: MessageStream::new(message_service.clone(), retry),
            draft: Draft::default(),
        };

        Self {
            session,
            verifier,
            inner: Arc::new(Mutex::new(inner)),
            conversation_service,
            message_service,
        }
    }

    fn user(&self) -> super::Result<auth::User> {
        self.session.current().ok_or(Error::NotAuthenticated)
    }

    pub fn current_user(&self) -> Option<auth::User> {
        self.session.current()
    }

    pub async fn open_chat_list(&self) -> super::Result<()> {
        let user = self.user()?;
        let mut inner = self.inner.lock().await;
        let Inner {
            registry,
            conversations,
            ..
        } = &mut *inner;

        conversations.start(registry, user.id());
        Ok(())
    }

    pub async fn search(&self, query: &str) {
        self.inner.lock().await.conversations.set_query(query);
    }

    pub async fn select_conversation(&self, id: &conversation::Id) -> super::Result<bool> {
        let user = self.user()?;
        self.conversation_service
            .check_member(id, user.id())
            .await?;

        let mut inner = self.inner.lock().await;
        let Inner {
            registry, messages, ..
        } = &mut *inner;

        Ok(messages.select(registry, id))
    }

    pub async fn close_conversation(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let Inner {
            registry, messages, ..
        } = &mut *inner;

        messages.close(registry)
    }

    /// Sends `text` to the active conversation. On failure the text stays
    /// in the draft.
    pub async fn send_message(&self, text: &str) -> super::Result<Option<Message>> {
        let user = self.session.current();
        let mut inner = self.inner.lock().await;
        let Inner {
            messages, draft, ..
        } = &mut *inner;

        draft.set(text);
        let active = messages.active().cloned();
        let sent = self
            .message_service
            .send(user.as_ref(), active.as_ref(), draft)
            .await?;

        Ok(sent)
    }

    /// Opens (or creates) the conversation with the seller and makes it active.
    pub async fn contact_seller(&self, inquiry: &Inquiry) -> super::Result<conversation::Id> {
        let user = self.user()?;
        let id = self
            .conversation_service
            .open_or_create(&user, inquiry)
            .await?;

        let mut inner = self.inner.lock().await;
        let Inner {
            registry, messages, ..
        } = &mut *inner;
        messages.select(registry, &id);

        Ok(id)
    }

    /// Switches to the token's user. A different user starts over with
    /// their own chat list.
    pub async fn authenticate(&self, token: &str) -> super::Result<()> {
        let user = self.verifier.verify(token).map_err(|e| {
            debug!("Rejected chat token: {e}");
            Error::NotAuthenticated
        })?;

        if self.sign_in(user).await {
            self.open_chat_list().await?;
        }
        Ok(())
    }

    /// Returns `true` when the user changed; the previous user's
    /// subscriptions are gone by then.
    pub async fn sign_in(&self, user: auth::User) -> bool {
        if !self.session.sign_in(user) {
            return false;
        }
        self.teardown().await;
        true
    }

    pub async fn sign_out(&self) {
        if let Some(user) = self.session.sign_out() {
            debug!("Tearing down chat of {}", user.id());
        }
        self.teardown().await;
    }

    /// Cancels every live subscription and forgets client-side state.
    pub async fn teardown(&self) {
        let mut inner = self.inner.lock().await;
        let Inner {
            registry,
            conversations,
            messages,
            draft,
        } = &mut *inner;

        conversations.stop(registry);
        messages.close(registry);
        registry.dispose();
        draft.clear();
    }

    pub async fn draft(&self) -> String {
        self.inner.lock().await.draft.as_str().to_owned()
    }

    pub async fn active_subscriptions(&self) -> usize {
        self.inner.lock().await.registry.active()
    }

    /// The current list counts as unseen, so a new observer reports it
    /// even when it was loaded before the observer subscribed.
    pub async fn watch_conversations(&self) -> watch::Receiver<ConversationListState> {
        let mut rx = self.inner.lock().await.conversations.subscribe();
        rx.mark_changed();
        rx
    }

    /// Like [`Scope::watch_conversations`], the current state is unseen.
    pub async fn watch_messages(&self) -> watch::Receiver<MessageStreamState> {
        let mut rx = self.inner.lock().await.messages.subscribe();
        rx.mark_changed();
        rx
    }

    /// Runs a client command. Failures come back as events, never as errors.
    pub async fn handle(&self, command: Command) -> Option<Event> {
        debug!("Handling {command:?}");

        match command {
            Command::OpenChatList => self.open_chat_list().await.err().map(notice),
            Command::SelectConversation { id } => match self.select_conversation(&id).await {
                Ok(_) => Some(Event::Selected { id }),
                Err(e) => Some(notice(e)),
            },
            Command::CloseConversation => {
                self.close_conversation().await;
                Some(Event::Closed)
            }
            Command::SendMessage { text } => match self.send_message(&text).await {
                Ok(Some(_)) => Some(Event::MessageSent),
                Ok(None) => None,
                Err(e) => {
                    error!("Failed to send message: {e:?}");
                    Some(Event::SendFailed {
                        draft: self.draft().await,
                    })
                }
            },
            Command::ContactSeller { inquiry } => match self.contact_seller(&inquiry).await {
                Ok(id) => Some(Event::Selected { id }),
                Err(e) => Some(notice(e)),
            },
            Command::Search { query } => {
                self.search(&query).await;
                None
            }
            Command::SignIn { token } => self.authenticate(&token).await.err().map(notice),
            Command::SignOut => {
                self.sign_out().await;
                Some(Event::SignedOut)
            }
        }
    }
}

fn notice(e: Error) -> Event {
    match &e {
        Error::NotAuthenticated => debug!("Rejected command: {e}"),
        _ => error!("Chat command failed: {e:?}"),
    }
    Event::notice(e.notice())
}
