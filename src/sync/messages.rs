use std::sync::Arc;

use log::debug;
use tokio::sync::watch;

use crate::conversation;
use crate::message::{self, model::Message, service::MessageService};

use super::{Config, Registry, Slot, Subscription, follow};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageStreamState {
    conversation_id: Option<conversation::Id>,
    messages: Vec<Message>,
    scroll_to_latest: bool,
    revision: u64,
}

impl MessageStreamState {
    pub const fn conversation_id(&self) -> Option<&conversation::Id> {
        self.conversation_id.as_ref()
    }

    /// Oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Raised with every delivered result set so the view jumps to the newest message.
    pub const fn scroll_to_latest(&self) -> bool {
        self.scroll_to_latest
    }

    /// Number of result sets applied since the conversation was selected.
    pub const fn revision(&self) -> u64 {
        self.revision
    }
}

/// Keeps the messages of the one active conversation live.
pub struct MessageStream {
    tx: Arc<watch::Sender<MessageStreamState>>,
    active: Option<conversation::Id>,
    service: message::Service,
    retry: Config,
}

impl MessageStream {
    pub fn new(service: message::Service, retry: Config) -> Self {
        let (tx, _) = watch::channel(MessageStreamState::default());
        Self {
            tx: Arc::new(tx),
            active: None,
            service,
            retry,
        }
    }

    /// Makes `id` the active conversation. Returns `false` when it already is.
    pub fn select(&mut self, registry: &mut Registry, id: &conversation::Id) -> bool {
        if self.active.as_ref() == Some(id) && registry.is_active(Slot::MessageStream) {
            return false;
        }

        registry.cancel(Slot::MessageStream);
        self.tx.send_replace(MessageStreamState {
            conversation_id: Some(id.clone()),
            ..Default::default()
        });

        let tx = self.tx.clone();
        let service = self.service.clone();
        let retry = self.retry;
        let conversation_id = id.clone();

        let sub = Subscription::spawn(move |token| async move {
            follow(
                "message stream",
                retry,
                token.clone(),
                || service.watch(&conversation_id),
                |messages| {
                    tx.send_if_modified(|s| {
                        if token.is_cancelled() {
                            return false;
                        }
                        s.messages = messages;
                        s.scroll_to_latest = true;
                        s.revision += 1;
                        true
                    });
                },
            )
            .await;
        });

        debug!("Following messages of {id}");
        registry.insert(Slot::MessageStream, sub);
        self.active = Some(id.clone());
        true
    }

    /// Leaves the active conversation. Returns `false` when none was active.
    pub fn close(&mut self, registry: &mut Registry) -> bool {
        registry.cancel(Slot::MessageStream);
        self.tx.send_replace(MessageStreamState::default());
        self.active.take().is_some()
    }

    pub const fn active(&self) -> Option<&conversation::Id> {
        self.active.as_ref()
    }

    pub fn subscribe(&self) -> watch::Receiver<MessageStreamState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> MessageStreamState {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::auth;
    use crate::conversation::{model::Inquiry, service::ConversationService};
    use crate::message::model::Draft;
    use crate::testing::{self, Fixture};
    use crate::user;

    use super::*;

    async fn open(f: &Fixture, buyer: &auth::User, seller: &str) -> conversation::Id {
        let inquiry = Inquiry::new("L1", "Lamp", Some(user::Id::new(seller)), None);
        f.conversations.open_or_create(buyer, &inquiry).await.unwrap()
    }

    #[tokio::test]
    async fn should_deliver_messages_in_order() {
        let f = Fixture::new();
        let mut registry = Registry::new();
        let mut stream = MessageStream::new(f.messages.clone(), f.retry);
        let u1 = auth::User::new("u1", None);
        let id = open(&f, &u1, "s1").await;
        let mut rx = stream.subscribe();

        assert!(stream.select(&mut registry, &id));
        testing::wait_for(&mut rx, |s| s.revision() == 1).await;

        for text in ["m1", "m2", "m3"] {
            let mut draft = Draft::new(text);
            f.messages.send(Some(&u1), Some(&id), &mut draft).await.unwrap();
        }

        let state = testing::wait_for(&mut rx, |s| s.messages().len() == 3).await;
        let texts = state.messages().iter().map(Message::text).collect::<Vec<_>>();
        assert_eq!(texts, vec!["m1", "m2", "m3"]);
        assert!(state.scroll_to_latest());
        assert_eq!(state.conversation_id(), Some(&id));
    }

    #[tokio::test]
    async fn should_keep_single_subscription_on_reselect() {
        let f = Fixture::new();
        let mut registry = Registry::new();
        let mut stream = MessageStream::new(f.messages.clone(), f.retry);
        let u1 = auth::User::new("u1", None);
        let id = open(&f, &u1, "s1").await;
        let mut rx = stream.subscribe();

        assert!(stream.select(&mut registry, &id));
        testing::wait_for(&mut rx, |s| s.revision() == 1).await;
        assert!(!stream.select(&mut registry, &id));

        assert_eq!(stream.state().revision(), 1);
        assert_eq!(registry.active(), 1);
        assert_eq!(f.events.subscriptions(), 1);
    }

    #[tokio::test]
    async fn should_switch_conversations_without_leaking_messages() {
        let f = Fixture::new();
        let mut registry = Registry::new();
        let mut stream = MessageStream::new(f.messages.clone(), f.retry);
        let u1 = auth::User::new("u1", None);
        let first = open(&f, &u1, "s1").await;
        let second = open(&f, &u1, "s2").await;
        let mut rx = stream.subscribe();

        stream.select(&mut registry, &first);
        testing::wait_for(&mut rx, |s| s.revision() == 1).await;
        assert!(stream.select(&mut registry, &second));
        testing::wait_for(&mut rx, |s| s.revision() == 1).await;

        let mut draft = Draft::new("to first");
        f.messages.send(Some(&u1), Some(&first), &mut draft).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = stream.state();
        assert_eq!(state.conversation_id(), Some(&second));
        assert!(state.messages().is_empty());
        assert_eq!(registry.active(), 1);
    }

    #[tokio::test]
    async fn should_clear_on_close() {
        let f = Fixture::new();
        let mut registry = Registry::new();
        let mut stream = MessageStream::new(f.messages.clone(), f.retry);
        let u1 = auth::User::new("u1", None);
        let id = open(&f, &u1, "s1").await;

        stream.select(&mut registry, &id);

        assert!(stream.close(&mut registry));
        assert!(!stream.close(&mut registry));
        assert_eq!(stream.state(), MessageStreamState::default());
        assert_eq!(stream.active(), None);
        assert_eq!(registry.active(), 0);
    }
}
